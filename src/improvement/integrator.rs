//! 模块集成器 - 把生成的源码写入模块树
//!
//! 目标路径：<modules_root>/<类别目录>/<module_name>.<ext>；类别目录来自配置映射表，
//! 未映射的类别退回 `<category>s`。同名模块直接截断覆盖，不做备份。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::ImprovementError;

pub struct ModuleIntegrator {
    modules_root: PathBuf,
    extension: String,
    category_dirs: HashMap<String, String>,
}

impl ModuleIntegrator {
    pub fn new(
        modules_root: impl AsRef<Path>,
        extension: impl Into<String>,
        category_dirs: HashMap<String, String>,
    ) -> Self {
        Self {
            modules_root: modules_root.as_ref().to_path_buf(),
            extension: extension.into().trim_start_matches('.').to_string(),
            category_dirs,
        }
    }

    pub fn modules_root(&self) -> &Path {
        &self.modules_root
    }

    pub fn category_dir(&self, category: &str) -> String {
        match self.category_dirs.get(category) {
            Some(dir) => dir.clone(),
            None => {
                tracing::debug!(category, "No directory mapped for category, using plural suffix");
                format!("{}s", category)
            }
        }
    }

    /// 计算目标路径（不触碰文件系统）；名称不合法时返回 Integration 错误
    pub fn module_path(&self, module_name: &str, category: &str) -> Result<PathBuf, ImprovementError> {
        let dir = self.category_dir(category);
        let file_name = format!("{}.{}", module_name, self.extension);
        let path = self.modules_root.join(&dir).join(&file_name);

        validate_identifier(module_name).map_err(|message| ImprovementError::Integration {
            path: path.clone(),
            message,
        })?;
        validate_dir_name(&dir).map_err(|message| ImprovementError::Integration {
            path: path.clone(),
            message,
        })?;

        Ok(path)
    }

    /// 写入（或覆盖）模块文件，按需创建类别目录，返回写入路径
    pub async fn integrate(
        &self,
        module_name: &str,
        source: &str,
        category: &str,
    ) -> Result<PathBuf, ImprovementError> {
        let path = self.module_path(module_name, category)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ImprovementError::Integration {
                    path: path.clone(),
                    message: format!("Failed to create category directory: {}", e),
                })?;
        }

        let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);
        tokio::fs::write(&path, source)
            .await
            .map_err(|e| ImprovementError::Integration {
                path: path.clone(),
                message: format!("Failed to write module: {}", e),
            })?;

        tracing::info!(
            module = module_name,
            category,
            path = %path.display(),
            bytes = source.len(),
            overwritten = existed,
            "Module integrated"
        );
        Ok(path)
    }
}

/// 模块名只允许字母、数字、下划线与连字符，且不能以连字符开头
fn validate_identifier(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("module name is empty".to_string());
    }
    if name.starts_with('-') {
        return Err(format!("module name '{}' starts with '-'", name));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(format!("module name '{}' contains invalid character {:?}", name, bad));
    }
    Ok(())
}

fn validate_dir_name(dir: &str) -> Result<(), String> {
    if dir.is_empty() || dir == "." || dir == ".." || dir.contains(['/', '\\', '\0']) {
        return Err(format!("invalid category directory '{}'", dir));
    }
    Ok(())
}
