//! 生成代码的集成前校验
//!
//! 校验失败只影响该条目（记为 RejectedModule），不中止整个周期。

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// 校验器 trait：Ok(()) 表示可以集成，Err(reason) 表示拒绝
#[async_trait]
pub trait SourceVerifier: Send + Sync {
    fn name(&self) -> &str;

    async fn verify(&self, module_name: &str, source: &str) -> Result<(), String>;
}

/// 不做任何校验
#[derive(Debug, Default)]
pub struct NoopVerifier;

#[async_trait]
impl SourceVerifier for NoopVerifier {
    fn name(&self) -> &str {
        "off"
    }

    async fn verify(&self, _module_name: &str, _source: &str) -> Result<(), String> {
        Ok(())
    }
}

/// 括号扫描所需的词法规则（注释与字符串写法）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceSyntax {
    /// `//` `/* */` 注释，`"..."`、`r#"..."#`、字符字面量
    #[default]
    Rust,
    /// `#` 注释，单/双引号与三引号字符串；`//` 是整除
    Python,
}

impl SourceSyntax {
    /// 由配置的语言名与扩展名推断；没有对应规则的语言返回 None
    pub fn detect(language: &str, extension: &str) -> Option<Self> {
        match (
            language.trim().to_lowercase().as_str(),
            extension.trim().trim_start_matches('.'),
        ) {
            ("rust", _) => Some(Self::Rust),
            ("python", _) => Some(Self::Python),
            (_, "rs") => Some(Self::Rust),
            (_, "py") => Some(Self::Python),
            _ => None,
        }
    }
}

/// 进程内检查：非空，且 ()[]{} 在字符串与注释之外配平
#[derive(Debug, Default)]
pub struct DelimiterVerifier {
    syntax: SourceSyntax,
}

impl DelimiterVerifier {
    pub fn new(syntax: SourceSyntax) -> Self {
        Self { syntax }
    }

    pub fn syntax(&self) -> SourceSyntax {
        self.syntax
    }
}

#[async_trait]
impl SourceVerifier for DelimiterVerifier {
    fn name(&self) -> &str {
        "delimiters"
    }

    async fn verify(&self, _module_name: &str, source: &str) -> Result<(), String> {
        check_delimiters(source, self.syntax)
    }
}

pub fn check_delimiters(source: &str, syntax: SourceSyntax) -> Result<(), String> {
    if source.trim().is_empty() {
        return Err("generated source is empty".to_string());
    }

    let chars: Vec<char> = source.chars().collect();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line = 1;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let after_ident = i > 0 && is_ident_char(chars[i - 1]);

        match (syntax, c) {
            (_, '\n') => line += 1,
            (SourceSyntax::Rust, '/') if next == Some('/') => {
                i = skip_line(&chars, i);
                continue;
            }
            (SourceSyntax::Python, '#') => {
                i = skip_line(&chars, i);
                continue;
            }
            (SourceSyntax::Rust, '/') if next == Some('*') => {
                i = skip_block_comment(&chars, i + 2, &mut line);
                continue;
            }
            (SourceSyntax::Rust, 'r' | 'b') if !after_ident => {
                let r_pos = if c == 'b' && next == Some('r') { i + 1 } else { i };
                if chars[r_pos] == 'r' {
                    if let Some(end) = skip_raw_string(&chars, r_pos, &mut line) {
                        i = end;
                        continue;
                    }
                }
            }
            (SourceSyntax::Rust, '"') => {
                i = skip_quoted(&chars, i + 1, '"', &mut line);
                continue;
            }
            (SourceSyntax::Rust, '\'') => {
                i = skip_char_literal(&chars, i);
                continue;
            }
            (SourceSyntax::Python, '"' | '\'') => {
                i = if next == Some(c) && chars.get(i + 2).copied() == Some(c) {
                    skip_triple_quoted(&chars, i + 3, c, &mut line)
                } else {
                    skip_quoted(&chars, i + 1, c, &mut line)
                };
                continue;
            }
            (_, '(' | '[' | '{') => stack.push((c, line)),
            (_, ')' | ']' | '}') => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match stack.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, open_line)) => {
                        return Err(format!(
                            "mismatched '{}' at line {} (opened '{}' at line {})",
                            c, line, open, open_line
                        ));
                    }
                    None => return Err(format!("unexpected '{}' at line {}", c, line)),
                }
            }
            _ => {}
        }
        i += 1;
    }

    match stack.pop() {
        Some((open, open_line)) => Err(format!("unclosed '{}' opened at line {}", open, open_line)),
        None => Ok(()),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// 返回行尾换行符的位置（换行本身留给主循环计数）
fn skip_line(chars: &[char], i: usize) -> usize {
    chars[i..]
        .iter()
        .position(|&c| c == '\n')
        .map(|p| i + p)
        .unwrap_or(chars.len())
}

/// Rust 块注释可嵌套
fn skip_block_comment(chars: &[char], mut i: usize, line: &mut usize) -> usize {
    let mut depth = 1;
    while i < chars.len() {
        match (chars[i], chars.get(i + 1).copied()) {
            ('/', Some('*')) => {
                depth += 1;
                i += 2;
                continue;
            }
            ('*', Some('/')) => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
                continue;
            }
            ('\n', _) => *line += 1,
            _ => {}
        }
        i += 1;
    }
    i
}

/// 从开引号之后扫到未转义的结束引号，返回其后的位置
fn skip_quoted(chars: &[char], mut i: usize, quote: char, line: &mut usize) -> usize {
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                if chars.get(i + 1).copied() == Some('\n') {
                    *line += 1;
                }
                i += 1;
            }
            '\n' => *line += 1,
            c if c == quote => return i + 1,
            _ => {}
        }
        i += 1;
    }
    i
}

fn skip_triple_quoted(chars: &[char], mut i: usize, quote: char, line: &mut usize) -> usize {
    while i < chars.len() {
        match chars[i] {
            '\\' => {
                if chars.get(i + 1).copied() == Some('\n') {
                    *line += 1;
                }
                i += 1;
            }
            '\n' => *line += 1,
            c if c == quote
                && chars.get(i + 1).copied() == Some(quote)
                && chars.get(i + 2).copied() == Some(quote) =>
            {
                return i + 3
            }
            _ => {}
        }
        i += 1;
    }
    i
}

/// `r"..."` / `r#"..."#`，r_pos 指向 r；不是原始字符串（如 `r#ident`）时返回 None
fn skip_raw_string(chars: &[char], r_pos: usize, line: &mut usize) -> Option<usize> {
    let mut j = r_pos + 1;
    let mut hashes = 0;
    while chars.get(j).copied() == Some('#') {
        hashes += 1;
        j += 1;
    }
    if chars.get(j).copied() != Some('"') {
        return None;
    }
    j += 1;

    while j < chars.len() {
        match chars[j] {
            '\n' => *line += 1,
            '"' if (1..=hashes).all(|k| chars.get(j + k).copied() == Some('#')) => {
                return Some(j + 1 + hashes);
            }
            _ => {}
        }
        j += 1;
    }
    Some(j)
}

/// 'x' / '\n' / '\u{7b}' 整体跳过；生命周期 'a 只跳过引号
fn skip_char_literal(chars: &[char], i: usize) -> usize {
    match (chars.get(i + 1).copied(), chars.get(i + 2).copied()) {
        // 最长的转义是 '\u{10FFFF}'
        (Some('\\'), _) => (i + 3..chars.len().min(i + 12))
            .find(|&j| chars[j] == '\'')
            .map(|j| j + 1)
            .unwrap_or(i + 1),
        (Some(_), Some('\'')) => i + 3,
        _ => i + 1,
    }
}

/// 外部命令校验：源码写入 stdin，退出码 0 视为通过（默认 `rustfmt --edition 2021 --emit stdout`）
pub struct CommandVerifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandVerifier {
    pub fn new(command: &[String], timeout_secs: u64) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    async fn run(&self, source: &str) -> Result<std::process::Output, String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("verifier '{}' could not be started: {}", self.program, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .await
                .map_err(|e| format!("failed to pipe source to verifier: {}", e))?;
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| format!("verifier '{}' failed: {}", self.program, e))
    }
}

#[async_trait]
impl SourceVerifier for CommandVerifier {
    fn name(&self) -> &str {
        "command"
    }

    async fn verify(&self, module_name: &str, source: &str) -> Result<(), String> {
        let output = tokio::time::timeout(self.timeout, self.run(source))
            .await
            .map_err(|_| format!("verifier timed out after {:?}", self.timeout))??;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let first_lines: Vec<&str> = stderr.lines().take(5).collect();
            tracing::debug!(module = module_name, "verifier rejected source:\n{}", stderr);
            Err(format!(
                "verifier exited with {}: {}",
                output
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string()),
                first_lines.join(" | ")
            ))
        }
    }
}
