//! Snapshot file loading
//!
//! The index only needs `reload(path) -> id → raw content`. Implementations
//! must not serve cached content across refreshes: every refresh re-reads
//! every suite.
//!
//! [`ExportsSnapshotLoader`] reads the CommonJS module format written by
//! snapshot test runners:
//!
//! ```text
//! // Snapshot v1
//!
//! exports[`button renders 1`] = `
//! <button>ok</button>
//! `;
//! ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{IndexError, Result};

/// Raw snapshot content keyed by snapshot id
pub type RawSnapshots = BTreeMap<String, String>;

/// Capability to (re)load a snapshot file.
#[async_trait]
pub trait SnapshotLoader: Send + Sync {
    /// Read `path` from disk and return its snapshots. Never returns stale
    /// content from an earlier call.
    async fn reload(&self, path: &Path) -> Result<RawSnapshots>;
}

/// Loader for `exports[`id`] = `content`;` snapshot modules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportsSnapshotLoader;

#[async_trait]
impl SnapshotLoader for ExportsSnapshotLoader {
    async fn reload(&self, path: &Path) -> Result<RawSnapshots> {
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| IndexError::read(path, e))?;
        parse_exports(path, &source)
    }
}

/// Parse a snapshot module. `path` is only used for error messages.
pub fn parse_exports(path: &Path, source: &str) -> Result<RawSnapshots> {
    ExportsParser {
        path,
        src: source,
        pos: 0,
    }
    .parse()
}

struct ExportsParser<'a> {
    path: &'a Path,
    src: &'a str,
    pos: usize,
}

impl<'a> ExportsParser<'a> {
    fn parse(mut self) -> Result<RawSnapshots> {
        let mut entries = RawSnapshots::new();
        loop {
            self.skip_trivia()?;
            if self.pos >= self.src.len() {
                break;
            }
            self.expect("exports")?;
            self.skip_whitespace();
            self.expect("[")?;
            self.skip_whitespace();
            let id = self.template_literal()?;
            self.skip_whitespace();
            self.expect("]")?;
            self.skip_whitespace();
            self.expect("=")?;
            self.skip_whitespace();
            let value = self.template_literal()?;
            self.skip_whitespace();
            self.expect(";")?;
            entries.insert(id, strip_wrapping_newlines(value));
        }
        Ok(entries)
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn error(&self, message: impl Into<String>) -> IndexError {
        IndexError::SnapshotParse {
            path: self.path.to_path_buf(),
            offset: self.pos,
            message: message.into(),
        }
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", token)))
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Whitespace plus `//` and `/* */` comments.
    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            self.skip_whitespace();
            let rest = self.rest();
            if rest.starts_with("//") {
                self.pos += rest.find('\n').unwrap_or(rest.len());
            } else if rest.starts_with("/*") {
                match rest[2..].find("*/") {
                    Some(end) => self.pos += end + 4,
                    None => return Err(self.error("unterminated block comment")),
                }
            } else {
                return Ok(());
            }
        }
    }

    /// A backtick string; a backslash escapes the following character.
    fn template_literal(&mut self) -> Result<String> {
        self.expect("`")?;
        let mut out = String::new();
        let mut chars = self.rest().char_indices();
        while let Some((offset, ch)) = chars.next() {
            match ch {
                '`' => {
                    self.pos += offset + 1;
                    return Ok(out);
                }
                '\\' => match chars.next() {
                    Some((_, escaped)) => out.push(escaped),
                    None => break,
                },
                _ => out.push(ch),
            }
        }
        self.pos = self.src.len();
        Err(self.error("unterminated template literal"))
    }
}

/// Runners wrap multi-line values in one leading and one trailing newline.
fn strip_wrapping_newlines(value: String) -> String {
    if value.len() >= 2 && value.starts_with('\n') && value.ends_with('\n') {
        value[1..value.len() - 1].to_string()
    } else {
        value
    }
}
