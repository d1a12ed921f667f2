//! Placeholder parsing for batch statements
//!
//! Recognizes named placeholders (`:firstName`) and classic positional ones
//! (`?`). Text inside quoted literals, quoted identifiers and comments is left
//! alone, as are PostgreSQL `::type` casts. Both styles are rewritten into
//! numbered `$n` placeholders, which the PostgreSQL and SQLite drivers accept.

use crate::error::{BatchError, Result};

/// How rows are bound to a statement, decided once by its placeholders
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingMode {
    Named,
    Positional,
}

/// A statement with its placeholders located and renumbered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedStatement {
    original: String,
    sql: String,
    /// Distinct names; `names[i]` binds to `$(i + 1)`
    names: Vec<String>,
    positional: usize,
}

impl ParsedStatement {
    /// Parse `sql`, rejecting statements that mix both placeholder styles
    pub fn parse(sql: &str) -> Result<Self> {
        let chars: Vec<char> = sql.chars().collect();
        let mut out = String::with_capacity(sql.len() + 8);
        let mut names: Vec<String> = Vec::new();
        let mut positional = 0;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            match c {
                '\'' | '"' => {
                    let end = skip_quoted(&chars, i, c);
                    out.extend(&chars[i..end]);
                    i = end;
                },
                '-' if next == Some('-') => {
                    let end = find_from(&chars, i + 2, &['\n']).map_or(chars.len(), |e| e + 1);
                    out.extend(&chars[i..end]);
                    i = end;
                },
                '/' if next == Some('*') => {
                    let end = find_block_end(&chars, i + 2);
                    out.extend(&chars[i..end]);
                    i = end;
                },
                ':' if next == Some(':') => {
                    out.push_str("::");
                    i += 2;
                },
                ':' if next.is_some_and(is_name_start) => {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && is_name_part(chars[end]) {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    let index = match names.iter().position(|n| *n == name) {
                        Some(existing) => existing + 1,
                        None => {
                            names.push(name);
                            names.len()
                        },
                    };
                    out.push('$');
                    out.push_str(&index.to_string());
                    i = end;
                },
                '?' => {
                    positional += 1;
                    out.push('$');
                    out.push_str(&positional.to_string());
                    i += 1;
                },
                _ => {
                    out.push(c);
                    i += 1;
                },
            }
        }

        if !names.is_empty() && positional > 0 {
            return Err(BatchError::Config(format!(
                "You can't use both named parameters and classic \"?\" placeholders: {}",
                sql
            )));
        }

        Ok(Self {
            original: sql.to_string(),
            sql: out,
            names,
            positional,
        })
    }

    /// Statements without named placeholders bind positionally
    pub fn mode(&self) -> BindingMode {
        if self.names.is_empty() {
            BindingMode::Positional
        } else {
            BindingMode::Named
        }
    }

    /// Statement with every placeholder rewritten to `$n`
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of values each row must supply
    pub fn parameter_count(&self) -> usize {
        self.names.len() + self.positional
    }
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Index just past the closing quote; a doubled quote is an escape
fn skip_quoted(chars: &[char], start: usize, quote: char) -> usize {
    let mut j = start + 1;
    while j < chars.len() {
        if chars[j] == quote {
            if chars.get(j + 1) == Some(&quote) {
                j += 2;
                continue;
            }
            return j + 1;
        }
        j += 1;
    }
    chars.len()
}

fn find_from(chars: &[char], from: usize, targets: &[char]) -> Option<usize> {
    (from..chars.len()).find(|&j| targets.contains(&chars[j]))
}

fn find_block_end(chars: &[char], from: usize) -> usize {
    let mut j = from;
    while j + 1 < chars.len() {
        if chars[j] == '*' && chars[j + 1] == '/' {
            return j + 2;
        }
        j += 1;
    }
    chars.len()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_named_placeholders_are_numbered_by_first_use() {
        let stmt = ParsedStatement::parse(
            "INSERT INTO people (first_name, last_name, age) VALUES (:firstName, :lastName, :age)",
        )
        .unwrap();

        assert_eq!(stmt.mode(), BindingMode::Named);
        assert_eq!(stmt.names(), ["firstName", "lastName", "age"]);
        assert_eq!(
            stmt.sql(),
            "INSERT INTO people (first_name, last_name, age) VALUES ($1, $2, $3)"
        );
        assert_eq!(stmt.parameter_count(), 3);
    }

    #[test]
    fn test_repeated_name_reuses_index() {
        let stmt =
            ParsedStatement::parse("UPDATE t SET a = :v, b = :w WHERE a <> :v").unwrap();

        assert_eq!(stmt.names(), ["v", "w"]);
        assert_eq!(stmt.sql(), "UPDATE t SET a = $1, b = $2 WHERE a <> $1");
    }

    #[test]
    fn test_positional_placeholders() {
        let stmt = ParsedStatement::parse("INSERT INTO t VALUES (?, ?)").unwrap();

        assert_eq!(stmt.mode(), BindingMode::Positional);
        assert_eq!(stmt.parameter_count(), 2);
        assert_eq!(stmt.sql(), "INSERT INTO t VALUES ($1, $2)");
    }

    #[test]
    fn test_mixed_placeholders_are_rejected() {
        let err = ParsedStatement::parse("INSERT INTO t VALUES (:a, ?)").unwrap_err();
        assert!(matches!(err, BatchError::Config(ref msg) if msg.contains("can't use both")));
    }

    #[test]
    fn test_literals_comments_and_casts_are_ignored() {
        let stmt = ParsedStatement::parse(
            "SELECT ':nope', \"col?\", x::text -- what?\n/* :also */ FROM t WHERE y = :yes AND z = 'it''s ?'",
        )
        .unwrap();

        assert_eq!(stmt.names(), ["yes"]);
        assert_eq!(stmt.parameter_count(), 1);
        assert!(stmt.sql().contains("x::text"));
        assert!(stmt.sql().contains("'it''s ?'"));
        assert!(stmt.sql().ends_with("y = $1 AND z = 'it''s ?'"));
    }

    #[test]
    fn test_statement_without_placeholders_is_positional() {
        let stmt = ParsedStatement::parse("DELETE FROM t").unwrap();
        assert_eq!(stmt.mode(), BindingMode::Positional);
        assert_eq!(stmt.parameter_count(), 0);
    }
}
