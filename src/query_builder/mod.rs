//! SQL text compilation
//!
//! Statements are written with named placeholders (`:name`). The store only
//! understands positional `?` parameters, so every statement is compiled once:
//! placeholders are replaced with `?` and their names are recorded in order of
//! appearance. Quoted strings, quoted identifiers, comments and `::` casts are
//! copied through untouched.

mod multi_insert;

pub use multi_insert::multi_insert;

/// A statement whose named placeholders have been resolved to positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledSql {
    sql: String,
    positional_sql: String,
    placeholders: Vec<String>,
}

#[derive(Clone, Copy)]
enum Scan {
    Code,
    Quoted(u8),
    LineComment,
    BlockComment,
}

impl CompiledSql {
    /// Compile SQL text with named placeholders
    pub fn parse(sql: &str) -> Self {
        let bytes = sql.as_bytes();
        let mut positional_sql = String::with_capacity(sql.len());
        let mut placeholders = Vec::new();
        let mut copied = 0;
        let mut state = Scan::Code;
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            let next = bytes.get(i + 1).copied();
            match state {
                Scan::Code => match b {
                    b'\'' | b'"' | b'`' => state = Scan::Quoted(b),
                    b'[' => state = Scan::Quoted(b']'),
                    b'-' if next == Some(b'-') => {
                        state = Scan::LineComment;
                        i += 1;
                    }
                    b'/' if next == Some(b'*') => {
                        state = Scan::BlockComment;
                        i += 1;
                    }
                    b':' if next == Some(b':') => i += 1,
                    b':' if next.is_some_and(is_name_start) => {
                        let start = i + 1;
                        let mut end = start + 1;
                        while end < bytes.len() && is_name_char(bytes[end]) {
                            end += 1;
                        }
                        positional_sql.push_str(&sql[copied..i]);
                        positional_sql.push('?');
                        placeholders.push(sql[start..end].to_string());
                        copied = end;
                        i = end;
                        continue;
                    }
                    _ => {}
                },
                Scan::Quoted(close) => {
                    if b == close {
                        state = Scan::Code;
                    }
                }
                Scan::LineComment => {
                    if b == b'\n' {
                        state = Scan::Code;
                    }
                }
                Scan::BlockComment => {
                    if b == b'*' && next == Some(b'/') {
                        state = Scan::Code;
                        i += 1;
                    }
                }
            }
            i += 1;
        }
        positional_sql.push_str(&sql[copied..]);

        CompiledSql {
            sql: sql.to_string(),
            positional_sql,
            placeholders,
        }
    }

    /// The SQL text as written
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The SQL text with every placeholder replaced by `?`
    pub fn positional_sql(&self) -> &str {
        &self.positional_sql
    }

    /// Placeholder names in positional order, one entry per occurrence
    pub fn placeholders(&self) -> &[String] {
        &self.placeholders
    }

    /// Check whether `name` appears as a placeholder
    pub fn has_placeholder(&self, name: &str) -> bool {
        self.placeholders.iter().any(|p| p == name)
    }

    /// Approximate memory held by this entry, used for cache accounting
    pub fn size_bytes(&self) -> usize {
        self.sql.len()
            + self.positional_sql.len()
            + self.placeholders.iter().map(String::len).sum::<usize>()
    }
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
