//! SQL identifier quoting and splitting utilities.
//!
//! Quoting functions escape the closing quote character by doubling it, so
//! any input string produces a single safe identifier. [`split_identifier`]
//! breaks a dotted, possibly already-quoted name into its components so a
//! dialect can re-quote each one.

use std::sync::OnceLock;

use regex::Regex;

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them (`"` → `""`).
///
/// # Examples
///
/// ```
/// use sqlchain_core::quote_ident;
///
/// assert_eq!(quote_ident("users"), "\"users\"");
/// assert_eq!(quote_ident("user\"name"), "\"user\"\"name\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a SQL identifier using MySQL backtick quoting.
///
/// ```
/// use sqlchain_core::quote_ident_mysql;
///
/// assert_eq!(quote_ident_mysql("user`name"), "`user``name`");
/// ```
#[inline]
pub fn quote_ident_mysql(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a SQL identifier using SQL Server brackets.
///
/// Only the closing bracket needs escaping (`]` → `]]`).
///
/// ```
/// use sqlchain_core::quote_ident_bracket;
///
/// assert_eq!(quote_ident_bracket("Order Details"), "[Order Details]");
/// assert_eq!(quote_ident_bracket("a]b"), "[a]]b]");
/// ```
#[inline]
pub fn quote_ident_bracket(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

const PART: &str = r#"\[((?:[^\]]|\]\])*)\]|`((?:[^`]|``)*)`|"((?:[^"]|"")*)""#;

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "Invalid identifier pattern, quoted names will split on dots");
            None
        }
    }
}

fn quoted_name_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| compile(&format!(r"^(?:{PART})(?:\.(?:{PART}))*$")))
        .as_ref()
}

fn quoted_part_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| compile(PART)).as_ref()
}

/// Split a possibly dotted, possibly quoted identifier into raw components.
///
/// - `users` → `["users"]`
/// - `dbo.users` → `["dbo", "users"]`
/// - `[dbo].[user.data]` → `["dbo", "user.data"]`
/// - `` `a`.`b` ``, `"a"."b"` → `["a", "b"]`
///
/// Escaped closing quotes inside a component are unescaped. A name whose
/// quotes do not pair up falls back to splitting on every dot; this never
/// fails.
pub fn split_identifier(name: &str) -> Vec<String> {
    if !name.contains(['[', '`', '"']) {
        return name.split('.').map(str::to_string).collect();
    }

    let quoted = match (quoted_name_regex(), quoted_part_regex()) {
        (Some(whole), Some(part)) if whole.is_match(name) => Some(part),
        _ => None,
    };
    if let Some(part) = quoted {
        return part
            .captures_iter(name)
            .map(|caps| {
                if let Some(m) = caps.get(1) {
                    m.as_str().replace("]]", "]")
                } else if let Some(m) = caps.get(2) {
                    m.as_str().replace("``", "`")
                } else {
                    caps.get(3)
                        .map(|m| m.as_str().replace("\"\"", "\""))
                        .unwrap_or_default()
                }
            })
            .collect();
    }

    tracing::trace!(name, "Unbalanced identifier quotes, splitting on dots");
    name.split('.')
        .map(|part| {
            part.trim_matches(|c| matches!(c, '[' | ']' | '`' | '"'))
                .to_string()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Quoting Tests ====================

    #[test]
    fn test_quote_ident_simple() {
        assert_eq!(quote_ident("users"), "\"users\"");
        assert_eq!(quote_ident(""), "\"\"");
    }

    #[test]
    fn test_quote_ident_sql_injection_attempt() {
        let malicious = "users\"; DROP TABLE secrets; --";
        assert_eq!(
            quote_ident(malicious),
            "\"users\"\"; DROP TABLE secrets; --\""
        );
    }

    #[test]
    fn test_quote_ident_mysql_multiple_backticks() {
        assert_eq!(quote_ident_mysql("a`b`c"), "`a``b``c`");
    }

    #[test]
    fn test_quote_ident_bracket_only_escapes_close() {
        assert_eq!(quote_ident_bracket("[x]"), "[[x]]]");
    }

    // ==================== Split Tests ====================

    #[test]
    fn test_split_plain() {
        assert_eq!(split_identifier("users"), vec!["users"]);
        assert_eq!(split_identifier("dbo.users"), vec!["dbo", "users"]);
    }

    #[test]
    fn test_split_bracketed_keeps_inner_dots() {
        assert_eq!(
            split_identifier("[dbo].[user.data]"),
            vec!["dbo", "user.data"]
        );
    }

    #[test]
    fn test_split_backtick_and_double_quote() {
        assert_eq!(split_identifier("`a`.`b`"), vec!["a", "b"]);
        assert_eq!(split_identifier("\"a\".\"b\""), vec!["a", "b"]);
        assert_eq!(split_identifier("[a].\"b\""), vec!["a", "b"]);
    }

    #[test]
    fn test_split_unescapes() {
        assert_eq!(split_identifier("[a]]b]"), vec!["a]b"]);
        assert_eq!(split_identifier("\"a\"\"b\""), vec!["a\"b"]);
    }

    #[test]
    fn test_split_unbalanced_falls_back() {
        assert_eq!(split_identifier("[dbo.users"), vec!["dbo", "users"]);
        assert_eq!(split_identifier("a.`b"), vec!["a", "b"]);
    }
}
