//! Named parameter rewriting.
//!
//! Firebird only understands positional `?` markers. Commands may use
//! `@name` placeholders instead; they are replaced by `?` here and the
//! names are returned in the order they appear, so the Nth `?` binds the
//! Nth name.

/// SQL text with named placeholders replaced by positional markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewrittenSql {
    /// Text with every `@name` outside quoted text replaced by `?`.
    pub sql: String,
    /// Placeholder names (including the `@`) in encounter order.
    pub names: Vec<String>,
}

/// Characters allowed in a placeholder name after the `@`.
fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Replace `@identifier` placeholders outside quoted text.
///
/// Neither single-quoted literals nor double-quoted identifiers are
/// scanned for placeholders. A doubled quote inside either is an escaped
/// quote and keeps it open. An `@` not followed by a word character is
/// copied as is.
#[must_use]
pub fn rewrite_named_parameters(sql: &str) -> RewrittenSql {
    if !sql.contains('@') {
        return RewrittenSql {
            sql: sql.to_string(),
            names: Vec::new(),
        };
    }

    let mut out = String::with_capacity(sql.len());
    let mut names = Vec::new();
    let mut quote: Option<char> = None;
    let mut chars = sql.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            // A doubled quote closes and reopens, which nets out.
            '\'' | '"' if quote.is_none_or(|q| q == c) => {
                quote = if quote.is_some() { None } else { Some(c) };
                out.push(c);
            }
            '@' if quote.is_none() && chars.peek().is_some_and(|&(_, next)| is_word(next)) => {
                let mut end = start + 1;
                while let Some(&(i, next)) = chars.peek() {
                    if !is_word(next) {
                        break;
                    }
                    end = i + next.len_utf8();
                    chars.next();
                }
                names.push(sql[start..end].to_string());
                out.push('?');
            }
            _ => out.push(c),
        }
    }

    RewrittenSql { sql: out, names }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rewrite_skips_literals() {
        let r = rewrite_named_parameters("SELECT * FROM T WHERE A=@a AND B='@lit' AND C=@c");
        assert_eq!(r.sql, "SELECT * FROM T WHERE A=? AND B='@lit' AND C=?");
        assert_eq!(r.names, vec!["@a", "@c"]);
    }

    #[test]
    fn test_no_placeholders_fast_path() {
        let r = rewrite_named_parameters("SELECT 1 FROM RDB$DATABASE");
        assert_eq!(r.sql, "SELECT 1 FROM RDB$DATABASE");
        assert!(r.names.is_empty());
    }

    #[test]
    fn test_escaped_quote_keeps_literal_open() {
        let r = rewrite_named_parameters("UPDATE T SET S='it''s @not' WHERE ID=@id");
        assert_eq!(r.sql, "UPDATE T SET S='it''s @not' WHERE ID=?");
        assert_eq!(r.names, vec!["@id"]);
    }

    #[test]
    fn test_lone_at_is_copied() {
        let r = rewrite_named_parameters("SELECT '@' || @x, @ FROM T");
        assert_eq!(r.sql, "SELECT '@' || ?, @ FROM T");
        assert_eq!(r.names, vec!["@x"]);
    }

    #[test]
    fn test_quoted_identifier_is_not_a_placeholder() {
        let r = rewrite_named_parameters("SELECT \"MAIL@HOST\" FROM T WHERE ID = @id");
        assert_eq!(r.sql, "SELECT \"MAIL@HOST\" FROM T WHERE ID = ?");
        assert_eq!(r.names, vec!["@id"]);
    }

    #[test]
    fn test_quotes_do_not_nest() {
        let r = rewrite_named_parameters("SELECT 'a\"b' AS \"it's\", @p FROM T");
        assert_eq!(r.sql, "SELECT 'a\"b' AS \"it's\", ? FROM T");
        assert_eq!(r.names, vec!["@p"]);
    }

    #[test]
    fn test_dollar_in_name() {
        let r = rewrite_named_parameters("SELECT * FROM T WHERE A = @RDB$ID AND B = @b");
        assert_eq!(r.sql, "SELECT * FROM T WHERE A = ? AND B = ?");
        assert_eq!(r.names, vec!["@RDB$ID", "@b"]);
    }

    #[test]
    fn test_repeated_names_kept_in_order() {
        let r = rewrite_named_parameters("INSERT INTO T VALUES (@b, @a, @b_2, @b)");
        assert_eq!(r.sql, "INSERT INTO T VALUES (?, ?, ?, ?)");
        assert_eq!(r.names, vec!["@b", "@a", "@b_2", "@b"]);
    }

    proptest! {
        #[test]
        fn prop_marker_count_matches_names(
            parts in proptest::collection::vec(("[a-z ]{0,5}", "[a-z][a-z0-9_]{0,6}"), 0..8)
        ) {
            let mut sql = String::new();
            let mut expected = Vec::new();
            for (text, name) in &parts {
                sql.push_str(text);
                sql.push_str(" @");
                sql.push_str(name);
                sql.push(' ');
                expected.push(format!("@{name}"));
            }
            let r = rewrite_named_parameters(&sql);
            prop_assert_eq!(r.sql.matches('?').count(), expected.len());
            prop_assert_eq!(r.names, expected);
        }
    }
}
