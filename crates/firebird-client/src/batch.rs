//! Command batch splitting.

/// Split `sql` into statements separated by `terminator`.
///
/// Terminators inside single-quoted literals or double-quoted identifiers
/// do not split. Statements are trimmed and empty ones dropped, so
/// splitting an already split statement returns it unchanged. An empty
/// terminator yields the whole text.
#[must_use]
pub fn split_batch(sql: &str, terminator: &str) -> Vec<String> {
    let mut statements = Vec::new();
    if terminator.is_empty() {
        push_trimmed(&mut statements, sql);
        return statements;
    }

    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut pos = 0;
    while pos < sql.len() {
        let rest = &sql[pos..];
        let next = rest.chars().next();
        if let Some(c @ ('\'' | '"')) = next {
            if quote.is_none_or(|q| q == c) {
                quote = if quote.is_some() { None } else { Some(c) };
            }
            pos += 1;
        } else if quote.is_none() && rest.starts_with(terminator) {
            push_trimmed(&mut statements, &sql[start..pos]);
            pos += terminator.len();
            start = pos;
        } else {
            pos += next.map_or(1, char::len_utf8);
        }
    }
    push_trimmed(&mut statements, &sql[start..]);
    statements
}

fn push_trimmed(statements: &mut Vec<String>, text: &str) {
    let text = text.trim();
    if !text.is_empty() {
        statements.push(text.to_string());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_terminator_inside_literal() {
        let parts = split_batch("INSERT INTO T VALUES('a;b');INSERT INTO T VALUES('c')", ";");
        assert_eq!(
            parts,
            vec!["INSERT INTO T VALUES('a;b')", "INSERT INTO T VALUES('c')"]
        );
    }

    #[test]
    fn test_empty_statements_dropped() {
        let parts = split_batch(" ;SELECT 1 FROM RDB$DATABASE;; \n", ";");
        assert_eq!(parts, vec!["SELECT 1 FROM RDB$DATABASE"]);
        assert!(split_batch("   ", ";").is_empty());
    }

    #[test]
    fn test_custom_terminator() {
        let sql = "CREATE PROCEDURE P AS BEGIN SUSPEND; END^SELECT 1 FROM RDB$DATABASE^";
        let parts = split_batch(sql, "^");
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], "CREATE PROCEDURE P AS BEGIN SUSPEND; END");
    }

    #[test]
    fn test_multichar_terminator() {
        let parts = split_batch("A GO B GO", " GO");
        assert_eq!(parts, vec!["A", "B"]);
    }

    #[test]
    fn test_terminator_inside_quoted_identifier() {
        let parts = split_batch("SELECT \"A;B\" FROM T;SELECT 'x\"' FROM T;", ";");
        assert_eq!(parts, vec!["SELECT \"A;B\" FROM T", "SELECT 'x\"' FROM T"]);
    }

    #[test]
    fn test_escaped_quote() {
        let parts = split_batch("SELECT 'it''s;ok' FROM T;SELECT 2 FROM T", ";");
        assert_eq!(parts, vec!["SELECT 'it''s;ok' FROM T", "SELECT 2 FROM T"]);
    }

    proptest! {
        #[test]
        fn prop_split_is_idempotent(sql in "[a-z '\";]{0,40}") {
            for part in split_batch(&sql, ";") {
                prop_assert_eq!(split_batch(&part, ";"), vec![part.clone()]);
            }
        }
    }
}
