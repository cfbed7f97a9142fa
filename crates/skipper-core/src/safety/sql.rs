//! SQL classification and script wrapping for the Postgres tools.

const READ_ONLY_LEADERS: &[&str] = &["SELECT", "WITH", "EXPLAIN", "SHOW"];
const DML_LEADERS: &[&str] = &["INSERT", "UPDATE", "DELETE"];
const DML_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE"];

fn first_token(sql: &str) -> Option<String> {
    sql.split_whitespace()
        .next()
        .map(|t| t.trim_end_matches(';').to_ascii_uppercase())
}

/// First token ∈ {SELECT, WITH, EXPLAIN, SHOW}.
pub fn is_read_only(sql: &str) -> bool {
    first_token(sql)
        .map(|t| READ_ONLY_LEADERS.contains(&t.as_str()))
        .unwrap_or(false)
}

/// First token ∈ {INSERT, UPDATE, DELETE}; a `WITH` statement counts as
/// DML when any of those keywords appears anywhere in the text.
pub fn is_dml(sql: &str) -> bool {
    match first_token(sql) {
        Some(token) if DML_LEADERS.contains(&token.as_str()) => true,
        Some(token) if token == "WITH" => {
            let upper = sql.to_ascii_uppercase();
            DML_KEYWORDS.iter().any(|kw| contains_word(&upper, kw))
        }
        _ => false,
    }
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
        .any(|token| token == word)
}

/// psql backslash meta-commands are never forwarded.
pub fn contains_meta_command(sql: &str) -> bool {
    sql.lines().any(|line| line.trim_start().starts_with('\\'))
}

fn strip_trailing_semicolon(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

/// A single statement: no interior `;` once the trailing one is stripped.
pub fn is_single_statement(sql: &str) -> bool {
    !strip_trailing_semicolon(sql).contains(';')
}

fn has_limit_clause(sql: &str) -> bool {
    contains_word(&sql.to_ascii_uppercase(), "LIMIT")
}

/// Wrap a read-only query: read-only transaction, per-statement timeout,
/// auto-`LIMIT` when the single statement lacks one, always `ROLLBACK`.
pub fn read_only_script(sql: &str, max_rows: u32, statement_timeout_ms: u32) -> String {
    let mut statement = strip_trailing_semicolon(sql).to_string();
    if is_single_statement(sql) && !has_limit_clause(sql) {
        statement.push_str(&format!(" LIMIT {}", max_rows));
    }
    format!(
        "BEGIN READ ONLY; SET LOCAL statement_timeout='{}ms'; {}; ROLLBACK;",
        statement_timeout_ms, statement
    )
}

/// Wrap DML in a transaction (configurable) with a timeout.
pub fn dml_script(sql: &str, statement_timeout_ms: u32, transaction: bool) -> String {
    let statement = strip_trailing_semicolon(sql);
    if transaction {
        format!(
            "BEGIN; SET LOCAL statement_timeout='{}ms'; {}; COMMIT;",
            statement_timeout_ms, statement
        )
    } else {
        format!(
            "SET statement_timeout='{}ms'; {};",
            statement_timeout_ms, statement
        )
    }
}

/// Admin SQL: transaction + timeout, no classification — arbitrary DDL is
/// accepted (the tool itself is high-risk and approval-gated).
pub fn admin_script(sql: &str, statement_timeout_ms: u32) -> String {
    let statement = strip_trailing_semicolon(sql);
    format!(
        "BEGIN; SET LOCAL statement_timeout='{}ms'; {}; COMMIT;",
        statement_timeout_ms, statement
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_leaders_are_recognized() {
        assert!(is_read_only("SELECT * FROM users"));
        assert!(is_read_only("  with t as (select 1) select * from t"));
        assert!(is_read_only("EXPLAIN SELECT 1"));
        assert!(is_read_only("SHOW server_version"));
        assert!(!is_read_only("INSERT INTO t VALUES (1)"));
        assert!(!is_read_only(""));
    }

    #[test]
    fn dml_detection_covers_cte_smuggling() {
        assert!(is_dml("INSERT INTO t VALUES (1)"));
        assert!(is_dml("update t set x = 1"));
        assert!(is_dml("WITH doomed AS (DELETE FROM t RETURNING *) SELECT * FROM doomed"));
        assert!(!is_dml("WITH t AS (SELECT 1) SELECT * FROM t"));
        assert!(!is_dml("SELECT * FROM updates"));
    }

    #[test]
    fn classifier_partitions_accepted_statements() {
        for sql in [
            "SELECT 1",
            "INSERT INTO t VALUES (1)",
            "WITH x AS (SELECT 1) SELECT * FROM x",
            "WITH x AS (UPDATE t SET a=1 RETURNING *) SELECT 1",
        ] {
            assert!(
                !(is_read_only(sql) && is_dml(sql)) || sql.to_uppercase().starts_with("WITH"),
                "non-WITH statements must not be both classes: {sql}"
            );
        }
    }

    #[test]
    fn meta_commands_are_flagged() {
        assert!(contains_meta_command("\\dt"));
        assert!(contains_meta_command("SELECT 1;\n\\copy t FROM stdin"));
        assert!(!contains_meta_command("SELECT '\\dt'::text"));
    }

    #[test]
    fn read_only_script_appends_limit_and_rolls_back() {
        let script = read_only_script("SELECT * FROM users", 200, 10_000);
        assert_eq!(
            script,
            "BEGIN READ ONLY; SET LOCAL statement_timeout='10000ms'; SELECT * FROM users LIMIT 200; ROLLBACK;"
        );
    }

    #[test]
    fn existing_limit_is_preserved() {
        let script = read_only_script("SELECT * FROM users LIMIT 5;", 200, 10_000);
        assert!(script.contains("LIMIT 5; ROLLBACK;"));
        assert!(!script.contains("LIMIT 200"));
    }

    #[test]
    fn multi_statement_queries_get_no_auto_limit() {
        let script = read_only_script("SELECT 1; SELECT 2", 200, 10_000);
        assert!(!script.contains("LIMIT 200"));
    }

    #[test]
    fn dml_script_commits_inside_transaction() {
        let script = dml_script("DELETE FROM t WHERE id = 1", 5_000, true);
        assert_eq!(
            script,
            "BEGIN; SET LOCAL statement_timeout='5000ms'; DELETE FROM t WHERE id = 1; COMMIT;"
        );
        let bare = dml_script("DELETE FROM t WHERE id = 1", 5_000, false);
        assert!(bare.starts_with("SET statement_timeout"));
    }
}
