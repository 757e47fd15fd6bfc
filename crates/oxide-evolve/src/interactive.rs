//! Terminal interaction: plan preview, confirmation prompt, countdown and
//! outcome notices.
//!
//! Everything writes to a caller-supplied [`Write`] and reads from a
//! [`BufRead`] so the prompts can be driven from tests.

use std::io::{self, BufRead, Write};
use std::sync::LazyLock;
use std::time::Duration;

use owo_colors::OwoColorize;
use regex::{Captures, Regex};

use crate::dialect::Dialect;
use crate::planner::Plan;

/// Answer to the confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// Apply and commit.
    Yes,
    /// Do nothing.
    No,
    /// Apply, then roll back.
    Test,
}

/// How an interactive run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Changes were committed.
    Committed,
    /// Changes were applied and rolled back on purpose.
    Validated,
    /// A statement failed and everything was rolled back.
    Failed,
}

#[derive(Clone, Copy)]
enum Style {
    Create,
    Alter,
    Drop,
    Type,
    Transaction,
    Constraint,
    PrimaryKey,
    Null,
    Structure,
}

/// Quoted literals and identifiers, or a keyword (two-word keywords first).
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"'(?:[^']|'')*'|"(?:[^"]|"")*"|`(?:[^`]|``)*`|\b(?:PRIMARY KEY|FOREIGN KEY|NOT NULL|[A-Z]+)\b"#)
        .expect("Invalid SQL token regex")
});

fn style_of(word: &str) -> Option<Style> {
    let style = match word {
        "PRIMARY KEY" => Style::PrimaryKey,
        "FOREIGN KEY" => Style::Constraint,
        "NOT NULL" => Style::Null,
        "CREATE" | "ADD" => Style::Create,
        "ALTER" | "SET" | "RENAME" | "MODIFY" | "CHANGE" | "UPDATE" => Style::Alter,
        "DROP" => Style::Drop,
        "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" | "VARCHAR" | "CHAR" | "TEXT"
        | "TIMESTAMP" | "TIMESTAMPTZ" | "DATETIME" | "DATE" | "TIME" | "BOOLEAN" | "REAL"
        | "DOUBLE" | "FLOAT" | "NUMERIC" | "DECIMAL" | "BLOB" | "BYTEA" | "LONGBLOB" | "JSON"
        | "JSONB" | "UUID" | "SERIAL" | "BIGSERIAL" | "SMALLSERIAL" => Style::Type,
        "BEGIN" | "COMMIT" => Style::Transaction,
        "REFERENCES" | "UNIQUE" => Style::Constraint,
        "NULL" => Style::Null,
        "INDEX" | "TABLE" | "COLUMN" | "CONSTRAINT" | "ON" | "TO" => Style::Structure,
        _ => return None,
    };
    Some(style)
}

fn paint(text: &str, style: Style) -> String {
    match style {
        Style::Create => text.green().to_string(),
        Style::Alter => text.yellow().to_string(),
        Style::Drop => text.red().to_string(),
        Style::Type => text.bright_blue().bold().to_string(),
        Style::Transaction => text.bold().to_string(),
        Style::Constraint => text.cyan().to_string(),
        Style::PrimaryKey => text.cyan().bold().to_string(),
        Style::Null => text.magenta().bold().to_string(),
        Style::Structure => text.dimmed().to_string(),
    }
}

/// Highlights SQL keywords for display. Quoted identifiers and literals
/// are left alone.
#[must_use]
pub fn colorize(sql: &str) -> String {
    TOKEN
        .replace_all(sql, |caps: &Captures<'_>| {
            let token = &caps[0];
            match style_of(token) {
                Some(style) => paint(token, style),
                None => token.to_string(),
            }
        })
        .into_owned()
}

/// Renders the plan the way it will run, one statement per line, wrapped
/// in a transaction block when the dialect can roll DDL back.
#[must_use]
pub fn preview(plan: &Plan, dialect: &dyn Dialect) -> String {
    let mut lines = Vec::with_capacity(plan.len() + 4);
    let transactional = dialect.supports_transactional_ddl();
    if transactional {
        lines.push("  BEGIN TRANSACTION;".to_string());
        lines.push(String::new());
    }
    lines.extend(plan.statements().map(|s| format!("  {s};")));
    if transactional {
        lines.push(String::new());
        lines.push("  COMMIT;".to_string());
    }
    lines.join("\n")
}

/// Shows the plan and asks whether to run it, repeating the question
/// until the answer is understood. End of input counts as "no".
pub fn confirm<R, W>(input: &mut R, out: &mut W, plan: &Plan, dialect: &dyn Dialect) -> io::Result<Response>
where
    R: BufRead,
    W: Write,
{
    let many = plan.len() > 1;
    let testable = dialect.supports_transactional_ddl();

    writeln!(out)?;
    writeln!(
        out,
        "Your database needs the following {}:",
        if many { "changes" } else { "change" }
    )?;
    writeln!(out)?;
    writeln!(out, "{}", colorize(&preview(plan, dialect)))?;
    writeln!(out)?;

    loop {
        write!(
            out,
            "Do you want to run {}? ({}) ",
            if many { "these commands" } else { "this command" },
            if testable { "type yes, no or test" } else { "yes or no" }
        )?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(Response::No);
        }
        match line.trim().to_lowercase().as_str() {
            "yes" => return Ok(Response::Yes),
            "no" => return Ok(Response::No),
            "test" if testable => return Ok(Response::Test),
            _ => {}
        }
    }
}

/// Prints `Running in 3... 2... 1...`, waiting `step` after each number.
pub async fn countdown<W: Write>(out: &mut W, step: Duration) -> io::Result<()> {
    write!(out, "Running in")?;
    for n in (1..=3).rev() {
        write!(out, " {n}...")?;
        out.flush()?;
        tokio::time::sleep(step).await;
    }
    writeln!(out)
}

/// Echoes a statement as it executes.
pub fn echo<W: Write>(out: &mut W, statement: &str) -> io::Result<()> {
    writeln!(out, " {}", colorize(&format!("{statement};")))
}

/// Prints the closing notice of an interactive run.
pub fn notice<W: Write>(out: &mut W, outcome: Outcome) -> io::Result<()> {
    writeln!(out)?;
    match outcome {
        Outcome::Committed => writeln!(out, "{}", "SUCCESS!".bold())?,
        Outcome::Validated => writeln!(out, "TEST PASSED - ROLLING BACK")?,
        Outcome::Failed => {
            let rule = "-".repeat(42);
            writeln!(out, "{rule}")?;
            writeln!(out, " {}", "SQL EXCEPTION - ROLLING BACK ALL CHANGES".red().bold())?;
            writeln!(out, "{rule}")?;
        }
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectKind;
    use crate::operations::{Operation, Statement};
    use crate::planner::Step;

    fn strip_ansi(s: &str) -> String {
        let mut out = String::new();
        let mut chars = s.chars();
        while let Some(c) = chars.next() {
            if c == '\x1b' {
                for c in chars.by_ref() {
                    if c == 'm' {
                        break;
                    }
                }
            } else {
                out.push(c);
            }
        }
        out
    }

    fn plan(statements: &[&str]) -> Plan {
        Plan {
            dialect: DialectKind::Postgres,
            steps: statements
                .iter()
                .map(|sql| Step {
                    operation: Operation::DropTable {
                        table: "t".to_string(),
                    },
                    statement: Statement::new(*sql),
                })
                .collect(),
        }
    }

    fn run_confirm(answers: &str, kind: DialectKind, statements: &[&str]) -> (Response, String) {
        let mut input = answers.as_bytes();
        let mut out = Vec::new();
        let response = confirm(&mut input, &mut out, &plan(statements), kind.dialect()).unwrap();
        (response, strip_ansi(&String::from_utf8(out).unwrap()))
    }

    #[test]
    fn test_colorize_keeps_text() {
        let sql = "CREATE TABLE \"users\" (\"id\" INTEGER NOT NULL PRIMARY KEY, \"name\" VARCHAR(255))";
        let colored = colorize(sql);
        assert!(colored.contains('\x1b'));
        assert_eq!(strip_ansi(&colored), sql);
    }

    #[test]
    fn test_colorize_leaves_identifiers() {
        let sql = "DROP TABLE \"CREATE\"";
        let colored = colorize(sql);
        assert!(colored.ends_with("\"CREATE\""));
        assert_eq!(strip_ansi(&colored), sql);
    }

    #[test]
    fn test_colorize_leaves_string_literals() {
        let sql = "ALTER TABLE `users` ADD COLUMN `note` TEXT DEFAULT 'DROP TABLE NOT NULL'";
        let colored = colorize(sql);
        assert!(colored.ends_with("'DROP TABLE NOT NULL'"));
        assert!(colored.contains("`users`"));
        assert_eq!(strip_ansi(&colored), sql);
    }

    #[test]
    fn test_preview_wraps_transactional_dialects() {
        let plan = plan(&["DROP TABLE \"t\""]);
        let pg = preview(&plan, DialectKind::Postgres.dialect());
        assert!(pg.starts_with("  BEGIN TRANSACTION;"));
        assert!(pg.ends_with("  COMMIT;"));
        assert!(pg.contains("  DROP TABLE \"t\";"));

        let mysql = preview(&plan, DialectKind::MySql.dialect());
        assert_eq!(mysql, "  DROP TABLE \"t\";");
    }

    #[test]
    fn test_confirm_yes() {
        let (response, out) = run_confirm("yes\n", DialectKind::Postgres, &["DROP TABLE a"]);
        assert_eq!(response, Response::Yes);
        assert!(out.contains("Your database needs the following change:"));
        assert!(out.contains("Do you want to run this command? (type yes, no or test)"));
    }

    #[test]
    fn test_confirm_repeats_until_understood() {
        let (response, out) =
            run_confirm("maybe\n TEST \n", DialectKind::Sqlite, &["DROP TABLE a", "DROP TABLE b"]);
        assert_eq!(response, Response::Test);
        assert!(out.contains("following changes:"));
        assert_eq!(out.matches("Do you want to run these commands?").count(), 2);
    }

    #[test]
    fn test_confirm_test_needs_transactional_ddl() {
        let (response, out) = run_confirm("test\nno\n", DialectKind::MySql, &["DROP TABLE a"]);
        assert_eq!(response, Response::No);
        assert!(out.contains("(yes or no)"));
    }

    #[test]
    fn test_confirm_end_of_input() {
        let (response, _) = run_confirm("", DialectKind::Sqlite, &["DROP TABLE a"]);
        assert_eq!(response, Response::No);
    }

    #[tokio::test]
    async fn test_countdown() {
        let mut out = Vec::new();
        countdown(&mut out, Duration::ZERO).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "Running in 3... 2... 1...\n");
    }

    #[test]
    fn test_notices() {
        let render = |outcome| {
            let mut out = Vec::new();
            notice(&mut out, outcome).unwrap();
            strip_ansi(&String::from_utf8(out).unwrap())
        };
        assert!(render(Outcome::Committed).contains("SUCCESS!"));
        assert!(render(Outcome::Validated).contains("TEST PASSED - ROLLING BACK"));
        assert!(render(Outcome::Failed).contains("SQL EXCEPTION - ROLLING BACK ALL CHANGES"));
    }
}
