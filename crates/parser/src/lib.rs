/// Command parser for leafdb.
///
/// Modules:
/// - `ast`: parsed command types
/// - `parser`: line classifier producing a `Command`
///
/// Each input line is one command: a meta-command starting with `.`, or a
/// statement (`insert <id> <username> <email>`, `select`).

pub mod ast;
pub mod parser;

use thiserror::Error;

use ast::Command;
use parser::Parser;

/// Why a line could not be turned into a command. The messages are shown
/// to the user verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Syntax error. Could not parse statement.")]
    Syntax,

    #[error("ID must be positive.")]
    NegativeId,

    #[error("Unrecognized keyword at start of '{0}'.")]
    Unrecognized(String),

    #[error("Unrecognized command '{0}'")]
    UnrecognizedMeta(String),
}

/// Parse one input line into a command.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    Parser::new(line).parse_command()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    #[test]
    fn test_parse_insert() {
        let cmd = parse("insert 1 user1 person1@example.com").unwrap();
        assert_eq!(
            cmd,
            Command::Statement(Statement::Insert(InsertStatement {
                id: 1,
                username: "user1".into(),
                email: "person1@example.com".into(),
            }))
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            parse("SELECT").unwrap(),
            Command::Statement(Statement::Select)
        );
        match parse("InSeRt 7 a b").unwrap() {
            Command::Statement(Statement::Insert(ins)) => assert_eq!(ins.id, 7),
            other => panic!("expected Insert, got {:?}", other),
        }
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(
            parse("  select \n").unwrap(),
            Command::Statement(Statement::Select)
        );
        assert_eq!(parse(".exit ").unwrap(), Command::Meta(MetaCommand::Exit));
        match parse("insert   3\tbob   bob@x.org\r\n").unwrap() {
            Command::Statement(Statement::Insert(ins)) => {
                assert_eq!(ins.username, "bob");
                assert_eq!(ins.email, "bob@x.org");
            }
            other => panic!("expected Insert, got {:?}", other),
        }
    }

    #[test]
    fn test_insert_arity() {
        assert_eq!(parse("insert"), Err(ParseError::Syntax));
        assert_eq!(parse("insert 1 user1"), Err(ParseError::Syntax));
        assert_eq!(parse("insert 1 a b c"), Err(ParseError::Syntax));
        assert_eq!(parse("select *"), Err(ParseError::Syntax));
    }

    #[test]
    fn test_insert_id_errors() {
        assert_eq!(parse("insert -1 cstack foo@bar.com"), Err(ParseError::NegativeId));
        assert_eq!(parse("insert one cstack foo@bar.com"), Err(ParseError::Syntax));
    }

    #[test]
    fn test_long_fields_are_not_rejected_here() {
        let line = format!("insert 1 {} {}", "a".repeat(33), "b".repeat(256));
        assert!(parse(&line).is_ok());
    }

    #[test]
    fn test_unrecognized() {
        let err = parse("update 1 x y").unwrap_err();
        assert_eq!(err, ParseError::Unrecognized("update 1 x y".into()));
        assert_eq!(
            err.to_string(),
            "Unrecognized keyword at start of 'update 1 x y'."
        );
        // "inserting" is not the insert keyword.
        assert!(matches!(parse("inserting 1 a b"), Err(ParseError::Unrecognized(_))));
        assert_eq!(
            parse(".tables").unwrap_err().to_string(),
            "Unrecognized command '.tables'"
        );
    }

    #[test]
    fn test_meta_commands() {
        assert_eq!(parse(".btree").unwrap(), Command::Meta(MetaCommand::BTree));
        assert_eq!(
            parse(".constants").unwrap(),
            Command::Meta(MetaCommand::Constants)
        );
    }
}
