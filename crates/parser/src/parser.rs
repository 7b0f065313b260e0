/// Line parser: turns one trimmed input line into a `Command`.
use crate::ast::*;
use crate::ParseError;

pub struct Parser<'a> {
    line: &'a str,
}

impl<'a> Parser<'a> {
    pub fn new(line: &'a str) -> Self {
        Self { line: line.trim() }
    }

    pub fn parse_command(&self) -> Result<Command, ParseError> {
        if self.line.starts_with('.') {
            return self.parse_meta().map(Command::Meta);
        }
        self.parse_statement().map(Command::Statement)
    }

    // ── Meta commands ───────────────────────────────────────────────────

    fn parse_meta(&self) -> Result<MetaCommand, ParseError> {
        match self.line {
            ".exit" => Ok(MetaCommand::Exit),
            ".btree" => Ok(MetaCommand::BTree),
            ".constants" => Ok(MetaCommand::Constants),
            other => Err(ParseError::UnrecognizedMeta(other.to_string())),
        }
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn parse_statement(&self) -> Result<Statement, ParseError> {
        let mut words = self.line.split_whitespace();
        let keyword = words.next().unwrap_or("");

        if keyword.eq_ignore_ascii_case("insert") {
            let args: Vec<&str> = words.collect();
            return self.parse_insert(&args).map(Statement::Insert);
        }
        if keyword.eq_ignore_ascii_case("select") {
            return match words.next() {
                None => Ok(Statement::Select),
                Some(_) => Err(ParseError::Syntax),
            };
        }
        Err(ParseError::Unrecognized(self.line.to_string()))
    }

    fn parse_insert(&self, args: &[&str]) -> Result<InsertStatement, ParseError> {
        let [id, username, email] = args else {
            return Err(ParseError::Syntax);
        };
        Ok(InsertStatement {
            id: parse_id(id)?,
            username: (*username).to_string(),
            email: (*email).to_string(),
        })
    }
}

fn parse_id(text: &str) -> Result<u32, ParseError> {
    if let Some(digits) = text.strip_prefix('-') {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::NegativeId);
        }
        return Err(ParseError::Syntax);
    }
    text.parse::<u32>().map_err(|_| ParseError::Syntax)
}
