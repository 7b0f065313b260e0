/// One line of input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Meta(MetaCommand),
    Statement(Statement),
}

/// Commands starting with `.`; they act on the session, not on the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCommand {
    /// `.exit`
    Exit,
    /// `.btree`
    BTree,
    /// `.constants`
    Constants,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Insert(InsertStatement),
    Select,
}

/// `insert <id> <username> <email>`. Field lengths are not checked here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    pub id: u32,
    pub username: String,
    pub email: String,
}
