//! Line-oriented command loop.
//!
//! Every line read is answered after exactly one `db> ` prompt:
//!
//! - `insert` that succeeds prints an empty line
//! - `select` prints one `id | email | username` line per row
//! - a rejected line prints its error message
//! - `.btree` / `.constants` print their dumps
//! - `.exit` prints nothing, flushes the database and stops
//!
//! End of input behaves like `.exit`. Errors never end the loop, a line that
//! is not valid UTF-8 included; only a failure to read input, to write output
//! or to flush the database does.

use std::io::{self, BufRead, Write};
use std::time::Instant;

use tracing::debug;

use crate::ast::{Command, MetaCommand};
use crate::storage::config::{
    COMMON_NODE_HEADER_SIZE, INTERNAL_NODE_CELL_SIZE, INTERNAL_NODE_HEADER_SIZE,
    LEAF_NODE_CELL_SIZE, LEAF_NODE_HEADER_SIZE, ROW_SIZE,
};
use crate::storage::config::{internal_node_max_keys, leaf_node_max_cells};
use crate::storage::StorageError;
use crate::{parse, Database, DbError, ExecuteResult, ParseError};

pub const PROMPT: &str = "db> ";

/// Read commands from `input` until `.exit` or end of input, writing all
/// protocol output to `output`. With `verbose`, successful statements also
/// report how long they took.
pub fn run<R, W>(input: &mut R, output: &mut W, db: &mut Database, verbose: bool) -> io::Result<()>
where
    R: BufRead,
    W: Write,
{
    let mut buf = Vec::new();

    loop {
        write!(output, "{PROMPT}")?;
        output.flush()?;

        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            debug!("end of input");
            return close(db);
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line,
            Err(err) => {
                debug!(error = %err, "input line is not valid UTF-8");
                writeln!(output, "{}", ParseError::Syntax)?;
                continue;
            }
        };

        let command = match parse(line) {
            Ok(command) => command,
            Err(err) => {
                writeln!(output, "{err}")?;
                continue;
            }
        };

        match command {
            Command::Meta(MetaCommand::Exit) => return close(db),
            Command::Meta(MetaCommand::BTree) => match db.table().render() {
                Ok(dump) => {
                    writeln!(output, "Tree:")?;
                    write!(output, "{dump}")?;
                }
                Err(err) => writeln!(output, "{err}")?,
            },
            Command::Meta(MetaCommand::Constants) => {
                write_constants(output, db)?;
            }
            Command::Statement(stmt) => {
                let started = Instant::now();
                match db.execute(&stmt) {
                    Ok(result) => {
                        write_result(output, &result)?;
                        if verbose {
                            let elapsed = started.elapsed().as_millis();
                            writeln!(output, "Success. Took {elapsed} ms.")?;
                        }
                    }
                    Err(err) => writeln!(output, "{err}")?,
                }
            }
        }
    }
}

fn write_result<W: Write>(output: &mut W, result: &ExecuteResult) -> io::Result<()> {
    match result {
        ExecuteResult::Insert => writeln!(output),
        ExecuteResult::Select(rows) => {
            for row in rows {
                writeln!(output, "{row}")?;
            }
            Ok(())
        }
    }
}

fn write_constants<W: Write>(output: &mut W, db: &Database) -> io::Result<()> {
    let page_size = db.page_size();
    writeln!(output, "Constants:")?;
    writeln!(output, "PAGE_SIZE: {page_size}")?;
    writeln!(output, "ROW_SIZE: {ROW_SIZE}")?;
    writeln!(output, "COMMON_NODE_HEADER_SIZE: {COMMON_NODE_HEADER_SIZE}")?;
    writeln!(output, "LEAF_NODE_HEADER_SIZE: {LEAF_NODE_HEADER_SIZE}")?;
    writeln!(output, "LEAF_NODE_CELL_SIZE: {LEAF_NODE_CELL_SIZE}")?;
    writeln!(
        output,
        "LEAF_NODE_SPACE_FOR_CELLS: {}",
        page_size - LEAF_NODE_HEADER_SIZE
    )?;
    writeln!(output, "LEAF_NODE_MAX_CELLS: {}", leaf_node_max_cells(page_size))?;
    writeln!(output, "INTERNAL_NODE_HEADER_SIZE: {INTERNAL_NODE_HEADER_SIZE}")?;
    writeln!(output, "INTERNAL_NODE_CELL_SIZE: {INTERNAL_NODE_CELL_SIZE}")?;
    writeln!(
        output,
        "INTERNAL_NODE_MAX_KEYS: {}",
        internal_node_max_keys(page_size)
    )
}

fn close(db: &mut Database) -> io::Result<()> {
    db.close().map_err(|err| match err {
        DbError::Storage(StorageError::Io(io)) => io,
        other => io::Error::other(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(db: &mut Database, lines: &[&str], verbose: bool) -> String {
        let script = lines.join("\n");
        let mut input = script.as_bytes();
        let mut output = Vec::new();
        run(&mut input, &mut output, db, verbose).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn prompt_per_line_and_silent_exit() {
        let mut db = Database::in_memory().unwrap();
        let out = session(&mut db, &["insert 1 a a@x.y", ".exit"], false);
        assert_eq!(out, "db> \ndb> ");
    }

    #[test]
    fn lines_after_exit_are_not_read() {
        let mut db = Database::in_memory().unwrap();
        let out = session(&mut db, &[".exit", "insert 1 a a@x.y"], false);
        assert_eq!(out, "db> ");
        assert!(db.table().select().unwrap().is_empty());
    }

    #[test]
    fn errors_do_not_stop_the_loop() {
        let mut db = Database::in_memory().unwrap();
        let out = session(
            &mut db,
            &["foo", ".foo", "insert 1 a", "insert 2 b b@x.y", "select"],
            false,
        );
        assert_eq!(
            out,
            "db> Unrecognized keyword at start of 'foo'.\n\
             db> Unrecognized command '.foo'\n\
             db> Syntax error. Could not parse statement.\n\
             db> \n\
             db> 2 | b@x.y | b\n\
             db> "
        );
    }

    #[test]
    fn non_utf8_line_is_a_syntax_error() {
        let mut db = Database::in_memory().unwrap();
        let mut input: &[u8] = b"\xff\xfe\nselect\n";
        let mut output = Vec::new();
        run(&mut input, &mut output, &mut db, false).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "db> Syntax error. Could not parse statement.\ndb> db> "
        );
    }

    #[test]
    fn verbose_reports_timing() {
        let mut db = Database::in_memory().unwrap();
        let out = session(&mut db, &["insert 1 a a@x.y", "insert 1 a a@x.y"], true);
        let lines: Vec<&str> = out.split('\n').collect();
        assert_eq!(lines[0], "db> ");
        assert!(lines[1].starts_with("Success. Took "), "{out}");
        assert!(lines[1].ends_with(" ms."));
        assert_eq!(lines[2], "db> Error: Duplicate key.");
        assert_eq!(lines[3], "db> ");
    }

    #[test]
    fn btree_dump() {
        let mut db = Database::in_memory().unwrap();
        let out = session(
            &mut db,
            &["insert 3 c c@x", "insert 1 a a@x", "insert 2 b b@x", ".btree"],
            false,
        );
        assert!(out.ends_with("db> Tree:\n- leaf (size 3)\n  - 1\n  - 2\n  - 3\ndb> "));
    }

    #[test]
    fn constants_dump() {
        let mut db = Database::in_memory().unwrap();
        let out = session(&mut db, &[".constants"], false);
        assert!(out.contains("ROW_SIZE: 293\n"));
        assert!(out.contains("LEAF_NODE_CELL_SIZE: 297\n"));
        assert!(out.contains("LEAF_NODE_MAX_CELLS: 13\n"));
        assert!(out.contains("INTERNAL_NODE_MAX_KEYS: 510\n"));
    }
}
