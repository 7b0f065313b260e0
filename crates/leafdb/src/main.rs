use std::ffi::OsString;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use tracing::error;
use tracing_subscriber::EnvFilter;

use leafdb::{repl, Config, Database};

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    db_path: Option<PathBuf>,
    verbose: bool,
    show_help: bool,
}

fn main() {
    init_tracing();

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    let exit_code = run(std::env::args_os(), &mut input, &mut stdout, &mut stderr);
    drop(input);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Diagnostics go to stderr so stdout carries only command output.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run<I, R, W, E>(args: I, input: &mut R, out: &mut W, err: &mut E) -> i32
where
    I: IntoIterator<Item = OsString>,
    R: BufRead,
    W: Write,
    E: Write,
{
    let options = match parse_args(args) {
        Ok(options) => options,
        Err(message) => {
            let _ = writeln!(err, "error: {message}");
            let _ = write_usage(err);
            return 2;
        }
    };

    if options.show_help {
        return i32::from(write_usage(out).is_err());
    }

    let config = Config {
        path: options.db_path,
        ..Config::default()
    };
    let mut db = match Database::open_with_config(config) {
        Ok(db) => db,
        Err(e) => {
            error!(error = %e, "failed to open database");
            let _ = writeln!(err, "error: {e}");
            return 1;
        }
    };

    match repl::run(input, out, &mut db, options.verbose) {
        Ok(()) => 0,
        Err(e) => {
            let _ = writeln!(err, "error: {e}");
            1
        }
    }
}

fn parse_args<I>(args: I) -> Result<CliOptions, String>
where
    I: IntoIterator<Item = OsString>,
{
    let mut iter = args.into_iter();
    let _argv0 = iter.next();

    let mut db_path = None;
    let mut verbose = false;
    let mut show_help = false;

    for argument in iter {
        let arg = argument.to_string_lossy();
        match arg.as_ref() {
            "-v" | "--verbose" => verbose = true,
            "-h" | "--help" => show_help = true,
            other if other.starts_with('-') => {
                return Err(format!("unknown option `{other}`"));
            }
            _ => {
                if db_path.is_some() {
                    return Err(String::from(
                        "too many positional arguments; expected at most one database file",
                    ));
                }
                db_path = Some(PathBuf::from(argument));
            }
        }
    }

    Ok(CliOptions {
        db_path,
        verbose,
        show_help,
    })
}

fn write_usage<W>(out: &mut W) -> io::Result<()>
where
    W: Write,
{
    writeln!(
        out,
        "Usage: leafdb [FILENAME] [-v]\n\
         \n\
         Without FILENAME the database lives in memory and is lost on exit.\n\
         \n\
         Commands:\n\
         \n\
         insert <id> <username> <email>\n\
         select\n\
         .btree      Print the tree structure\n\
         .constants  Print the page layout constants\n\
         .exit       Flush and quit\n",
    )
}
