//! Purpose: `fqueue` CLI entry point for inspecting and driving a queue file.
//! Role: Binary crate root; parses args, runs one queue operation, closes the queue.
//! Invariants: `size`, `info` and `push` emit one JSON object on stdout.
//! Invariants: `pop` writes the raw payload bytes to stdout.
//! Invariants: Errors are emitted as JSON on stderr; exit code comes from `to_exit_code`.
use std::error::Error as StdError;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueHint};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use fqueue::api::{CircularFileQueue, Error, ErrorKind, MAX_FILE_SIZE, QueueOptions, to_exit_code};

#[derive(Parser)]
#[command(
    name = "fqueue",
    version,
    about = "Persistent FIFO queue backed by a memory-mapped ring file",
    after_help = r#"EXAMPLES
  $ fqueue push jobs.fq 'hello'
  $ fqueue size jobs.fq
  $ fqueue pop jobs.fq --timeout-ms 5000
  $ fqueue info jobs.fq"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value_t = MAX_FILE_SIZE,
        help = "Queue file size in bytes; must match the size used when the file was created"
    )]
    file_size: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Append one record")]
    Push {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(help = "Record payload (UTF-8 text)", required_unless_present = "stdin")]
        data: Option<String>,
        #[arg(long, conflicts_with = "data", help = "Read the payload from stdin")]
        stdin: bool,
    },
    #[command(about = "Remove the oldest record and write it to stdout")]
    Pop {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
        #[arg(long, help = "Wait up to this many milliseconds for a record")]
        timeout_ms: Option<u64>,
    },
    #[command(about = "Print the number of stored records")]
    Size {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
    #[command(about = "Print cursors and space accounting")]
    Info {
        #[arg(value_hint = ValueHint::FilePath)]
        file: PathBuf,
    },
}

impl Command {
    fn file(&self) -> &PathBuf {
        match self {
            Command::Push { file, .. }
            | Command::Pop { file, .. }
            | Command::Size { file }
            | Command::Info { file } => file,
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(()) => 0,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<(), Error> {
    let queue =
        CircularFileQueue::open_with_options(cli.command.file(), QueueOptions::new(cli.file_size))?;
    let result = dispatch(&queue, cli.command);
    let closed = queue.close();
    result?;
    closed
}

fn dispatch(queue: &CircularFileQueue, command: Command) -> Result<(), Error> {
    match command {
        Command::Push { data, stdin, .. } => {
            let payload = if stdin {
                let mut buf = Vec::new();
                io::stdin()
                    .read_to_end(&mut buf)
                    .map_err(|err| {
                        Error::new(ErrorKind::Io)
                            .with_message("failed to read stdin")
                            .with_source(err)
                    })?;
                buf
            } else {
                data.unwrap_or_default().into_bytes()
            };
            queue.push(&payload)?;
            emit_json(&json!({ "pushed": payload.len(), "size": queue.size() }))
        }
        Command::Pop { timeout_ms, .. } => {
            let popped = match timeout_ms {
                Some(ms) => queue.pop_timeout(Duration::from_millis(ms))?,
                None => queue.try_pop()?,
            };
            let payload = popped.ok_or_else(|| {
                Error::new(ErrorKind::Empty)
                    .with_message("queue is empty")
                    .with_path(queue.path())
            })?;
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(&payload)
                .and_then(|()| stdout.flush())
                .map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write stdout")
                        .with_source(err)
                })
        }
        Command::Size { .. } => emit_json(&json!({ "size": queue.size() })),
        Command::Info { .. } => {
            let info = queue.info()?;
            let value = serde_json::to_value(&info).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("json encode failed")
                    .with_source(err)
            })?;
            emit_json(&value)
        }
    }
}

fn emit_json(value: &Value) -> Result<(), Error> {
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{value}").map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write stdout")
            .with_source(err)
    })
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

fn emit_error(err: &Error) {
    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Io\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert(
        "message".to_string(),
        json!(err.message().map_or_else(|| format!("{:?}", err.kind()), str::to_string)),
    );
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        causes.push(source.to_string());
        current = source.source();
    }
    causes
}
