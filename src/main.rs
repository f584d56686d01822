//! Purpose: `cachewire` CLI entry point and command dispatch.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit stable stdout formats (wire payloads or JSON).
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.

use std::io::{self, IsTerminal, Read};
use std::path::{Path, PathBuf};

use bstr::ByteSlice;
use clap::{CommandFactory, Parser, Subcommand, ValueHint};
use clap_complete::aot::Shell;
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use cachewire::api::{
    Codec, CodecOptions, Error, ErrorKind, LEGACY_SENTINEL, to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    init_tracing();
    let cli = Cli::parse();
    dispatch_command(cli.command)
}

#[derive(Parser)]
#[command(
    name = "cachewire",
    version,
    about = "Hybrid JSON/binary value codec for key-value cache payloads",
    after_help = r#"EXAMPLES
  $ echo '{"user": "ada", "count": 3}' | cachewire encode
  $ cachewire decode --pretty payload.bin
  $ cachewire inspect payload.bin

Input is read from the file argument when given, otherwise from stdin."#,
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Re-encode a stored payload (JSON or legacy binary) as a JSON wire payload")]
    Encode {
        #[arg(value_hint = ValueHint::FilePath, help = "Input file (default: stdin)")]
        file: Option<PathBuf>,
    },
    #[command(about = "Decode a payload and print the value as canonical JSON")]
    Decode {
        #[arg(value_hint = ValueHint::FilePath, help = "Input file (default: stdin)")]
        file: Option<PathBuf>,
        #[arg(long, help = "Pretty-print the decoded value")]
        pretty: bool,
        #[arg(long, help = "Leave date/timestamp-shaped strings as plain text")]
        raw_temporals: bool,
        #[arg(long, help = "Skip special-container hooks; unmarshal every key uniformly")]
        no_container_hooks: bool,
    },
    #[command(about = "Report whether a payload is legacy binary or JSON")]
    Inspect {
        #[arg(value_hint = ValueHint::FilePath, help = "Input file (default: stdin)")]
        file: Option<PathBuf>,
    },
    #[command(about = "Generate shell completion scripts")]
    Completion {
        #[arg(value_enum, help = "Target shell")]
        shell: Shell,
    },
}

fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Encode { file } => {
            let input = read_input(file.as_deref())?;
            tracing::debug!(bytes = input.len(), form = payload_form(&input), "encode input");
            let codec = Codec::new();
            let value = codec.load(&input)?;
            let payload = codec.dump(&value)?;
            println!("{payload}");
            Ok(RunOutcome::ok())
        }
        Command::Decode {
            file,
            pretty,
            raw_temporals,
            no_container_hooks,
        } => {
            let input = read_input(file.as_deref())?;
            tracing::debug!(bytes = input.len(), form = payload_form(&input), "decode input");
            let options = CodecOptions {
                restore_temporals: !raw_temporals,
                container_hooks: !no_container_hooks,
                ..CodecOptions::new()
            };
            let codec = Codec::with_options(options);
            let value = codec.load(&input)?;
            let payload = codec.dump(&value)?;
            println!("{}", render_payload(&payload, pretty)?);
            Ok(RunOutcome::ok())
        }
        Command::Inspect { file } => {
            let input = read_input(file.as_deref())?;
            let report = inspect_report(&input);
            let json = serde_json::to_string(&report).map_err(|err| {
                Error::new(ErrorKind::Internal)
                    .with_message("failed to serialize report")
                    .with_source(err)
            })?;
            println!("{json}");
            Ok(RunOutcome::ok())
        }
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "cachewire", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
    }
}

#[derive(Debug, Serialize)]
struct InspectReport {
    form: &'static str,
    bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview: Option<String>,
}

fn inspect_report(payload: &[u8]) -> InspectReport {
    let form = payload_form(payload);
    let preview = if form == "legacy-binary" {
        let head = &payload[..payload.len().min(24)];
        Some(format!("{:?}", head.as_bstr()))
    } else {
        None
    };
    InspectReport {
        form,
        bytes: payload.len(),
        preview,
    }
}

fn payload_form(payload: &[u8]) -> &'static str {
    if payload.first() == Some(&LEGACY_SENTINEL) {
        "legacy-binary"
    } else {
        "json"
    }
}

fn render_payload(payload: &str, pretty: bool) -> Result<String, Error> {
    if !pretty {
        return Ok(payload.to_string());
    }
    let tree: serde_json::Value = serde_json::from_str(payload).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to reparse payload for pretty output")
            .with_source(err)
    })?;
    serde_json::to_string_pretty(&tree).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to pretty-print payload")
            .with_source(err)
    })
}

fn read_input(file: Option<&Path>) -> Result<Vec<u8>, Error> {
    match file {
        Some(path) => std::fs::read(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read input file")
                .with_path(path)
                .with_source(err)
        }),
        None => {
            if io::stdin().is_terminal() {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("no input provided")
                    .with_hint("Pass a file path or pipe a payload on stdin."));
            }
            let mut buf = Vec::new();
            io::stdin().read_to_end(&mut buf).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read stdin")
                    .with_source(err)
            })?;
            Ok(buf)
        }
    }
}

fn emit_error(err: &Error) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("error: {err}");
        if let Some(hint) = err.hint() {
            eprintln!("hint: {hint}");
        }
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> serde_json::Value {
    let mut error = serde_json::Map::new();
    error.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    error.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        error.insert("hint".to_string(), json!(hint));
    }
    json!({ "error": error })
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "invalid usage".to_string(),
        ErrorKind::Serialization => "value cannot be serialized".to_string(),
        ErrorKind::Parse => "payload is not valid json".to_string(),
        ErrorKind::Corrupt => "legacy payload is corrupt".to_string(),
        ErrorKind::Unavailable => "required collaborator is unavailable".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}
