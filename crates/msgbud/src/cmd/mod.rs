use std::fs;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use msgbud_mux::TypeRegistry;
use serde_json::Value;

use crate::exit::{io_error, mux_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and echo every message back to its request id.
    Serve(ServeArgs),
    /// Send one request and print the correlated reply.
    Call(CallArgs),
    /// Send one message without waiting for a reply.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Send(args) => send::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Wire type id JSON messages are exchanged under.
    #[arg(long, default_value = "1")]
    pub type_id: u32,
    /// Exit after the first connection closes.
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Wire type id for the request and the reply.
    #[arg(long, default_value = "1")]
    pub type_id: u32,
    #[command(flatten)]
    pub payload: PayloadArgs,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Wire type id for the message.
    #[arg(long, default_value = "1")]
    pub type_id: u32,
    #[command(flatten)]
    pub payload: PayloadArgs,
}

#[derive(Args, Debug)]
pub struct PayloadArgs {
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// String payload, sent as a JSON string.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read a JSON payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Directory shared by every command: JSON values under one wire type id.
fn directory(type_id: u32) -> CliResult<Arc<TypeRegistry>> {
    TypeRegistry::new()
        .with::<Value>(type_id)
        .map(Arc::new)
        .map_err(|err| mux_error("invalid type id", err))
}

fn connect(path: &Path) -> CliResult<(UnixStream, UnixStream)> {
    let stream = UnixStream::connect(path)
        .map_err(|err| io_error(&format!("connect to {} failed", path.display()), err))?;
    let reader = stream
        .try_clone()
        .map_err(|err| io_error("failed cloning stream", err))?;
    Ok((reader, stream))
}

fn resolve_payload(args: &PayloadArgs) -> CliResult<Value> {
    if let Some(json) = &args.json {
        return serde_json::from_str(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")));
    }
    if let Some(data) = &args.data {
        return Ok(Value::String(data.clone()));
    }
    if let Some(path) = &args.file {
        let text = fs::read_to_string(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
        return serde_json::from_str(&text).map_err(|err| {
            CliError::new(
                USAGE,
                format!("{} is not valid JSON: {err}", path.display()),
            )
        });
    }
    Ok(Value::Null)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(json: Option<&str>, data: Option<&str>) -> PayloadArgs {
        PayloadArgs {
            json: json.map(str::to_string),
            data: data.map(str::to_string),
            file: None,
        }
    }

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("  ").is_err());
    }

    #[test]
    fn payload_sources_resolve_to_json_values() {
        let value = resolve_payload(&payload(Some(r#"{"n":[1,2]}"#), None)).unwrap();
        assert_eq!(value, serde_json::json!({"n": [1, 2]}));

        let value = resolve_payload(&payload(None, Some("hello"))).unwrap();
        assert_eq!(value, Value::String("hello".to_string()));

        assert_eq!(resolve_payload(&payload(None, None)).unwrap(), Value::Null);
    }

    #[test]
    fn invalid_json_payload_is_usage_error() {
        let err = resolve_payload(&payload(Some("{nope"), None)).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn directory_maps_json_values() {
        use msgbud_mux::{TypeDirectory, TypeKey};

        let directory = directory(9).unwrap();
        assert_eq!(directory.classify(TypeKey::of::<Value>()).unwrap(), 9);
    }
}
