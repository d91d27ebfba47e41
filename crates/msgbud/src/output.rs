use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use msgbud_frame::Header;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    request_id: u32,
    type_id: u32,
    payload: &'a Value,
    timestamp: String,
}

pub fn print_message(header: Header, payload: &Value, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                request_id: header.request_id,
                type_id: header.type_id,
                payload,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["REQUEST", "TYPE", "PAYLOAD"])
                .add_row(vec![
                    request_label(header.request_id),
                    header.type_id.to_string(),
                    payload.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "request_id={} type_id={} payload={}",
                header.request_id, header.type_id, payload
            );
        }
        OutputFormat::Raw => {
            print_raw(payload);
        }
    }
}

/// Strings are written bare, everything else as compact JSON.
pub fn print_raw(payload: &Value) {
    let mut out = std::io::stdout();
    let _ = match payload {
        Value::String(text) => writeln!(out, "{text}"),
        other => writeln!(out, "{other}"),
    };
    let _ = out.flush();
}

fn request_label(request_id: u32) -> String {
    if request_id == 0 {
        "-".to_string()
    } else {
        request_id.to_string()
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
