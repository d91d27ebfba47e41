use std::sync::Arc;
use std::thread;

use msgbud_frame::Header;
use msgbud_mux::{Dispatcher, Router};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cmd::{connect, directory, parse_duration, resolve_payload, CallArgs};
use crate::exit::{mux_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: CallArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args.payload)?;
    let directory = directory(args.type_id)?;
    let (reader, writer) = connect(&args.path)?;

    let router = Arc::new(Router::new(reader, directory.clone()));
    let dispatcher = Dispatcher::new(writer, directory);

    let listener = Arc::clone(&router);
    thread::Builder::new()
        .name("msgbud-listen".to_string())
        .spawn(move || {
            if let Err(err) = listener.listen() {
                warn!(error = %err, "listen loop stopped");
            }
        })
        .map_err(|err| CliError::new(INTERNAL, format!("failed spawning listener: {err}")))?;

    let reply: Value = dispatcher
        .call(&payload, &*router, timeout)
        .map_err(|err| mux_error("call failed", err))?;
    debug!(request_id = dispatcher.last_id(), "reply received");

    print_message(
        Header::new(dispatcher.last_id(), args.type_id),
        &reply,
        format,
    );
    Ok(SUCCESS)
}
