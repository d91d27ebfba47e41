use std::os::unix::net::UnixStream;

use msgbud_mux::Dispatcher;
use tracing::info;

use crate::cmd::{directory, resolve_payload, SendArgs};
use crate::exit::{io_error, mux_error, CliResult, SUCCESS};

pub fn run(args: SendArgs) -> CliResult<i32> {
    let payload = resolve_payload(&args.payload)?;
    let directory = directory(args.type_id)?;
    let stream = UnixStream::connect(&args.path)
        .map_err(|err| io_error(&format!("connect to {} failed", args.path.display()), err))?;

    let dispatcher = Dispatcher::new(stream, directory);
    dispatcher
        .send(&payload)
        .map_err(|err| mux_error("send failed", err))?;
    info!(type_id = args.type_id, "message sent");

    Ok(SUCCESS)
}
