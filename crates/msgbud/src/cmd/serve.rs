use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::thread;

use msgbud_frame::Header;
use msgbud_mux::{Dispatcher, Router};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cmd::{directory, ServeArgs};
use crate::exit::{io_error, mux_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let listener = bind(&args.path)?;
    info!(path = %args.path.display(), type_id = args.type_id, "serving");

    let result = accept_loop(&listener, &args, format);
    let _ = std::fs::remove_file(&args.path);
    result.map(|()| SUCCESS)
}

fn accept_loop(listener: &UnixListener, args: &ServeArgs, format: OutputFormat) -> CliResult<()> {
    loop {
        let (stream, _) = listener
            .accept()
            .map_err(|err| io_error("accept failed", err))?;

        if args.once {
            return serve_connection(stream, args.type_id, format);
        }

        let type_id = args.type_id;
        thread::Builder::new()
            .name("msgbud-conn".to_string())
            .spawn(move || {
                if let Err(err) = serve_connection(stream, type_id, format) {
                    warn!(error = %err, "connection ended with error");
                }
            })
            .map_err(|err| CliError::new(INTERNAL, format!("failed spawning connection: {err}")))?;
    }
}

/// Echo every JSON message back under the request id it arrived with.
///
/// Messages with request id 0 are printed but not echoed; nothing on the
/// other end is waiting for them.
fn serve_connection(stream: UnixStream, type_id: u32, format: OutputFormat) -> CliResult<()> {
    let directory = directory(type_id)?;
    let reader = stream
        .try_clone()
        .map_err(|err| io_error("failed cloning stream", err))?;
    let router = Router::new(reader, directory.clone());
    let responder = Dispatcher::new(stream, directory);

    router
        .subscribe(move |header: Header, value: Value| {
            print_message(header, &value, format);
            if header.request_id == 0 {
                return;
            }
            info!(request_id = header.request_id, "echoing message");
            if let Err(err) = responder.reply(header.request_id, &value) {
                warn!(request_id = header.request_id, error = %err, "echo failed");
            }
        })
        .map_err(|err| mux_error("subscribe failed", err))?;

    debug!("connection accepted");
    router
        .listen()
        .map_err(|err| mux_error("connection failed", err))
}

fn bind(path: &Path) -> CliResult<UnixListener> {
    match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.file_type().is_socket() => {
            debug!(path = %path.display(), "removing stale socket");
            std::fs::remove_file(path)
                .map_err(|err| io_error(&format!("bind {} failed", path.display()), err))?;
        }
        Ok(_) => {
            return Err(io_error(
                &format!("bind {} failed", path.display()),
                io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "existing path is not a unix socket",
                ),
            ));
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(io_error(&format!("bind {} failed", path.display()), err)),
    }

    UnixListener::bind(path).map_err(|err| io_error(&format!("bind {} failed", path.display()), err))
}
