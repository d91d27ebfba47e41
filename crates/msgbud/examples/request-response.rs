//! Two endpoints on one socket pair: a calculator answering typed requests
//! and a client issuing them, plus a fire-and-forget status message.
//!
//! Run with `cargo run -p msgbud --example request-response`.

use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use msgbud::frame::Header;
use msgbud::mux::{Dispatcher, Router, TypeRegistry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct Add {
    a: i64,
    b: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Sum {
    value: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Status {
    served: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let directory = Arc::new(
        TypeRegistry::new()
            .with::<Add>(1)?
            .with::<Sum>(2)?
            .with::<Status>(3)?,
    );
    let (client_stream, server_stream) = UnixStream::pair()?;

    let server_router = Arc::new(Router::new(server_stream.try_clone()?, directory.clone()));
    let server_dispatcher = Arc::new(Dispatcher::new(server_stream, directory.clone()));
    let responder = Arc::clone(&server_dispatcher);
    server_router.subscribe(move |header: Header, add: Add| {
        if let Err(err) = responder.reply(header.request_id, &Sum { value: add.a + add.b }) {
            eprintln!("reply to {} failed: {err}", header.request_id);
        }
    })?;

    let client_router = Arc::new(Router::new(client_stream.try_clone()?, directory.clone()));
    let client_dispatcher = Dispatcher::new(client_stream.try_clone()?, directory);
    client_router.subscribe(|_header: Header, status: Status| {
        println!("server status: served {}", status.served);
    })?;

    let listeners: Vec<_> = [Arc::clone(&server_router), Arc::clone(&client_router)]
        .into_iter()
        .map(|router| thread::spawn(move || router.listen()))
        .collect();

    for (a, b) in [(1, 2), (40, 2), (-7, 7)] {
        let sum: Sum = client_dispatcher.call(&Add { a, b }, &*client_router, Duration::from_secs(1))?;
        println!("{a} + {b} = {}", sum.value);
    }
    server_dispatcher.send(&Status { served: 3 })?;
    thread::sleep(Duration::from_millis(50));

    client_stream.shutdown(Shutdown::Both)?;
    for listener in listeners {
        if let Err(err) = listener.join().map_err(|_| "listener panicked")? {
            eprintln!("listener stopped: {err}");
        }
    }
    Ok(())
}
