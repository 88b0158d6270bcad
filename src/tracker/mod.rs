//! The tracker service: binds a TCP listener and spawns one detached
//! thread per accepted connection, each running the command loop in
//! [`handler::handle_connection`] against a shared, mutex-protected
//! [`state::TrackerState`].

pub mod command;
pub mod handler;
pub mod response;
pub mod session;
pub mod state;

use crate::endpoint::Endpoint;
use anyhow::{Context, Result};
use state::TrackerState;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

/// Binds `endpoint` and serves forever, never returning on success.
pub fn run(endpoint: Endpoint) -> Result<()> {
    let listener = TcpListener::bind(endpoint.socket_addr())
        .with_context(|| format!("could not bind tracker to {}", endpoint))?;
    log::info!("tracker listening on {}", endpoint);

    let state = Arc::new(TrackerState::new());

    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("could not accept connection: {}", e);
                continue;
            }
        };
        let state = Arc::clone(&state);
        thread::spawn(move || handler::handle_connection(stream, state));
    }

    Ok(())
}
