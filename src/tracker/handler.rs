//! Per-connection tracker handling: read one framed text message at a
//! time, dispatch it, write the reply. `upload_file` is special-cased here
//! because its sub-protocol reads further framed messages directly off the
//! wire — the rest of the grammar flows straight through
//! [`TrackerState::dispatch`].

use crate::tracker::command::{self, Command};
use crate::tracker::response::Response;
use crate::tracker::session::Session;
use crate::tracker::state::TrackerState;
use crate::wire;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;

pub fn handle_connection(mut stream: TcpStream, state: Arc<TrackerState>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    log::info!("client connected: {}", peer);

    let mut session = Session::default();
    loop {
        let msg = match wire::recv_str(&mut stream) {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                log::info!("client disconnected: {}", peer);
                break;
            }
            Err(e) => {
                log::warn!("read error from {}: {}", peer, e);
                break;
            }
        };

        if msg.trim() == "quit" {
            log::info!("client quit: {}", peer);
            break;
        }

        log::debug!("{} -> {:?}", peer, msg);
        let cmd = command::parse(&msg);

        let reply = if let Command::UploadFile {
            local_path,
            group_id,
            whole_hash,
            size,
            piece_count,
        } = cmd
        {
            handle_upload(&mut stream, &state, &mut session, local_path, group_id, whole_hash, size, piece_count)
        } else {
            state.dispatch(cmd, &mut session).into_wire()
        };

        if let Err(e) = wire::send_str(&mut stream, &reply) {
            log::warn!("write error to {}: {}", peer, e);
            break;
        }
    }

    state.teardown_session(&mut session);
}

/// Drives the `upload_file` sub-protocol: validate preconditions, reply
/// `"Success"`, read exactly `piece_count` framed hash messages, then
/// install the file entry and reply `"file uploaded"`.
#[allow(clippy::too_many_arguments)]
fn handle_upload(
    stream: &mut (impl Read + Write),
    state: &TrackerState,
    session: &mut Session,
    local_path: String,
    group_id: String,
    whole_hash: String,
    size: String,
    piece_count: String,
) -> String {
    let Some(uploader_id) = session.user_id().map(str::to_string) else {
        return "login first".to_string();
    };
    let (file_name, uploader) = match state.check_upload_preconditions(session, &local_path, &group_id) {
        Ok(ok) => ok,
        Err(reply) => return reply,
    };
    let Ok(size) = size.parse::<u64>() else {
        return "invalid argument".to_string();
    };
    let Ok(piece_count) = piece_count.parse::<usize>() else {
        return "invalid argument".to_string();
    };
    if piece_count == 0 {
        return "invalid argument".to_string();
    }

    if wire::send_str(stream, "Success").is_err() {
        return String::new();
    }

    let mut piece_hashes = Vec::with_capacity(piece_count);
    for _ in 0..piece_count {
        match wire::recv_str(stream) {
            Ok(Some(hash)) => piece_hashes.push(hash),
            _ => return String::new(),
        }
    }

    match state.finish_upload(
        &group_id,
        file_name,
        whole_hash,
        size,
        piece_hashes,
        local_path,
        uploader,
        &uploader_id,
    ) {
        Ok(()) => "file uploaded".to_string(),
        Err(reply) => reply,
    }
}
