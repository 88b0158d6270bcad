//! The peer's serve side: accept inbound connections from other peers and
//! answer `request_file_piece` with raw piece bytes. Serves no state back
//! to the tracker — advertisement is the downloader's job via
//! `update_piece_info`.

use crate::hash::PIECE_SIZE;
use crate::peer::local_files::LocalFiles;
use crate::wire;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

pub fn run(listener: TcpListener, files: Arc<LocalFiles>) {
    for incoming in listener.incoming() {
        let stream = match incoming {
            Ok(stream) => stream,
            Err(e) => {
                log::error!("could not accept peer connection: {}", e);
                continue;
            }
        };
        let files = Arc::clone(&files);
        thread::spawn(move || handle_peer(stream, files));
    }
}

fn handle_peer(mut stream: TcpStream, files: Arc<LocalFiles>) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    log::info!("peer connected: {}", peer);

    loop {
        let msg = match wire::recv_str(&mut stream) {
            Ok(Some(msg)) => msg,
            Ok(None) => break,
            Err(e) => {
                log::warn!("read error from peer {}: {}", peer, e);
                break;
            }
        };
        if msg.trim().is_empty() || msg.trim() == "quit" {
            break;
        }

        match parse_request(&msg) {
            Some((file_id, piece_number)) => {
                if let Err(e) = serve_piece(&mut stream, &files, &file_id, piece_number) {
                    log::warn!("serving piece to {} failed: {}", peer, e);
                    break;
                }
            }
            None => {
                if wire::send_str(&mut stream, "INVALID COMMAND").is_err() {
                    break;
                }
            }
        }
    }
    log::info!("peer disconnected: {}", peer);
}

/// Parses `"request_file_piece <group-id>::<filename> <piece-number>"`.
fn parse_request(msg: &str) -> Option<(String, usize)> {
    let mut tokens = msg.split(' ').filter(|t| !t.is_empty());
    if tokens.next()? != "request_file_piece" {
        return None;
    }
    let file_id = tokens.next()?.to_string();
    let piece_number: usize = tokens.next()?.parse().ok()?;
    if piece_number == 0 {
        return None;
    }
    Some((file_id, piece_number))
}

fn serve_piece(
    stream: &mut TcpStream,
    files: &LocalFiles,
    file_id: &str,
    piece_number: usize,
) -> std::io::Result<()> {
    let Some(local) = files.get(file_id) else {
        return wire::send_str(stream, "file does not exist");
    };

    let piece_index = piece_number - 1;
    let mut file = File::open(&local.path)?;
    file.seek(SeekFrom::Start(piece_index as u64 * PIECE_SIZE))?;
    let mut buf = vec![0u8; PIECE_SIZE as usize];
    let n = read_fill(&mut file, &mut buf)?;
    drop(file);

    wire::send_str(stream, "Success")?;
    wire::send(stream, &buf[..n])
}

fn read_fill(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}
