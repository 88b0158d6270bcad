//! The downloader: drives one file from tracker metadata to a complete
//! local copy by repeatedly asking for the rarest piece, fetching it from
//! a provider, verifying its hash, and advertising the new replica.

use crate::endpoint::Endpoint;
use crate::hash::{hex_digest, PIECE_SIZE};
use crate::peer::local_files::{file_id, LocalFile, LocalFiles};
use crate::peer::tracker_link::TrackerLink;
use crate::wire;
use std::fs::OpenOptions;
use std::io::{self, Seek, SeekFrom, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Mandatory minimum per the concurrency model: no attempt to reach or
/// read from a provider blocks forever. A timeout aborts the current
/// attempt and lets the provider-list fallback proceed to the next one.
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends `download_file`, and on a well-formed `Success` reply creates the
/// target file, records the local handle, and spawns the detached thread
/// that fetches every piece. Returns before the download completes.
pub fn start_download(
    tracker: Arc<TrackerLink>,
    files: Arc<LocalFiles>,
    group_id: String,
    filename: String,
    target_path: PathBuf,
) -> anyhow::Result<()> {
    let reply = tracker
        .request(&format!("download_file {} {}", group_id, filename))?
        .ok_or_else(|| anyhow::anyhow!("tracker disconnected"))?;

    let meta = parse_download_meta(&reply)
        .ok_or_else(|| anyhow::anyhow!("unexpected download_file reply: {:?}", reply))?;

    create_preallocated_file(&target_path, meta.size)?;

    let id = file_id(&group_id, &filename);
    files.insert(
        id.clone(),
        LocalFile {
            path: target_path,
            size: meta.size,
            piece_hashes: meta.piece_hashes,
            whole_hash: meta.whole_hash,
            remaining: meta.piece_count,
        },
    );

    thread::spawn(move || run(tracker, files, group_id, filename, id));
    Ok(())
}

struct DownloadMeta {
    size: u64,
    whole_hash: String,
    piece_count: usize,
    piece_hashes: Vec<String>,
}

fn parse_download_meta(reply: &str) -> Option<DownloadMeta> {
    let mut lines = reply.lines();
    if lines.next()? != "Success" {
        return None;
    }
    let header = lines.next()?;
    let mut header_tokens = header.split(' ').filter(|t| !t.is_empty());
    let _group_id = header_tokens.next()?;
    let _filename = header_tokens.next()?;
    let size: u64 = header_tokens.next()?.parse().ok()?;
    let whole_hash = header_tokens.next()?.to_string();
    let piece_count: usize = header_tokens.next()?.parse().ok()?;

    let piece_hashes: Vec<String> = lines.map(str::to_string).collect();
    if piece_hashes.len() != piece_count {
        return None;
    }

    Some(DownloadMeta {
        size,
        whole_hash,
        piece_count,
        piece_hashes,
    })
}

fn create_preallocated_file(path: &Path, size: u64) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    if size > 0 {
        file.seek(SeekFrom::Start(size - 1))?;
        file.write_all(&[0u8])?;
    }
    Ok(())
}

/// Per-piece descriptor parsed from `get_rarest_piece_info`'s reply.
struct RarestPiece {
    piece_number: usize,
    providers: Vec<(Endpoint, String)>,
}

fn parse_rarest_reply(reply: &str) -> Option<Option<RarestPiece>> {
    if reply.is_empty() {
        return Some(None);
    }
    let mut lines = reply.lines();
    if lines.next()? != "Success" {
        return None;
    }
    let piece_number: usize = lines.next()?.parse().ok()?;
    if piece_number == 0 {
        return None;
    }
    let mut providers = Vec::new();
    for line in lines {
        let parts: Vec<&str> = line.splitn(3, ':').collect();
        if parts.len() != 3 {
            return None;
        }
        let endpoint: Endpoint = format!("{}:{}", parts[0], parts[1]).parse().ok()?;
        providers.push((endpoint, parts[2].to_string()));
    }
    Some(Some(RarestPiece {
        piece_number,
        providers,
    }))
}

fn write_piece(path: &Path, piece_index: usize, bytes: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(piece_index as u64 * PIECE_SIZE))?;
    file.write_all(bytes)
}

fn run(
    tracker: Arc<TrackerLink>,
    files: Arc<LocalFiles>,
    group_id: String,
    filename: String,
    id: String,
) {
    loop {
        let Some(local) = files.get(&id) else {
            return;
        };
        if local.remaining == 0 {
            log::info!("file downloaded: {}", id);
            return;
        }

        let reply = match tracker.request(&format!("get_rarest_piece_info {} {}", group_id, filename)) {
            Ok(Some(reply)) => reply,
            Ok(None) | Err(_) => {
                log::error!("tracker disconnected while downloading {}", id);
                files.remove(&id);
                return;
            }
        };

        let piece = match parse_rarest_reply(&reply) {
            Some(Some(piece)) => piece,
            Some(None) => {
                log::warn!("tracker reports no qualifying piece for {}; aborting", id);
                files.remove(&id);
                return;
            }
            None => {
                log::error!("unexpected get_rarest_piece_info reply for {}: {:?}", id, reply);
                files.remove(&id);
                return;
            }
        };

        match fetch_and_write_piece(&local, &id, &piece) {
            Ok(()) => {
                let done = {
                    let mut done = false;
                    files.update(&id, |f| {
                        f.remaining = f.remaining.saturating_sub(1);
                        done = f.remaining == 0;
                    });
                    done
                };
                let _ = tracker.request(&format!(
                    "update_piece_info {} {} {} {}",
                    group_id,
                    filename,
                    local.path.display(),
                    piece.piece_number
                ));
                if done {
                    log::info!("file downloaded: {}", id);
                    return;
                }
            }
            Err(e) => {
                // Every provider for this piece failed (unreachable, a
                // transport error, or a bad hash) — abort the whole
                // download rather than re-querying the tracker for the
                // same piece/provider list forever.
                log::error!(
                    "could not obtain piece {} of {} from any provider, aborting: {}",
                    piece.piece_number,
                    id,
                    e
                );
                files.remove(&id);
                return;
            }
        }
    }
}

/// Fetches one piece, trying each candidate provider in reverse list order
/// (per spec) until one yields a verified piece. A provider that is
/// unreachable, replies with a transport error, or hands back data that
/// fails the SHA-1 check is skipped in favor of the next one — never
/// retried — so a single bad or dead provider cannot spin the download
/// forever. Returns `Err` only once every provider has been tried and
/// failed, which the caller treats as an abort of the whole download.
fn fetch_and_write_piece(local: &LocalFile, id: &str, piece: &RarestPiece) -> io::Result<()> {
    let mut last_err = None;
    for (endpoint, _path) in piece.providers.iter().rev() {
        match fetch_from_provider(endpoint, local, id, piece) {
            Ok(true) => return Ok(()),
            Ok(false) => {
                log::warn!(
                    "piece {} of {} from {} failed integrity check, trying next provider",
                    piece.piece_number,
                    id,
                    endpoint
                );
                last_err = Some(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("piece {} failed integrity check from every provider", piece.piece_number),
                ));
            }
            Err(e) => {
                log::warn!("could not fetch piece {} of {} from {}: {}", piece.piece_number, id, endpoint, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no providers offered")))
}

/// One connect-request-verify attempt against a single provider. Returns
/// `Ok(true)` on a verified write, `Ok(false)` on a hash mismatch (the
/// piece is not written; the caller moves on to the next provider), and
/// `Err` on any connect or transport failure.
fn fetch_from_provider(endpoint: &Endpoint, local: &LocalFile, id: &str, piece: &RarestPiece) -> io::Result<bool> {
    let mut stream = connect_to_provider(endpoint)?;

    wire::send_str(
        &mut stream,
        &format!("request_file_piece {} {}", id, piece.piece_number),
    )?;

    match wire::recv_str(&mut stream)? {
        Some(s) if s == "Success" => {}
        other => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("provider did not reply Success: {:?}", other),
            ))
        }
    }

    let bytes = wire::recv(&mut stream)?
        .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "provider disconnected mid-piece"))?;

    let expected = local.piece_hashes.get(piece.piece_number - 1);
    if expected.map(String::as_str) != Some(hex_digest(&bytes).as_str()) {
        return Ok(false);
    }

    write_piece(&local.path, piece.piece_number - 1, &bytes)?;
    Ok(true)
}

fn connect_to_provider(endpoint: &Endpoint) -> io::Result<TcpStream> {
    let stream = TcpStream::connect_timeout(&endpoint.socket_addr().into(), PROVIDER_TIMEOUT)?;
    stream.set_read_timeout(Some(PROVIDER_TIMEOUT))?;
    stream.set_write_timeout(Some(PROVIDER_TIMEOUT))?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_download_meta() {
        let reply = format!(
            "Success\ng hello.bin 600000 {} 2\n{}\n{}",
            "a".repeat(40),
            "b".repeat(40),
            "c".repeat(40)
        );
        let meta = parse_download_meta(&reply).unwrap();
        assert_eq!(meta.size, 600_000);
        assert_eq!(meta.piece_count, 2);
        assert_eq!(meta.piece_hashes.len(), 2);
    }

    #[test]
    fn rejects_meta_with_mismatched_piece_count() {
        let reply = format!("Success\ng hello.bin 600000 {} 2\n{}", "a".repeat(40), "b".repeat(40));
        assert!(parse_download_meta(&reply).is_none());
    }

    #[test]
    fn parses_rarest_reply_with_providers() {
        let reply = "Success\n2\n1.2.3.4:9000:/tmp/f.bin\n5.6.7.8:9001:/home/f.bin";
        let piece = parse_rarest_reply(reply).unwrap().unwrap();
        assert_eq!(piece.piece_number, 2);
        assert_eq!(piece.providers.len(), 2);
        assert_eq!(piece.providers[0].1, "/tmp/f.bin");
    }

    #[test]
    fn empty_rarest_reply_means_no_piece() {
        assert_eq!(parse_rarest_reply("").unwrap().is_none(), true);
    }

    #[test]
    fn malformed_rarest_reply_is_none() {
        assert!(parse_rarest_reply("garbage").is_none());
    }

    #[test]
    fn preallocates_file_to_declared_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        create_preallocated_file(&path, 1000).unwrap();
        let metadata = std::fs::metadata(&path).unwrap();
        assert_eq!(metadata.len(), 1000);
    }

    /// A one-shot peer stub: accepts a single connection, reads the
    /// request, and replies with either the given bytes or a disconnect.
    fn stub_provider(reply: Option<&'static [u8]>) -> Endpoint {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            let Ok((mut stream, _)) = listener.accept() else { return };
            let _ = wire::recv_str(&mut stream);
            match reply {
                Some(bytes) => {
                    let _ = wire::send_str(&mut stream, "Success");
                    let _ = wire::send(&mut stream, bytes);
                }
                None => drop(stream),
            }
        });
        format!("{}:{}", addr.ip(), addr.port()).parse().unwrap()
    }

    fn local_file_for(piece_bytes: &[u8]) -> (LocalFile, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        create_preallocated_file(&path, piece_bytes.len() as u64).unwrap();
        let local = LocalFile {
            path,
            size: piece_bytes.len() as u64,
            piece_hashes: vec![hex_digest(piece_bytes)],
            whole_hash: hex_digest(piece_bytes),
            remaining: 1,
        };
        (local, dir)
    }

    #[test]
    fn falls_through_to_next_provider_after_a_hash_mismatch() {
        let good_bytes = b"the real piece";
        let (local, _dir) = local_file_for(good_bytes);

        // Reverse list order is tried first, so put the bad provider last
        // in the list (tried first) and the good one first (tried second).
        let bad = stub_provider(Some(b"wrong bytes, bad hash"));
        let good = stub_provider(Some(good_bytes));
        let piece = RarestPiece {
            piece_number: 1,
            providers: vec![(good, "good/path".to_string()), (bad, "bad/path".to_string())],
        };

        fetch_and_write_piece(&local, "g::f.bin", &piece).unwrap();
        assert_eq!(std::fs::read(&local.path).unwrap(), good_bytes);
    }

    #[test]
    fn falls_through_to_next_provider_after_a_disconnect() {
        let good_bytes = b"the real piece";
        let (local, _dir) = local_file_for(good_bytes);

        let dead = stub_provider(None);
        let good = stub_provider(Some(good_bytes));
        let piece = RarestPiece {
            piece_number: 1,
            providers: vec![(good, "good/path".to_string()), (dead, "dead/path".to_string())],
        };

        fetch_and_write_piece(&local, "g::f.bin", &piece).unwrap();
        assert_eq!(std::fs::read(&local.path).unwrap(), good_bytes);
    }

    #[test]
    fn aborts_once_every_provider_has_failed() {
        let (local, _dir) = local_file_for(b"the real piece");

        let piece = RarestPiece {
            piece_number: 1,
            providers: vec![
                (stub_provider(None), "a".to_string()),
                (stub_provider(Some(b"still wrong")), "b".to_string()),
            ],
        };

        assert!(fetch_and_write_piece(&local, "g::f.bin", &piece).is_err());
    }
}
