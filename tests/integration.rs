//! End-to-end exercise of the tracker + peer agents over real loopback
//! TCP: registration, group membership, an upload, a download that goes
//! through the rarest-piece query and peer-to-peer transfer, and the
//! `stop_share` removal of a provider.

use groupshare::endpoint::Endpoint;
use groupshare::hash;
use groupshare::peer::local_files::{file_id, LocalFile, LocalFiles};
use groupshare::peer::tracker_link::TrackerLink;
use groupshare::peer::{download, serve};
use groupshare::tracker::handler::handle_connection;
use groupshare::tracker::state::TrackerState;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn spawn_tracker() -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(TrackerState::new());
    thread::spawn(move || {
        for incoming in listener.incoming() {
            let Ok(stream) = incoming else { continue };
            let state = Arc::clone(&state);
            thread::spawn(move || handle_connection(stream, state));
        }
    });
    format!("{}:{}", addr.ip(), addr.port()).parse().unwrap()
}

fn spawn_peer_server(files: Arc<LocalFiles>) -> Endpoint {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || serve::run(listener, files));
    format!("{}:{}", addr.ip(), addr.port()).parse().unwrap()
}

fn connect(tracker: Endpoint) -> Arc<TrackerLink> {
    Arc::new(TrackerLink::new(
        TcpStream::connect(tracker.socket_addr()).unwrap(),
    ))
}

fn wait_until<F: Fn() -> bool>(timeout: Duration, cond: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

#[test]
fn two_peers_share_a_group_and_a_file() {
    let tracker = spawn_tracker();

    let files_a = Arc::new(LocalFiles::new());
    let peer_a_addr = spawn_peer_server(Arc::clone(&files_a));
    let link_a = connect(tracker);

    let files_b = Arc::new(LocalFiles::new());
    let peer_b_addr = spawn_peer_server(Arc::clone(&files_b));
    let link_b = connect(tracker);

    assert_eq!(
        link_a.request("create_user alice pw").unwrap().unwrap(),
        "user created"
    );
    assert_eq!(
        link_a
            .request(&format!("login alice pw {}", peer_a_addr))
            .unwrap()
            .unwrap(),
        "logged in"
    );
    assert_eq!(
        link_a.request("create_group g").unwrap().unwrap(),
        "group created"
    );

    assert_eq!(
        link_b.request("create_user bob pw").unwrap().unwrap(),
        "user created"
    );
    assert_eq!(
        link_b
            .request(&format!("login bob pw {}", peer_b_addr))
            .unwrap()
            .unwrap(),
        "logged in"
    );
    assert_eq!(
        link_b.request("join_group g").unwrap().unwrap(),
        "request sent"
    );
    assert_eq!(
        link_a.request("accept_request g bob").unwrap().unwrap(),
        "request accepted"
    );

    let dir = tempfile::tempdir().unwrap();
    let source_path = dir.path().join("source.bin");
    std::fs::write(&source_path, b"hello group file sharing").unwrap();
    let (piece_hashes, whole_hash) =
        hash::hash_pieces(std::fs::File::open(&source_path).unwrap()).unwrap();
    let size = std::fs::metadata(&source_path).unwrap().len();

    let upload_cmd = format!(
        "upload_file {} g {} {} {}",
        source_path.display(),
        whole_hash,
        size,
        piece_hashes.len()
    );
    assert_eq!(link_a.upload(&upload_cmd, &piece_hashes).unwrap(), "file uploaded");
    files_a.insert(
        file_id("g", "source.bin"),
        LocalFile {
            path: source_path.clone(),
            size,
            piece_hashes: piece_hashes.clone(),
            whole_hash: whole_hash.clone(),
            remaining: 0,
        },
    );

    assert_eq!(
        link_b.request("list_files g").unwrap().unwrap(),
        format!("source.bin\t{}", size)
    );

    let target_path = dir.path().join("downloaded.bin");
    download::start_download(
        Arc::clone(&link_b),
        Arc::clone(&files_b),
        "g".to_string(),
        "source.bin".to_string(),
        target_path.clone(),
    )
    .unwrap();

    let id = file_id("g", "source.bin");
    let downloaded = wait_until(Duration::from_secs(5), || {
        files_b.get(&id).map(|f| f.remaining == 0).unwrap_or(false)
    });
    assert!(downloaded, "download did not complete in time");
    assert_eq!(std::fs::read(&target_path).unwrap(), b"hello group file sharing");

    assert_eq!(
        link_a.request("stop_share g source.bin").unwrap().unwrap(),
        "stopped sharing"
    );
    let reply = link_a
        .request("get_rarest_piece_info g source.bin")
        .unwrap()
        .unwrap();
    // Alice no longer provides any piece, but Bob now does: the tracker
    // still reports Bob as a provider for the piece Alice lacks.
    assert!(reply.starts_with("Success"));
    assert!(!reply.contains(&peer_a_addr.to_string()));
}
