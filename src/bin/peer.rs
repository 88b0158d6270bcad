use anyhow::{Context, Result};
use clap::Parser;
use groupshare::config;
use groupshare::endpoint::Endpoint;
use groupshare::hash;
use groupshare::peer::local_files::{file_id, LocalFile, LocalFiles};
use groupshare::peer::{connect_to_tracker, download, serve};
use std::io::{self, BufRead, Write};
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

/// The peer agent: serves piece reads to other peers and drives downloads
/// against a tracker, via an interactive command line.
#[derive(Parser, Debug)]
struct Cli {
    /// This peer's own `ip:port`, advertised to the tracker at login and
    /// used by other peers to fetch pieces directly.
    self_endpoint: String,
    /// Path to the tracker info file (same format the tracker binary reads).
    tracker_info_file: String,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let self_endpoint: Endpoint = args
        .self_endpoint
        .parse()
        .with_context(|| format!("invalid self endpoint {:?}", args.self_endpoint))?;

    let files = Arc::new(LocalFiles::new());

    let listener = TcpListener::bind(self_endpoint.socket_addr())
        .with_context(|| format!("could not bind peer listener on {}", self_endpoint))?;
    log::info!("listening for peers on {}", self_endpoint);
    {
        let files = Arc::clone(&files);
        thread::spawn(move || serve::run(listener, files));
    }

    let tracker_endpoints = config::read_tracker_endpoints(&args.tracker_info_file)?;
    let tracker = Arc::new(connect_to_tracker(&tracker_endpoints)?);

    run_command_loop(self_endpoint, tracker, files)
}

fn run_command_loop(
    self_endpoint: Endpoint,
    tracker: Arc<groupshare::peer::tracker_link::TrackerLink>,
    files: Arc<LocalFiles>,
) -> Result<()> {
    let stdin = io::stdin();
    print!("> ");
    io::stdout().flush().ok();

    for line in stdin.lock().lines() {
        let line = line?;
        let tokens: Vec<&str> = line.split(' ').filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            print!("> ");
            io::stdout().flush().ok();
            continue;
        }

        match tokens[0] {
            "quit" => {
                let _ = tracker.send("quit");
                break;
            }

            "login" => {
                if tokens.len() != 3 {
                    eprintln!("usage: login <user-id> <password>");
                } else {
                    let cmd = format!("login {} {} {}", tokens[1], tokens[2], self_endpoint);
                    reply(tracker.request(&cmd));
                }
            }

            "upload_file" => {
                if tokens.len() != 3 {
                    eprintln!("usage: upload_file <local-path> <group-id>");
                } else if let Err(e) = do_upload(&tracker, &files, tokens[1], tokens[2]) {
                    eprintln!("upload failed: {:#}", e);
                }
            }

            "download_file" => {
                if tokens.len() != 4 {
                    eprintln!("usage: download_file <group-id> <filename> <target-path>");
                } else if let Err(e) = download::start_download(
                    Arc::clone(&tracker),
                    Arc::clone(&files),
                    tokens[1].to_string(),
                    tokens[2].to_string(),
                    PathBuf::from(tokens[3]),
                ) {
                    eprintln!("download failed: {:#}", e);
                }
            }

            _ => reply(tracker.request(&line)),
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    Ok(())
}

fn reply(result: io::Result<Option<String>>) {
    match result {
        Ok(Some(msg)) => println!("Server: {}", msg),
        Ok(None) => {
            eprintln!("tracker disconnected");
            std::process::exit(1);
        }
        Err(e) => eprintln!("tracker communication error: {}", e),
    }
}

fn do_upload(
    tracker: &groupshare::peer::tracker_link::TrackerLink,
    files: &LocalFiles,
    local_path: &str,
    group_id: &str,
) -> Result<()> {
    let file = std::fs::File::open(local_path)
        .with_context(|| format!("could not open {:?}", local_path))?;
    let size = file.metadata()?.len();
    if size == 0 {
        anyhow::bail!("empty file; not uploading");
    }
    let (piece_hashes, whole_hash) = hash::hash_pieces(file)?;

    let cmd = format!(
        "upload_file {} {} {} {} {}",
        local_path,
        group_id,
        whole_hash,
        size,
        piece_hashes.len()
    );
    let final_reply = tracker.upload(&cmd, &piece_hashes)?;
    if final_reply != "file uploaded" {
        anyhow::bail!("tracker rejected upload: {}", final_reply);
    }

    let filename = PathBuf::from(local_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| local_path.to_string());
    files.insert(
        file_id(group_id, &filename),
        LocalFile {
            path: PathBuf::from(local_path),
            size,
            piece_hashes,
            whole_hash,
            remaining: 0,
        },
    );

    println!("Server: {}", final_reply);
    Ok(())
}
