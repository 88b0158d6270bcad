use clap::Parser;
use groupshare::config;
use groupshare::tracker;

/// The group file-sharing tracker: binds one of the two endpoints listed
/// in a tracker info file and serves the command grammar forever.
#[derive(Parser, Debug)]
struct Cli {
    /// Path to a tracker info file: two `ip:port` lines.
    tracker_info_file: String,
    /// Which line to bind (1 or 2).
    tracker_number: usize,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Cli::parse();

    let endpoint = config::select_tracker_endpoint(&args.tracker_info_file, args.tracker_number)?;
    tracker::run(endpoint)
}
