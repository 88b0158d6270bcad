//! Parsing of the tracker info file: a plain text file whose first two
//! lines are each an `ip:port` endpoint. A tracker binds the line selected
//! by its `tracker-number` argument (1 or 2); a peer reads both lines and
//! tries them in order at connect time.

use crate::endpoint::Endpoint;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub const TRACKER_COUNT: usize = 2;

/// Reads the tracker info file and returns its endpoint lines, in file
/// order. The file must contain at least [`TRACKER_COUNT`] non-empty lines.
pub fn read_tracker_endpoints(path: impl AsRef<Path>) -> Result<Vec<Endpoint>> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)
        .with_context(|| format!("could not read tracker info file {:?}", path))?;

    let endpoints: Result<Vec<Endpoint>> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(TRACKER_COUNT)
        .map(|line| {
            line.trim()
                .parse()
                .with_context(|| format!("invalid tracker endpoint line {:?}", line))
        })
        .collect();
    let endpoints = endpoints?;

    if endpoints.len() < TRACKER_COUNT {
        anyhow::bail!(
            "tracker info file {:?} must contain at least {} endpoint lines, found {}",
            path,
            TRACKER_COUNT,
            endpoints.len()
        );
    }

    Ok(endpoints)
}

/// Returns the single endpoint a tracker process should bind, selected by
/// its 1-based `tracker_number` argument.
pub fn select_tracker_endpoint(
    path: impl AsRef<Path>,
    tracker_number: usize,
) -> Result<Endpoint> {
    if tracker_number == 0 || tracker_number > TRACKER_COUNT {
        anyhow::bail!(
            "tracker-number must be in 1..={}, got {}",
            TRACKER_COUNT,
            tracker_number
        );
    }
    let endpoints = read_tracker_endpoints(path)?;
    Ok(endpoints[tracker_number - 1])
}
