//! The peer agent: serves piece reads to other peers and drives downloads
//! against a tracker. The interactive command surface lives in the `peer`
//! binary; this module holds the parts with real correctness stakes.

pub mod download;
pub mod local_files;
pub mod serve;
pub mod tracker_link;

use crate::endpoint::Endpoint;
use anyhow::{Context, Result};
use std::net::TcpStream;
use std::time::Duration;
use tracker_link::TrackerLink;

/// Connects to the first reachable tracker endpoint in `endpoints`,
/// in order. The first successful `connect` wins; there is no failover
/// once a connection is established.
pub fn connect_to_tracker(endpoints: &[Endpoint]) -> Result<TrackerLink> {
    let mut last_err = None;
    for endpoint in endpoints {
        log::info!("connecting to tracker {}", endpoint);
        match TcpStream::connect_timeout(&endpoint.socket_addr().into(), Duration::from_secs(5)) {
            Ok(stream) => {
                stream.set_read_timeout(Some(Duration::from_secs(30)))?;
                log::info!("connected to tracker {}", endpoint);
                return Ok(TrackerLink::new(stream));
            }
            Err(e) => {
                log::warn!("could not connect to tracker {}: {}", endpoint, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap())
        .context("could not connect to any configured tracker")
}
