use anyhow::{anyhow, Result};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::str::FromStr;

/// An IPv4 address plus TCP port, serialized on the wire as `"a.b.c.d:port"`.
///
/// Every login binds one of these to a tracker connection, and every
/// provider entry in a rarest-piece response is one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(SocketAddrV4);

impl Endpoint {
    pub fn new(ip: Ipv4Addr, port: u16) -> Result<Self> {
        if port == 0 {
            return Err(anyhow!("port must be in 1..65535"));
        }
        Ok(Endpoint(SocketAddrV4::new(ip, port)))
    }

    pub fn socket_addr(&self) -> SocketAddrV4 {
        self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.0.ip(), self.0.port())
    }
}

impl FromStr for Endpoint {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (ip, port) = s
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("invalid endpoint {:?}, expected ip:port", s))?;
        let ip: Ipv4Addr = ip
            .parse()
            .map_err(|_| anyhow!("invalid ipv4 address {:?}", ip))?;
        let port: u16 = port
            .parse()
            .map_err(|_| anyhow!("invalid port {:?}", port))?;
        Endpoint::new(ip, port)
    }
}
