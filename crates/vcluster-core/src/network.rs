//! IPv4 address pools.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Largest range accepted in a single `a-b` entry.
const MAX_RANGE_LEN: u32 = 1 << 16;

/// Network section of a VM group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Port group / network name handed to the adapter.
    pub name: String,
    /// Address ranges, either `10.0.0.10-10.0.0.20` or a single address.
    #[serde(default)]
    pub ranges: Vec<String>,
}

/// Free addresses of one network, handed out lowest first.
#[derive(Debug, Clone, PartialEq)]
pub struct IpPool {
    network: String,
    free: BTreeSet<Ipv4Addr>,
}

impl IpPool {
    pub fn from_spec(spec: &NetworkSpec) -> ConfigResult<Self> {
        let mut free = BTreeSet::new();
        for range in &spec.ranges {
            let (start, end) = parse_range(range)?;
            free.extend((u32::from(start)..=u32::from(end)).map(Ipv4Addr::from));
        }
        Ok(Self {
            network: spec.name.clone(),
            free,
        })
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    /// Take an address out of the pool (it is used by an existing VM).
    pub fn remove(&mut self, ip: Ipv4Addr) -> bool {
        self.free.remove(&ip)
    }

    /// Hand out the lowest free address.
    pub fn allocate(&mut self) -> Option<Ipv4Addr> {
        self.free.pop_first()
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

fn parse_range(range: &str) -> ConfigResult<(Ipv4Addr, Ipv4Addr)> {
    let invalid = |reason: &str| ConfigError::InvalidRange {
        range: range.to_string(),
        reason: reason.to_string(),
    };
    let parse = |s: &str| {
        s.trim()
            .parse::<Ipv4Addr>()
            .map_err(|e| invalid(&e.to_string()))
    };

    let (start, end) = match range.split_once('-') {
        Some((a, b)) => (parse(a)?, parse(b)?),
        None => {
            let ip = parse(range)?;
            (ip, ip)
        }
    };
    if u32::from(start) > u32::from(end) {
        return Err(invalid("start is after end"));
    }
    if u32::from(end) - u32::from(start) >= MAX_RANGE_LEN {
        return Err(invalid("range too large"));
    }
    Ok((start, end))
}
