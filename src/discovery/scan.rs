//! Local network scanning.
//!
//! # Responsibilities
//! - Derive the local /24 prefix from the device address
//! - Enumerate candidate URLs from host suffixes × ports
//! - Probe candidates in bounded batches, stopping at the first hit
//!
//! # Design Decisions
//! - Address discovery is best-effort; failures fall back to a configured prefix
//! - Batches run concurrently inside, sequentially across, with a pause between
//! - Within a batch the earliest candidate in enumeration order wins

use futures_util::future::join_all;
use std::collections::HashSet;
use std::net::{Ipv4Addr, UdpSocket};
use std::time::Duration;

use crate::config::DiscoveryConfig;
use crate::health::Probe;

/// Best-effort IPv4 address of the interface used for outbound traffic.
///
/// Connecting a UDP socket only selects a route; no packet is sent.
pub fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((Ipv4Addr::new(10, 254, 254, 254), 1)).ok()?;
    match socket.local_addr().ok()?.ip() {
        std::net::IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// First three octets of an address, dotted.
pub fn prefix_of(ip: Ipv4Addr) -> String {
    let [a, b, c, _] = ip.octets();
    format!("{}.{}.{}", a, b, c)
}

/// Resolve the prefix to scan: configured override, device address, default.
pub fn network_prefix(config: &DiscoveryConfig) -> String {
    if let Some(prefix) = &config.network_prefix {
        return prefix.clone();
    }
    match local_ipv4() {
        Some(ip) => prefix_of(ip),
        None => {
            tracing::debug!(
                default_prefix = %config.default_prefix,
                "Could not determine device address, using default prefix"
            );
            config.default_prefix.clone()
        }
    }
}

/// Build one candidate URL. Port 80 is left implicit.
pub fn candidate_url(prefix: &str, suffix: u8, port: u16, api_path: &str) -> String {
    let path = api_path.trim_end_matches('/');
    if port == 80 {
        format!("http://{}.{}{}", prefix, suffix, path)
    } else {
        format!("http://{}.{}:{}{}", prefix, suffix, port, path)
    }
}

/// Enumerate candidates for `prefix`, skipping anything in `exclude`.
pub fn candidates(prefix: &str, config: &DiscoveryConfig, exclude: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(config.host_suffixes.len() * config.ports.len());
    for suffix in &config.host_suffixes {
        for port in &config.ports {
            let url = candidate_url(prefix, *suffix, *port, &config.api_path);
            if !exclude.contains(&url) && seen.insert(url.clone()) {
                out.push(url);
            }
        }
    }
    out
}

/// Probe `candidates` in batches and return the first reachable one.
pub async fn scan(
    probe: &dyn Probe,
    candidates: &[String],
    batch_size: usize,
    pause: Duration,
) -> Option<String> {
    let batch_size = batch_size.max(1);
    let batches = candidates.chunks(batch_size);
    let total = batches.len();

    for (index, batch) in batches.enumerate() {
        let results = join_all(batch.iter().map(|url| probe.probe(url))).await;

        if let Some((url, _)) = batch
            .iter()
            .zip(results)
            .find(|(_, result)| result.reachable)
        {
            tracing::debug!(url = %url, batch = index, "Scan found reachable server");
            return Some(url.clone());
        }

        if index + 1 < total && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    None
}
