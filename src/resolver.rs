//! Predicate-based stream discovery, adapted from the device-bridge LSL
//! integration's `StreamResolver::discover_streams`: `lsl::resolve_bypred`
//! is a blocking FFI call, and `lsl::StreamInfo` is not `Send`, so every
//! field we need is extracted into a plain, Send-safe struct before the
//! `spawn_blocking` closure returns.

use crate::error::{EngineError, Result};
use crate::sample::{ChannelFormat, StreamDescriptor};
use tracing::debug;

/// One match from a resolver call, with everything extracted out of the
/// non-Send `lsl::StreamInfo` already.
#[derive(Debug, Clone)]
pub struct ResolvedStream {
    pub descriptor: StreamDescriptor,
    pub uid: String,
}

/// Resolve every currently-advertised stream matching `predicate` (an LSL
/// XPath-like predicate string), waiting up to `timeout` seconds.
pub async fn resolve(predicate: String, timeout: f64) -> Result<Vec<ResolvedStream>> {
    tokio::task::spawn_blocking(move || resolve_blocking(&predicate, timeout))
        .await
        .map_err(|e| EngineError::LslLibraryError(format!("resolver task panicked: {e}")))?
}

fn resolve_blocking(predicate: &str, timeout: f64) -> Result<Vec<ResolvedStream>> {
    let streams = lsl::resolve_bypred(predicate, 0, timeout)
        .map_err(|e| EngineError::LslLibraryError(format!("resolve_bypred failed: {e:?}")))?;

    let resolved = streams
        .iter()
        .map(|info| ResolvedStream {
            descriptor: StreamDescriptor {
                name: info.stream_name(),
                content_type: info.stream_type(),
                channel_count: info.channel_count() as u32,
                nominal_srate: info.nominal_srate(),
                channel_format: ChannelFormat::from_lsl(info.channel_format()),
                source_id: info.source_id(),
                hostname: info.hostname(),
                channel_labels: Vec::new(),
                channel_types: Vec::new(),
                channel_units: Vec::new(),
                desc: Default::default(),
            },
            uid: info.uid(),
        })
        .collect::<Vec<_>>();

    debug!(predicate, count = resolved.len(), "resolver tick");
    Ok(resolved)
}

/// Compose the standard relay predicate (spec.md §4.6): exclude the
/// engine's own relay/monitor/control streams so a relay never picks
/// itself up on the next resolver tick, scoped to `hostname` unless
/// non-local relaying is requested.
pub fn relay_predicate(hostname: Option<&str>) -> String {
    let mut predicate = "not(starts-with(name,'_relay_')) and not(starts-with(name,'_monitor_')) \
        and not(type='control') and not(type='Markers')"
        .to_string();
    if let Some(hostname) = hostname {
        predicate.push_str(&format!(" and hostname='{hostname}'"));
    }
    predicate
}

/// The predicate used by the Monitor aggregator to find every monitor
/// heartbeat outlet on the network.
pub fn monitor_predicate() -> String {
    "starts-with(name,'_monitor_')".to_string()
}

/// Compound predicate a Relay Worker uses to find its one specific
/// upstream (spec.md §4.4).
pub fn upstream_predicate(name: &str, content_type: &str, channel_count: u32, hostname: Option<&str>) -> String {
    let mut predicate = format!("name='{name}' and type='{content_type}' and channel_count={channel_count}");
    if let Some(hostname) = hostname {
        predicate.push_str(&format!(" and hostname='{hostname}'"));
    }
    predicate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_predicate_excludes_relay_and_monitor_and_control() {
        let predicate = relay_predicate(None);
        assert!(predicate.contains("_relay_"));
        assert!(predicate.contains("_monitor_"));
        assert!(predicate.contains("control"));
    }

    #[test]
    fn relay_predicate_scopes_to_hostname_when_given() {
        let predicate = relay_predicate(Some("labpc01"));
        assert!(predicate.contains("hostname='labpc01'"));
    }

    #[test]
    fn monitor_predicate_matches_monitor_prefix() {
        assert_eq!(monitor_predicate(), "starts-with(name,'_monitor_')");
    }
}
