//! Prometheus Exposition
//!
//! Renders every registered group's counters in the Prometheus text format.
//! A fresh registry is built per scrape from the groups' snapshots, so the
//! counters in [`GroupStats`](crate::group::GroupStats) stay the only source
//! of truth.

use prometheus::core::Collector;
use prometheus::{Encoder, GaugeVec, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};
use crate::group::{GroupRegistry, GroupStatsSnapshot};

/// Counter name, help text and value, in a fixed order
fn counters(s: &GroupStatsSnapshot) -> [(&'static str, &'static str, u64); 10] {
    [
        ("gets_total", "Get requests, including those from peers", s.gets),
        ("cache_hits_total", "Gets served from the local store", s.cache_hits),
        ("peer_loads_total", "Values fetched from a remote peer", s.peer_loads),
        ("peer_errors_total", "Failed remote fetches", s.peer_errors),
        ("loads_total", "Misses routed through the deduplicator", s.loads),
        ("loads_deduped_total", "Misses answered by an in-flight load", s.loads_deduped),
        ("local_loads_total", "Successful loader calls", s.local_loads),
        ("local_load_errors_total", "Failed loader calls", s.local_load_errors),
        ("server_requests_total", "Gets received over the peer transport", s.server_requests),
        ("invalid_requests_total", "Rejected requests", s.invalid_requests),
    ]
}

fn metric_err(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}

fn opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help).namespace("meshcache")
}

fn register<C: Collector + Clone + 'static>(registry: &Registry, collector: C) -> Result<C> {
    registry
        .register(Box::new(collector.clone()))
        .map_err(metric_err)?;
    Ok(collector)
}

fn counter_vec(registry: &Registry, name: &str, help: &str) -> Result<IntCounterVec> {
    let counter = IntCounterVec::new(opts(name, help), &["group"]).map_err(metric_err)?;
    register(registry, counter)
}

fn gauge_vec(registry: &Registry, name: &str, help: &str) -> Result<IntGaugeVec> {
    let gauge = IntGaugeVec::new(opts(name, help), &["group"]).map_err(metric_err)?;
    register(registry, gauge)
}

fn as_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

/// Render all groups in `groups` as Prometheus text
pub fn render(groups: &GroupRegistry) -> Result<String> {
    let registry = Registry::new();

    let counter_vecs = counters(&GroupStatsSnapshot::default())
        .iter()
        .map(|(name, help, _)| counter_vec(&registry, name, help))
        .collect::<Result<Vec<_>>>()?;
    let evictions = counter_vec(&registry, "cache_evictions_total", "Local store evictions")?;
    let entries = gauge_vec(&registry, "cache_entries", "Entries in the local store")?;
    let bytes = gauge_vec(&registry, "cache_bytes", "Accounted bytes in the local store")?;
    let hit_ratio = GaugeVec::new(
        opts("cache_hit_ratio", "Fraction of gets served from the local store"),
        &["group"],
    )
    .map_err(metric_err)?;
    let hit_ratio = register(&registry, hit_ratio)?;

    for group in groups.groups() {
        let name = group.name();
        let snapshot = group.stats();
        for (counter, (_, _, value)) in counter_vecs.iter().zip(counters(&snapshot)) {
            counter.with_label_values(&[name]).inc_by(value);
        }
        evictions
            .with_label_values(&[name])
            .inc_by(group.cache_evictions());
        entries
            .with_label_values(&[name])
            .set(as_i64(group.cache_len() as u64));
        bytes
            .with_label_values(&[name])
            .set(as_i64(group.cache_bytes()));
        hit_ratio
            .with_label_values(&[name])
            .set(snapshot.hit_ratio());
    }

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(metric_err)?;
    String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics: {}", e)))
}

/// Content type for [`render`] output
pub fn content_type() -> String {
    TextEncoder::new().format_type().to_string()
}
