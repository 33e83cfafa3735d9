//! Text reports printed at shutdown.

use std::fmt;

use hdrhistogram::Histogram;

use crate::command::RejectReason;
use crate::engine::EngineStats;
use crate::feed::FeedSnapshot;
use crate::listener::MetricsListener;
use crate::sequence::SequenceMonitor;

/// Percentile summary of a nanosecond latency histogram.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LatencySummary {
    pub count: u64,
    pub min: u64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub p999: u64,
    pub p9999: u64,
    pub max: u64,
}

impl LatencySummary {
    pub fn from_histogram(histogram: &Histogram<u64>) -> Self {
        if histogram.is_empty() {
            return Self::default();
        }
        Self {
            count: histogram.len(),
            min: histogram.min(),
            p50: histogram.value_at_quantile(0.50),
            p90: histogram.value_at_quantile(0.90),
            p99: histogram.value_at_quantile(0.99),
            p999: histogram.value_at_quantile(0.999),
            p9999: histogram.value_at_quantile(0.9999),
            max: histogram.max(),
        }
    }
}

impl fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Samples: {:8}", self.count)?;
        writeln!(f, "Min:    {:8} ns", self.min)?;
        writeln!(f, "P50:    {:8} ns", self.p50)?;
        writeln!(f, "P90:    {:8} ns", self.p90)?;
        writeln!(f, "P99:    {:8} ns", self.p99)?;
        writeln!(f, "P99.9:  {:8} ns", self.p999)?;
        writeln!(f, "P99.99: {:8} ns", self.p9999)?;
        write!(f, "Max:    {:8} ns", self.max)
    }
}

/// Log-scale bucket counts, one line per non-empty bucket.
pub fn distribution(histogram: &Histogram<u64>) -> String {
    let mut out = String::new();
    let mut lower = 0;
    for v in histogram.iter_log(100, 2.0) {
        let count = v.count_since_last_iteration();
        let upper = v.value_iterated_to();
        if count > 0 {
            out.push_str(&format!("{lower:8} - {upper:8} ns: {count:10}\n"));
        }
        lower = upper + 1;
    }
    out
}

/// Everything the feed-handler prints when it stops.
pub struct PipelineReport<'a> {
    pub feed: FeedSnapshot,
    pub engine: EngineStats,
    pub sequence: &'a SequenceMonitor,
    pub metrics: &'a MetricsListener,
    pub events_dropped: u64,
    pub latency: LatencySummary,
}

impl fmt::Display for PipelineReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Feed ===")?;
        writeln!(f, "Received:   {:10}", self.feed.received)?;
        writeln!(f, "Accepted:   {:10}", self.feed.accepted)?;
        writeln!(f, "Dropped:    {:10}", self.feed.dropped)?;
        writeln!(f, "Malformed:  {:10}", self.feed.malformed)?;
        writeln!(f, "High water: {:10}", self.feed.high_water)?;
        writeln!(f, "=== Sequence ===")?;
        let last_seen = self
            .sequence
            .last_seen()
            .map_or_else(|| "-".to_string(), |s| s.to_string());
        writeln!(f, "Last seen:  {:>10}", last_seen)?;
        writeln!(f, "Lost:       {:10}", self.sequence.lost())?;
        writeln!(f, "Gaps:       {:10}", self.sequence.gaps())?;
        writeln!(f, "Stale:      {:10}", self.sequence.stale())?;
        writeln!(f, "=== Book ===")?;
        writeln!(f, "Processed:  {:10}", self.engine.processed)?;
        writeln!(f, "Trades:     {:10}", self.metrics.trades)?;
        writeln!(f, "Volume:     {:10}", self.metrics.traded_qty)?;
        writeln!(f, "Added:      {:10}", self.metrics.orders_added)?;
        writeln!(f, "Cancelled:  {:10}", self.metrics.orders_cancelled)?;
        for reason in RejectReason::ALL {
            writeln!(f, "Rejected {:?}: {}", reason, self.metrics.rejects(reason))?;
        }
        writeln!(f, "Events lost to telemetry: {}", self.events_dropped)?;
        writeln!(f, "=== Wire-to-match latency ===")?;
        write!(f, "{}", self.latency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_of_empty_histogram() {
        let h = Histogram::<u64>::new(3).unwrap();
        assert_eq!(LatencySummary::from_histogram(&h), LatencySummary::default());
        assert!(distribution(&h).is_empty());
    }

    #[test]
    fn test_summary_percentiles() {
        let mut h = Histogram::<u64>::new_with_bounds(1, 1_000_000, 3).unwrap();
        for v in 1..=1000u64 {
            h.record(v).unwrap();
        }

        let s = LatencySummary::from_histogram(&h);
        assert_eq!(s.count, 1000);
        assert_eq!(s.min, 1);
        assert!((495..=505).contains(&s.p50), "p50 {}", s.p50);
        assert!(s.max >= 1000);
        assert!(s.to_string().contains("P99.9"));
    }
}
