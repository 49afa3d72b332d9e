//! NodeMetricsDb: in-memory time series of node utilization.
//!
//! Series are keyed by (hostname, resource). The series map sits behind an
//! `RwLock` that is only write-locked to add or drop a series; each series
//! has its own mutex, so ingestion for one node does not wait on queries
//! for another.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info};

use fleet_core::Clock;

use crate::types::{MetricValue, MetricWindow, Resource};

type SeriesKey = (String, Resource);

/// Samples of one resource on one node, ordered by timestamp.
#[derive(Default)]
struct Series {
    samples: Mutex<VecDeque<(u64, f64)>>,
}

/// Bounded store of per-node utilization samples.
pub struct NodeMetricsDb {
    series: Arc<RwLock<HashMap<SeriesKey, Arc<Series>>>>,
    /// Samples older than this are dropped by `gc`.
    retention: Duration,
}

impl NodeMetricsDb {
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);

    pub fn new() -> Self {
        Self::with_retention(Self::DEFAULT_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            series: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    /// Append a batch of samples.
    ///
    /// Samples with an unknown metric name are skipped. Out-of-order samples
    /// are accepted and kept in timestamp order.
    pub async fn add(&self, values: impl IntoIterator<Item = MetricValue>) {
        let mut batches: HashMap<SeriesKey, Vec<(u64, f64)>> = HashMap::new();
        for value in values {
            match Resource::from_metric(&value.name) {
                Some(resource) => batches
                    .entry((value.hostname, resource))
                    .or_default()
                    .push((value.timestamp, value.value)),
                None => debug!(
                    metric = %value.name,
                    hostname = %value.hostname,
                    "ignoring unknown metric"
                ),
            }
        }

        for (key, batch) in batches {
            // Append while holding the map lock so gc cannot drop the series underneath.
            let series = self.series.read().await;
            if let Some(s) = series.get(&key) {
                append(&mut *s.samples.lock().await, batch);
                continue;
            }
            drop(series);

            let mut series = self.series.write().await;
            let s = series.entry(key).or_default();
            append(&mut *s.samples.lock().await, batch);
        }
    }

    /// Aggregate all samples of `resource` on `hostnames` taken at or after `since`.
    ///
    /// An empty window is a normal result, not an error.
    pub async fn get_window<S: AsRef<str>>(
        &self,
        since: SystemTime,
        resource: Resource,
        hostnames: &[S],
    ) -> MetricWindow {
        let since = to_epoch_secs(since);
        let targets: Vec<Arc<Series>> = {
            let series = self.series.read().await;
            let unique: BTreeSet<&str> = hostnames.iter().map(|h| h.as_ref()).collect();
            unique
                .into_iter()
                .filter_map(|h| series.get(&(h.to_string(), resource)).cloned())
                .collect()
        };

        let mut count = 0usize;
        let mut sum = 0.0;
        for series in targets {
            let samples = series.samples.lock().await;
            let start = samples.partition_point(|&(t, _)| t < since);
            for &(_, value) in samples.range(start..) {
                count += 1;
                sum += value;
            }
        }

        MetricWindow {
            measurement_count: count,
            average: if count > 0 { sum / count as f64 } else { 0.0 },
        }
    }

    /// Drop every sample older than the retention horizon. Returns the
    /// number of samples removed.
    pub async fn gc(&self, clock: &dyn Clock) -> usize {
        let cutoff = to_epoch_secs(clock.now()).saturating_sub(self.retention.as_secs());
        let mut removed = 0;
        let mut emptied = Vec::new();
        {
            let series = self.series.read().await;
            for (key, s) in series.iter() {
                let mut samples = s.samples.lock().await;
                let expired = samples.partition_point(|&(t, _)| t < cutoff);
                samples.drain(..expired);
                removed += expired;
                if samples.is_empty() {
                    emptied.push(key.clone());
                }
            }
        }

        let dropped = self.drop_if_empty(&emptied).await;
        debug!(removed, series_dropped = dropped, cutoff, "metrics gc done");
        removed
    }

    /// Remove the series among `keys` that hold no samples. Returns how many
    /// were removed.
    async fn drop_if_empty(&self, keys: &[SeriesKey]) -> usize {
        if keys.is_empty() {
            return 0;
        }
        let mut series = self.series.write().await;
        let mut dropped = 0;
        for key in keys {
            // A sample may have arrived since the caller looked.
            let still_empty = match series.get(key) {
                Some(s) => s.samples.lock().await.is_empty(),
                None => false,
            };
            if still_empty {
                series.remove(key);
                dropped += 1;
            }
        }
        dropped
    }

    /// Total number of retained samples.
    pub async fn sample_count(&self) -> usize {
        let series = self.series.read().await;
        let mut total = 0;
        for s in series.values() {
            total += s.samples.lock().await.len();
        }
        total
    }

    /// Hostnames with at least one retained series.
    pub async fn hostnames(&self) -> Vec<String> {
        let series = self.series.read().await;
        let mut hosts: Vec<String> = series.keys().map(|(h, _)| h.clone()).collect();
        hosts.sort();
        hosts.dedup();
        hosts
    }

    /// Run the gc loop until shutdown signal.
    pub async fn run_gc(
        &self,
        clock: Arc<dyn Clock>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            interval_secs = interval.as_secs(),
            retention_secs = self.retention.as_secs(),
            "metrics gc started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.gc(clock.as_ref()).await;
                }
                _ = shutdown.changed() => {
                    info!("metrics gc shutting down");
                    break;
                }
            }
        }
    }
}

impl Default for NodeMetricsDb {
    fn default() -> Self {
        Self::new()
    }
}

/// Insert samples keeping timestamp order.
fn append(samples: &mut VecDeque<(u64, f64)>, batch: Vec<(u64, f64)>) {
    for (timestamp, value) in batch {
        match samples.back() {
            Some(&(last, _)) if timestamp < last => {
                let at = samples.partition_point(|&(t, _)| t <= timestamp);
                samples.insert(at, (timestamp, value));
            }
            _ => samples.push_back((timestamp, value)),
        }
    }
}

fn to_epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_core::ManualClock;

    const START: u64 = 1_600_000_000;

    fn cpu(hostname: &str, timestamp: u64, value: f64) -> MetricValue {
        MetricValue::new(hostname, "cpu.util", timestamp, value)
    }

    /// 40 cpu samples at 10 minute spacing; the clock ends one minute past the last.
    async fn forty_samples(db: &NodeMetricsDb, clock: &ManualClock) {
        let mut values = Vec::new();
        for _ in 0..40 {
            values.push(cpu("host0", clock.epoch_secs(), 0.9));
            clock.advance(Duration::from_secs(10 * 60));
        }
        db.add(values).await;
        // Keep the window start off a sample timestamp.
        clock.advance(Duration::from_secs(60));
    }

    fn six_hours_ago(clock: &ManualClock) -> SystemTime {
        clock.now() - Duration::from_secs(6 * 60 * 60)
    }

    #[tokio::test]
    async fn window_and_gc() {
        let db = NodeMetricsDb::new();
        let clock = ManualClock::at_epoch_secs(START);
        forty_samples(&db, &clock).await;

        let hosts = ["host0"];
        let cpu = db.get_window(six_hours_ago(&clock), Resource::Cpu, &hosts).await;
        assert_eq!(cpu.measurement_count, 35);
        assert!((cpu.average - 0.9).abs() < 1e-9);
        let memory = db.get_window(six_hours_ago(&clock), Resource::Memory, &hosts).await;
        assert_eq!(memory.measurement_count, 0);

        assert_eq!(db.gc(&clock).await, 35);

        let cpu = db.get_window(six_hours_ago(&clock), Resource::Cpu, &hosts).await;
        assert_eq!(cpu.measurement_count, 5);
        let memory = db.get_window(six_hours_ago(&clock), Resource::Memory, &hosts).await;
        assert_eq!(memory.measurement_count, 0);
    }

    #[tokio::test]
    async fn repeated_hostnames_count_once() {
        let db = NodeMetricsDb::new();
        db.add(vec![cpu("host0", START, 0.4), cpu("host1", START, 0.8)]).await;

        let window = db
            .get_window(UNIX_EPOCH, Resource::Cpu, &["host0", "host0", "host1", "host0"])
            .await;
        assert_eq!(window.measurement_count, 2);
        assert!((window.average - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn refilled_series_is_not_dropped() {
        let db = NodeMetricsDb::new();
        db.add(vec![cpu("host0", START, 0.5), cpu("host1", START, 0.5)]).await;
        let clock = ManualClock::at_epoch_secs(START + 2 * 60 * 60);
        assert_eq!(db.gc(&clock).await, 2);
        assert!(db.hostnames().await.is_empty());

        // Both found empty, then host0 receives a sample before the drop.
        db.add(vec![cpu("host0", START, 0.5), cpu("host1", START, 0.5)]).await;
        {
            let series = db.series.read().await;
            for s in series.values() {
                s.samples.lock().await.clear();
            }
        }
        db.add(vec![cpu("host0", START + 1, 0.7)]).await;
        let keys = vec![
            ("host0".to_string(), Resource::Cpu),
            ("host1".to_string(), Resource::Cpu),
        ];

        assert_eq!(db.drop_if_empty(&keys).await, 1);
        assert_eq!(db.hostnames().await, vec!["host0"]);
        assert_eq!(db.sample_count().await, 1);
    }

    #[tokio::test]
    async fn empty_window_is_not_an_error() {
        let db = NodeMetricsDb::new();
        let window = db
            .get_window(UNIX_EPOCH, Resource::Disk, &["nowhere"])
            .await;

        assert!(window.is_empty());
        assert_eq!(window.average, 0.0);
    }

    #[tokio::test]
    async fn window_spans_several_nodes() {
        let db = NodeMetricsDb::new();
        db.add(vec![
            cpu("host0", START, 0.2),
            cpu("host1", START, 0.4),
            cpu("host2", START, 1.0),
            MetricValue::new("host0", "mem.util", START, 0.7),
        ])
        .await;

        let since = UNIX_EPOCH + Duration::from_secs(START);
        let window = db.get_window(since, Resource::Cpu, &["host0", "host1"]).await;
        assert_eq!(window.measurement_count, 2);
        assert!((window.average - 0.3).abs() < 1e-9);

        let memory = db.get_window(since, Resource::Memory, &["host0", "host1"]).await;
        assert_eq!(memory.measurement_count, 1);
    }

    #[tokio::test]
    async fn since_is_inclusive() {
        let db = NodeMetricsDb::new();
        db.add(vec![cpu("host0", START, 0.5), cpu("host0", START + 10, 0.5)])
            .await;

        let since = UNIX_EPOCH + Duration::from_secs(START + 10);
        assert_eq!(
            db.get_window(since, Resource::Cpu, &["host0"]).await.measurement_count,
            1
        );
    }

    #[tokio::test]
    async fn out_of_order_samples_are_kept() {
        let db = NodeMetricsDb::new();
        db.add(vec![cpu("host0", START + 20, 0.1)]).await;
        db.add(vec![cpu("host0", START, 0.1), cpu("host0", START + 10, 0.1)])
            .await;

        let since = UNIX_EPOCH + Duration::from_secs(START + 5);
        let window = db.get_window(since, Resource::Cpu, &["host0"]).await;
        assert_eq!(window.measurement_count, 2);
        assert_eq!(db.sample_count().await, 3);
    }

    #[tokio::test]
    async fn unknown_metrics_are_ignored() {
        let db = NodeMetricsDb::new();
        db.add(vec![MetricValue::new("host0", "gpu.util", START, 1.0)])
            .await;

        assert_eq!(db.sample_count().await, 0);
        assert!(db.hostnames().await.is_empty());
    }

    #[tokio::test]
    async fn gc_drops_empty_series() {
        let db = NodeMetricsDb::with_retention(Duration::from_secs(60));
        db.add(vec![cpu("old", START, 0.5), cpu("new", START + 100, 0.5)])
            .await;

        let clock = ManualClock::at_epoch_secs(START + 120);
        assert_eq!(db.gc(&clock).await, 1);
        assert_eq!(db.hostnames().await, vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn concurrent_ingest_and_query() {
        let db = Arc::new(NodeMetricsDb::new());
        let clock = Arc::new(ManualClock::at_epoch_secs(START));

        let mut writers = Vec::new();
        for n in 0..4 {
            let db = db.clone();
            writers.push(tokio::spawn(async move {
                let host = format!("host{n}");
                for i in 0..50 {
                    db.add(vec![cpu(&host, START + i, 0.5)]).await;
                }
            }));
        }
        let reader = {
            let db = db.clone();
            tokio::spawn(async move {
                let hosts = ["host0", "host1", "host2", "host3"];
                for _ in 0..50 {
                    let w = db.get_window(UNIX_EPOCH, Resource::Cpu, &hosts).await;
                    assert!(w.measurement_count <= 200);
                }
            })
        };
        let collector = {
            let db = db.clone();
            let clock = clock.clone();
            tokio::spawn(async move {
                for _ in 0..10 {
                    db.gc(clock.as_ref()).await;
                }
            })
        };

        for w in writers {
            w.await.unwrap();
        }
        reader.await.unwrap();
        collector.await.unwrap();

        let hosts = ["host0", "host1", "host2", "host3"];
        let window = db.get_window(UNIX_EPOCH, Resource::Cpu, &hosts).await;
        assert_eq!(window.measurement_count, 200);
    }

    #[tokio::test]
    async fn run_gc_stops_on_shutdown() {
        let db = Arc::new(NodeMetricsDb::new());
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::at_epoch_secs(START));
        let (tx, rx) = watch::channel(false);

        let handle = {
            let db = db.clone();
            tokio::spawn(async move { db.run_gc(clock, Duration::from_secs(3600), rx).await })
        };
        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn metric_values_deserialize_from_telemetry_json() {
        let json = r#"{"hostname":"host0","name":"cpu.util","timestamp":1600000000,"value":0.9}"#;
        let value: MetricValue = serde_json::from_str(json).unwrap();
        assert_eq!(value, cpu("host0", START, 0.9));
    }
}
