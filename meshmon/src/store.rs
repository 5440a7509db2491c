//! Thread-safe container of per-source buffers.
//!
//! Locking: one map-level lock guards the source id -> buffer mapping, and each
//! buffer has its own lock. Inserts for different sources only contend on the
//! map lock while resolving their buffer; readers of one buffer never see it
//! mid-insert.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::buffer::{BufferLimits, SourceBuffer};
use crate::sample::Sample;

type SharedBuffer = Arc<RwLock<SourceBuffer>>;

/// Result of a point-in-time query across all sources, keyed by source id.
pub type Snapshot = BTreeMap<String, Sample>;

#[derive(Debug, Default)]
pub struct MultiSourceStore {
    limits: BufferLimits,
    sources: RwLock<HashMap<String, SharedBuffer>>,
}

impl MultiSourceStore {
    pub fn new(limits: BufferLimits) -> Self {
        Self {
            limits,
            sources: RwLock::new(HashMap::new()),
        }
    }

    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    /// Store a sample, creating the source's buffer on first sight.
    pub fn insert(&self, sample: Sample) {
        let buffer = self.buffer_for(sample.source());
        buffer.write().insert(sample);
    }

    // Fast path under the shared lock; creation re-checks under the exclusive
    // lock so two first-inserts for one source end up in the same buffer.
    fn buffer_for(&self, source: &str) -> SharedBuffer {
        if let Some(buf) = self.sources.read().get(source) {
            return Arc::clone(buf);
        }
        let mut sources = self.sources.write();
        let buf = sources.entry(source.to_owned()).or_insert_with(|| {
            Arc::new(RwLock::new(SourceBuffer::new(source, self.limits)))
        });
        Arc::clone(buf)
    }

    fn buffer(&self, source: &str) -> Option<SharedBuffer> {
        self.sources.read().get(source).cloned()
    }

    fn buffers(&self) -> Vec<SharedBuffer> {
        self.sources.read().values().cloned().collect()
    }

    /// Known source ids, sorted.
    pub fn sources(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn source_count(&self) -> usize {
        self.sources.read().len()
    }

    /// Number of samples currently retained for `source` (0 if unknown).
    pub fn sample_count(&self, source: &str) -> usize {
        self.buffer(source).map(|b| b.read().len()).unwrap_or(0)
    }

    /// Every source's qualifying sample at `at`. Sources with nothing recent
    /// enough are left out.
    pub fn point_snapshot(&self, at: i64) -> Snapshot {
        self.buffers()
            .into_iter()
            .filter_map(|buf| {
                let guard = buf.read();
                guard
                    .lookup(at)
                    .map(|s| (guard.source().to_owned(), s.clone()))
            })
            .collect()
    }

    /// One source's qualifying sample at `at`. Unknown and stale sources are
    /// indistinguishable here.
    pub fn single_source_point(&self, source: &str, at: i64) -> Option<Sample> {
        let buf = self.buffer(source)?;
        let guard = buf.read();
        guard.lookup(at).cloned()
    }

    /// Chart points of `metric` from every sample of `source` within
    /// `[at - window, at]`, flattened and in chronological order.
    pub fn series_window(&self, source: &str, at: i64, window: i64, metric: &str) -> Vec<(i64, f64)> {
        let Some(buf) = self.buffer(source) else {
            return Vec::new();
        };
        let guard = buf.read();
        let mut points: Vec<(i64, f64)> = guard
            .range_within(at, window)
            .filter_map(|s| s.chart(metric))
            .flat_map(|series| series.iter().map(|(ts, v)| (*ts, *v)))
            .collect();
        drop(guard);
        points.sort_by_key(|(ts, _)| *ts);
        points
    }
}
