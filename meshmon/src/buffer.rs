//! Bounded, time-ordered sample history for a single source.

use crate::sample::Sample;

/// Per-source retention and query defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    /// Max samples kept per source.
    pub capacity: usize,
    /// Max age (ms) of a sample returned by a point lookup.
    pub tolerance: i64,
    /// Width (ms) of range queries used for chart series.
    pub window: i64,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            capacity: 600,
            tolerance: 1000,
            window: 10_000,
        }
    }
}

/// Samples of one source, newest first, never more than `capacity` of them.
#[derive(Debug)]
pub struct SourceBuffer {
    source: String,
    samples: Vec<Sample>,
    limits: BufferLimits,
}

impl SourceBuffer {
    pub fn new(source: impl Into<String>, limits: BufferLimits) -> Self {
        Self {
            source: source.into(),
            samples: Vec::with_capacity(limits.capacity.min(1024)),
            limits,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Stored samples, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Store a sample. When full, the oldest stored sample is evicted first,
    /// then the new one is placed by timestamp regardless of arrival order.
    pub fn insert(&mut self, sample: Sample) {
        if self.limits.capacity == 0 {
            return;
        }
        if self.samples.len() >= self.limits.capacity {
            self.samples.pop();
        }
        // equal timestamps keep arrival order
        let at = self
            .samples
            .partition_point(|s| s.timestamp() >= sample.timestamp());
        self.samples.insert(at, sample);
    }

    /// Nearest sample at or before `at` using the default tolerance.
    pub fn lookup(&self, at: i64) -> Option<&Sample> {
        self.lookup_within(at, self.limits.tolerance)
    }

    /// Nearest sample at or before `at`, provided it is at most `tolerance` ms
    /// old. Samples newer than `at` are never returned.
    pub fn lookup_within(&self, at: i64, tolerance: i64) -> Option<&Sample> {
        // newest-first order: the first candidate is the nearest one, and every
        // later candidate is staler still
        self.samples
            .iter()
            .find(|s| s.timestamp() <= at)
            .filter(|s| at.saturating_sub(s.timestamp()) <= tolerance)
    }

    /// Samples in `[at - window, at]` using the default window, newest first.
    pub fn range(&self, at: i64) -> impl Iterator<Item = &Sample> {
        self.range_within(at, self.limits.window)
    }

    /// Samples in `[at - window, at]`, newest first.
    pub fn range_within(&self, at: i64, window: i64) -> impl Iterator<Item = &Sample> {
        let from = at.saturating_sub(window);
        self.samples
            .iter()
            .filter(move |s| s.timestamp() <= at && s.timestamp() >= from)
    }
}
