//! Small utilities to manage the bounded chart series a node reports.

use std::collections::BTreeMap;

/// Points kept per series before it is reset.
pub const SERIES_CAP: usize = 10;

/// Chart series a node reports, by wire name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Chart {
    Speed,
    IoTotal,
    IoSend,
    IoRecv,
    CpuUsage,
    CpuTotalUsage,
}

impl Chart {
    pub const ALL: [Chart; 6] = [
        Chart::Speed,
        Chart::IoTotal,
        Chart::IoSend,
        Chart::IoRecv,
        Chart::CpuUsage,
        Chart::CpuTotalUsage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Chart::Speed => "speedChart",
            Chart::IoTotal => "ioTotalChart",
            Chart::IoSend => "ioSendChart",
            Chart::IoRecv => "ioRecvChart",
            Chart::CpuUsage => "cpuUsageChart",
            Chart::CpuTotalUsage => "cpuTotalUsageChart",
        }
    }
}

// A series that outgrew the cap between two reports is dropped wholesale,
// not trimmed.
pub fn push_capped(series: &mut BTreeMap<i64, f64>, ts: i64, v: f64, cap: usize) {
    if series.len() > cap {
        series.clear();
    }
    series.insert(ts, v);
}

#[derive(Debug, Default)]
pub struct ChartHistory {
    series: BTreeMap<Chart, BTreeMap<i64, f64>>,
}

impl ChartHistory {
    pub fn record(&mut self, chart: Chart, ts: i64, v: f64) {
        push_capped(self.series.entry(chart).or_default(), ts, v, SERIES_CAP);
    }

    pub fn len(&self, chart: Chart) -> usize {
        self.series.get(&chart).map_or(0, BTreeMap::len)
    }

    /// Take every series, leaving them empty. Charts with no points still
    /// appear so the monitor sees an empty series rather than none.
    pub fn drain(&mut self) -> Vec<(Chart, BTreeMap<i64, f64>)> {
        Chart::ALL
            .iter()
            .map(|c| (*c, self.series.remove(c).unwrap_or_default()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_resets_once_past_cap() {
        let mut h = ChartHistory::default();
        for ts in 0..=SERIES_CAP as i64 {
            h.record(Chart::Speed, ts, 1.0);
        }
        assert_eq!(h.len(Chart::Speed), SERIES_CAP + 1);
        h.record(Chart::Speed, 100, 2.0);
        assert_eq!(h.len(Chart::Speed), 1);
    }

    #[test]
    fn drain_returns_all_charts_and_empties() {
        let mut h = ChartHistory::default();
        h.record(Chart::CpuUsage, 5, 12.0);
        let drained = h.drain();
        assert_eq!(drained.len(), Chart::ALL.len());
        let cpu = drained.iter().find(|(c, _)| *c == Chart::CpuUsage).unwrap();
        assert_eq!(cpu.1.get(&5), Some(&12.0));
        assert_eq!(h.len(Chart::CpuUsage), 0);
    }
}
