//! Background samplers: each one measures a rate over one period and records
//! a point into the node's chart series.

use std::sync::Arc;
use std::time::Instant;
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tracing::warn;

use crate::history::Chart;
use crate::node::MonitorNode;

/// Default measurement period for all samplers.
pub const SAMPLE_PERIOD: Duration = Duration::from_millis(200);

fn per_ms(delta: u64, elapsed: Duration) -> f64 {
    let ms = elapsed.as_secs_f64() * 1000.0;
    if ms <= 0.0 {
        0.0
    } else {
        delta as f64 / ms
    }
}

// 200ms: bytes per ms, total/send/recv
pub fn spawn_io_sampler(node: Arc<MonitorNode>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let start = Instant::now();
            let (sent0, recv0) = node.io_totals();
            sleep(period).await;
            let (sent1, recv1) = node.io_totals();
            let elapsed = start.elapsed();

            let send = per_ms(sent1.saturating_sub(sent0), elapsed);
            let recv = per_ms(recv1.saturating_sub(recv0), elapsed);
            let ts = node.monitor_time();
            node.record_chart(Chart::IoTotal, ts, send + recv);
            node.record_chart(Chart::IoSend, ts, send);
            node.record_chart(Chart::IoRecv, ts, recv);
        }
    })
}

// 200ms: process ticks per ms
pub fn spawn_process_sampler(node: Arc<MonitorNode>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let start = Instant::now();
            let ticks0 = node.process_ticks();
            sleep(period).await;
            let ticks = node.process_ticks().saturating_sub(ticks0);
            node.record_chart(Chart::Speed, node.monitor_time(), per_ms(ticks, start.elapsed()));
        }
    })
}

// 200ms: this process's CPU share and whole-system CPU usage, 0..100
pub fn spawn_cpu_sampler(node: Arc<MonitorNode>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let pid = match sysinfo::get_current_pid() {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("cpu sampler cannot resolve own pid: {e}");
                None
            }
        };
        let mut sys = System::new();
        let refresh = |sys: &mut System| {
            sys.refresh_cpu_usage();
            if let Some(pid) = pid {
                sys.refresh_processes_specifics(
                    ProcessesToUpdate::Some(&[pid]),
                    true,
                    ProcessRefreshKind::nothing().with_cpu(),
                );
            }
        };
        // first refresh only primes the counters
        refresh(&mut sys);
        loop {
            sleep(period.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL)).await;
            refresh(&mut sys);

            let n_cpus = sys.cpus().len().max(1) as f32;
            let total = sys.global_cpu_usage();
            // normalize so a process saturating every core reads 100
            let own = pid
                .and_then(|p| sys.process(p))
                .map(|p| (p.cpu_usage() / n_cpus).min(100.0))
                .unwrap_or(0.0);

            let ts = node.monitor_time();
            if own.is_finite() {
                node.record_chart(Chart::CpuUsage, ts, f64::from(own));
            }
            if total.is_finite() {
                node.record_chart(Chart::CpuTotalUsage, ts, f64::from(total));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_is_bytes_per_millisecond() {
        assert_eq!(per_ms(400, Duration::from_millis(200)), 2.0);
        assert_eq!(per_ms(5, Duration::ZERO), 0.0);
    }

    #[tokio::test]
    async fn io_sampler_records_rates() {
        let node = Arc::new(MonitorNode::new("a"));
        node.set_neighbours(&["b"]);
        let handle = spawn_io_sampler(Arc::clone(&node), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(5)).await;
        node.add_send_io("b", 1_000).unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        handle.abort();

        let report = node.to_report();
        let send = report["ioSendChart"].as_object().unwrap();
        assert!(!send.is_empty());
        assert!(send.values().any(|v| v.as_f64().unwrap() > 0.0));
        assert_eq!(
            report["ioTotalChart"].as_object().unwrap().len(),
            report["ioRecvChart"].as_object().unwrap().len()
        );
    }
}
