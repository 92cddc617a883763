//! The measurement cycle.
//!
//! One task per running node loops over the cycles: compute the phase aligned start, arm one timer per target,
//! wait for the end of the interval (or a stop), collect the record, hand the upload to its own task and rearm.
//!
use std::{sync::{atomic::Ordering, Arc}, time::Duration};
use anyhow::{bail, Result};
use log::*;
use tokio::{sync::watch, time::Instant};
use crate::node::{Assignment, Node, Scheduler};
use crate::probe::{cancelled, Probe};
use crate::utility::time2str;
use crate::wire::Record;

/// Delay in milliseconds from `now` until probing starts: `delta` past the next interval boundary.
///
/// `last_start` is the (server) time at which the previous cycle started probing. When advancing from there
/// would take more than one interval, the reset fired late and probing starts right away instead
/// (the delay is then negative), which keeps the cadence locked.
pub fn initial_delay(
    now: i64,
    interval: i64,
    delta: i64,
    last_start: Option<i64>,
) -> i64
{
    let mut delay = interval - now.rem_euclid(interval) + delta;
    while delay >= interval {
        delay -= interval;
    }
    if let Some(last_start) = last_start {
        if now + delay - last_start > interval {
            delay -= interval;
        }
    }
    delay
}

fn after(base: Instant, millis: i64) -> Instant {
    base + Duration::from_millis(millis.max(0) as u64)
}

/// The probes of one interval and the signal that ends it.
struct Cycle {
    probes: Vec<Arc<Probe>>,
    cancel: watch::Sender<bool>,
}

impl Cycle {
    /// Arm one timer per target, spread evenly over the interval starting at `delay`.
    fn arm(
        node: &Arc<Node>,
        assignment: &Assignment,
        armed: Instant,
        delay: i64,
    ) -> Cycle
    {
        let (cancel, cancel_rx) = watch::channel(false);
        let targets = &assignment.info.targets;
        let interval = assignment.info.interval.max(1) as i64 * 1000;
        let slice = interval / targets.len().max(1) as i64;

        let mut probes = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            let probe = Arc::new(Probe::new(
                target,
                &assignment.info.request_paths,
                assignment.clock_offset,
                Duration::from_millis(slice as u64),
            ));
            probes.push(probe.clone());

            let fire_at = after(armed, delay + slice * index as i64);
            let client = node.client.clone();
            let tracer = node.tracer.clone();
            let cancel_rx = cancel_rx.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep_until(fire_at) => probe.run(&client, tracer.as_ref(), cancel_rx).await,
                    _ = cancelled(cancel_rx.clone()) => debug!("probe for {} cancelled before it fired", probe.target),
                }
            });
        }
        Cycle { probes, cancel }
    }
    /// Cancel the timers that did not fire yet and any running path trace, and collect what was measured.
    async fn finish(self) -> Record {
        self.cancel.send_replace(true);
        let mut record = Record::new();
        for probe in &self.probes {
            record.insert(probe.target.clone(), probe.collect().await);
        }
        record
    }
}

async fn run_cycles(
    node: Arc<Node>,
    stop: watch::Receiver<bool>,
)
{
    let mut last_start: Option<i64> = None;
    loop {
        // the last exchange may have changed targets, interval or slot.
        let Some(assignment) = node.assignment().await else {
            warn!("node lost its registration, measurement cycles stop");
            break;
        };
        let interval = assignment.info.interval.max(1) as i64 * 1000;
        let delta = (assignment.info.delta * 1000.0).round() as i64;
        let now = (assignment.server_now() * 1000.0) as i64;
        let armed = Instant::now();

        let delay = initial_delay(now, interval, delta, last_start);
        match last_start {
            None => info!("probes will start in {}", time2str(delay as f64 / 1000.0)),
            Some(_) => debug!("setting up probes, starting in {}ms", delay),
        }
        last_start = Some(now + delay);

        let cycle = Cycle::arm(&node, &assignment, armed, delay);
        // the reset timer, or a stop cutting the cycle short.
        let stopped = tokio::select! {
            _ = tokio::time::sleep_until(after(armed, delay + interval)) => false,
            _ = cancelled(stop.clone()) => true,
        };

        let record = cycle.finish().await;
        node.push_record(record).await;
        if stopped {
            break;
        }
        // upload in the background; the next cycle is armed right away.
        let exchanging = node.clone();
        tokio::spawn(async move {
            exchanging.exchange().await;
        });
    }
    node.running.store(false, Ordering::SeqCst);
    info!("measurement cycles stopped");
}

impl Node {
    /// Start the measurement cycles. The node must be registered and not running already.
    pub async fn start(self: &Arc<Self>) -> Result<Scheduler> {
        if self.id().await.is_none() {
            bail!("node must be registered to the server before collecting data");
        }
        if self.running.swap(true, Ordering::SeqCst) {
            bail!("node already running");
        }
        let (stop, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_cycles(self.clone(), stop_rx));
        Ok(Scheduler { stop, task })
    }
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Scheduler {
    /// Stop arming cycles. The running cycle is cut short and its partial record is queued.
    /// Probes already in flight finish on their own.
    pub async fn stop(self) {
        self.stop.send_replace(true);
        if let Err(e) = self.task.await {
            error!("measurement cycle task failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utility::testing::{mock_http_target, FixedTracer};
    use crate::wire::NodeInfo;

    #[test]
    fn unit_delay_aligns_on_delta_past_boundary() {
        // interval 60s, delta 30s, 40s into the interval: start in 50s, at 30s past the next boundary.
        assert_eq!(initial_delay(1_000_000, 60_000, 30_000, None), 50_000);
        // on a boundary the delta itself is the delay.
        assert_eq!(initial_delay(1_020_000, 60_000, 30_000, None), 30_000);
        assert_eq!(initial_delay(960_000, 60_000, 0, None), 0);
        assert_eq!(initial_delay(959_999, 60_000, 0, None), 1);
    }

    #[test]
    fn unit_delay_is_below_interval() {
        for now in (0..200_000).step_by(777) {
            for delta in [0, 1, 29_999, 59_999] {
                let delay = initial_delay(now, 60_000, delta, None);
                assert!((0..60_000).contains(&delay));
                assert_eq!((now + delay).rem_euclid(60_000), delta);
            }
        }
    }

    #[test]
    fn unit_rearm_keeps_cadence() {
        // first cycle armed at 1000s, probing starts at 1050s, reset due at 1110s.
        let first = initial_delay(1_000_000, 60_000, 30_000, None);
        let last_start = 1_000_000 + first;
        assert_eq!(last_start, 1_050_000);
        // reset on time: start right away.
        assert_eq!(initial_delay(1_110_000, 60_000, 30_000, Some(last_start)), 0);
        // reset 10ms early: start in 10ms.
        assert_eq!(initial_delay(1_109_990, 60_000, 30_000, Some(last_start)), 10);
        // reset 10ms late: start right away, not an interval later.
        assert_eq!(initial_delay(1_110_010, 60_000, 30_000, Some(last_start)), -10);
    }

    async fn registered_node(targets: Vec<String>, interval: u64) -> Arc<Node> {
        // nothing listens on the server address: exchanges fail and records stay pending.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = listener.local_addr().unwrap().to_string();
        drop(listener);
        let node = Arc::new(Node::new(&server, Some("test-node".to_string()), Arc::new(FixedTracer)).unwrap());
        let info = NodeInfo {
            id: "scheduler-test".to_string(),
            slot: 0,
            delta: 0.0,
            interval,
            now: crate::utility::epoch_seconds(chrono::Local::now()),
            targets,
            request_paths: vec!["/ok".to_string(), "/missing".to_string()],
        };
        *node.assignment.lock().await = Some(Assignment::from_reply(info));
        node
    }

    #[tokio::test]
    async fn unit_start_requires_registration() {
        let node = Arc::new(Node::new("127.0.0.1:1", None, Arc::new(FixedTracer)).unwrap());
        assert!(node.start().await.is_err());
        assert!(!node.is_running());
    }

    #[tokio::test]
    async fn unit_start_twice_is_refused() {
        let node = registered_node(vec![], 60).await;
        let scheduler = node.start().await.unwrap();
        assert!(node.is_running());
        assert!(node.start().await.is_err());
        scheduler.stop().await;
        assert!(!node.is_running());
    }

    #[tokio::test]
    async fn unit_stop_queues_partial_record() {
        let node = registered_node(vec!["a.invalid".to_string(), "b.invalid".to_string()], 3600).await;
        let scheduler = node.start().await.unwrap();
        scheduler.stop().await;

        let records = node.pending_records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].len(), 2);
        assert!(records[0]["a.invalid"].times.is_empty());
        assert!(!node.is_running());
    }

    #[tokio::test]
    async fn unit_cycles_measure_and_queue_records() {
        let target = mock_http_target().await;
        let node = registered_node(vec![target.clone()], 1).await;
        let scheduler = node.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(2500)).await;
        scheduler.stop().await;

        let records = node.pending_records().await;
        // at least one complete cycle plus the partial one at stop.
        assert!(records.len() >= 2);
        let complete = &records[0][&target];
        assert!(complete.times.contains_key("/ok"));
        assert!(!complete.times.contains_key("/missing"));
        assert_eq!(complete.trace.1, "trace to 127.0.0.1");
    }
}
