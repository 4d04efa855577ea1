//! Inject captured input reports once the handshake is done.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use serde::Deserialize;

use crate::capture::Report;
use crate::error::Result;
use crate::uhid::{DeviceHandle, Gateway};

/// How injections are spaced in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pacing {
    /// As fast as the gateway accepts writes.
    #[default]
    Immediate,
    /// Each report is due at its capture timestamp, relative to replay start.
    Recorded,
}

impl fmt::Display for Pacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pacing::Immediate => write!(f, "immediate"),
            Pacing::Recorded => write!(f, "recorded"),
        }
    }
}

impl FromStr for Pacing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "immediate" | "fast" => Ok(Pacing::Immediate),
            "recorded" | "realtime" | "real-time" => Ok(Pacing::Recorded),
            _ => Err(format!(
                "Invalid pacing '{}'. Valid values: immediate, recorded",
                s
            )),
        }
    }
}

/// Fold runs of byte-identical payloads into their first report.
pub fn dedup_consecutive(reports: &[Report]) -> Vec<Report> {
    let mut out: Vec<Report> = Vec::with_capacity(reports.len());
    for report in reports {
        if out.last().is_some_and(|prev| prev.payload == report.payload) {
            continue;
        }
        out.push(report.clone());
    }
    out
}

pub struct ReplayScheduler {
    reports: Vec<Report>,
    next: usize,
    pacing: Pacing,
    started: Option<Instant>,
}

impl ReplayScheduler {
    pub fn new(reports: &[Report], pacing: Pacing) -> Self {
        let reports = dedup_consecutive(reports);
        Self { reports, next: 0, pacing, started: None }
    }

    /// Reports that will be injected after deduplication.
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn injected(&self) -> usize {
        self.next
    }

    pub fn is_started(&self) -> bool {
        self.started.is_some()
    }

    pub fn is_finished(&self) -> bool {
        self.next >= self.reports.len()
    }

    /// Begin replay. An empty capture completes immediately.
    pub fn start<G: Gateway>(&mut self, handle: &DeviceHandle<G>, now: Instant) {
        if self.started.is_some() {
            return;
        }
        self.started = Some(now);
        log::info!("Replay started: {} reports, {} pacing", self.reports.len(), self.pacing);
        if self.is_finished() {
            self.finish(handle);
        }
    }

    /// Time until the next report is due; `None` when nothing is left or
    /// replay has not started.
    pub fn until_next(&self, now: Instant) -> Option<Duration> {
        let started = self.started?;
        let report = self.reports.get(self.next)?;
        match self.pacing {
            Pacing::Immediate => Some(Duration::ZERO),
            Pacing::Recorded => {
                let due = started + Duration::from_micros(report.timestamp_us);
                Some(due.saturating_duration_since(now))
            }
        }
    }

    /// Write the next report. A write failure is fatal for the handle.
    pub fn inject_next<G: Gateway>(&mut self, handle: &mut DeviceHandle<G>) -> Result<()> {
        let Some(report) = self.reports.get(self.next) else {
            return Ok(());
        };
        handle.inject(&report.payload)?;
        self.next += 1;

        if self.next == 1 {
            log::info!("Input reports flowing");
        }
        if self.next % 500 == 0 {
            log::debug!("Reports injected: {}/{}", self.next, self.reports.len());
        }
        if self.is_finished() {
            self.finish(handle);
        }
        Ok(())
    }

    fn finish<G: Gateway>(&self, handle: &DeviceHandle<G>) {
        log::info!("Replay complete: {} reports injected", self.next);
        handle.signals().replay_done.set();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture;
    use crate::uhid::mock::MockGateway;
    use crate::uhid::{DeviceIdentity, Frame};

    fn report(ts: u64, payload: &[u8]) -> Report {
        Report { timestamp_us: ts, payload: payload.to_vec() }
    }

    #[test]
    fn test_dedup_folds_runs_only() {
        let reports = [
            report(0, b"A"),
            report(1, b"A"),
            report(2, b"B"),
            report(3, b"A"),
            report(4, b"A"),
            report(5, b"A"),
            report(6, b"C"),
        ];
        let out = dedup_consecutive(&reports);
        let payloads: Vec<&[u8]> = out.iter().map(|r| r.payload.as_slice()).collect();
        assert_eq!(payloads, vec![b"A" as &[u8], b"B", b"A", b"C"]);
        assert_eq!(out[2].timestamp_us, 3);
    }

    #[test]
    fn test_recorded_pacing_due_times() {
        let mut sched =
            ReplayScheduler::new(&[report(0, b"A"), report(20_000, b"B")], Pacing::Recorded);
        let handle = DeviceHandle::new(MockGateway::new());
        let t0 = Instant::now();

        assert_eq!(sched.until_next(t0), None);
        sched.start(&handle, t0);
        assert_eq!(sched.until_next(t0), Some(Duration::ZERO));

        sched.next = 1;
        assert_eq!(sched.until_next(t0), Some(Duration::from_millis(20)));
        assert_eq!(sched.until_next(t0 + Duration::from_millis(30)), Some(Duration::ZERO));
    }

    #[test]
    fn test_inject_in_order_then_done() {
        let mock = MockGateway::new();
        let capture = capture::parse("R 1 5\n").unwrap();
        let mut handle = DeviceHandle::new(mock.clone());
        handle.create(&capture, DeviceIdentity::from_capture(&capture, "")).unwrap();

        let reports = [report(0, b"A"), report(1, b"A"), report(2, b"B")];
        let mut sched = ReplayScheduler::new(&reports, Pacing::Immediate);
        sched.start(&handle, Instant::now());
        while !sched.is_finished() {
            assert!(!handle.signals().replay_done.is_set());
            sched.inject_next(&mut handle).unwrap();
        }

        assert!(handle.signals().replay_done.is_set());
        let inputs: Vec<Frame> = mock.written_frames().into_iter().skip(1).collect();
        assert_eq!(inputs, vec![Frame::Input(b"A".to_vec()), Frame::Input(b"B".to_vec())]);
    }

    #[test]
    fn test_empty_capture_completes_on_start() {
        let handle = DeviceHandle::new(MockGateway::new());
        let mut sched = ReplayScheduler::new(&[], Pacing::Immediate);
        sched.start(&handle, Instant::now());
        assert!(handle.signals().replay_done.is_set());
    }

    #[test]
    fn test_pacing_from_str() {
        assert_eq!("immediate".parse::<Pacing>().unwrap(), Pacing::Immediate);
        assert_eq!("Recorded".parse::<Pacing>().unwrap(), Pacing::Recorded);
        assert!("slow".parse::<Pacing>().is_err());
    }
}
