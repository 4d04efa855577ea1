//! Read side of one synthetic device, interleaved with replay.
//!
//! One thread drives both: the loop polls the gateway with a timeout and,
//! whenever no kernel frame is waiting, lets the scheduler inject the next
//! due report. Replies are therefore always written before any INPUT that
//! follows them.

use std::fmt;
use std::time::{Duration, Instant};

use crate::dispatch::Handlers;
use crate::error::{Error, Result};
use crate::replay::ReplayScheduler;
use crate::uhid::{DeviceHandle, Frame, FrameError, Gateway, UhidFile};

/// Upper bound on a single poll, so cancellation is noticed quickly.
const CANCEL_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Device created, waiting for START.
    Initializing,
    /// START seen, answering the driver's setup requests.
    Handshaking,
    /// Handshake done, reports are being injected.
    Replaying,
    Terminating,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopState::Initializing => write!(f, "initializing"),
            LoopState::Handshaking => write!(f, "handshaking"),
            LoopState::Replaying => write!(f, "replaying"),
            LoopState::Terminating => write!(f, "terminating"),
        }
    }
}

/// Why the loop returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The kernel sent STOP.
    Stopped,
    /// Every report was injected and the gateway went quiet.
    ReplayComplete,
    /// The cancel signal was raised.
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
pub struct LoopOptions {
    /// Limit on the handshake, counted from START.
    pub handshake_timeout: Duration,
    /// Quiet time required after the last injection before terminating.
    pub linger: Duration,
    /// Treat unknown event tags as fatal protocol errors.
    pub strict: bool,
}

impl Default for LoopOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(10),
            linger: Duration::from_secs(1),
            strict: false,
        }
    }
}

pub struct EventLoop<G: Gateway = UhidFile> {
    handle: DeviceHandle<G>,
    handlers: Handlers,
    scheduler: ReplayScheduler,
    options: LoopOptions,
    state: LoopState,
}

impl<G: Gateway> EventLoop<G> {
    /// `handle` must already be created.
    pub fn new(
        handle: DeviceHandle<G>,
        handlers: Handlers,
        scheduler: ReplayScheduler,
        options: LoopOptions,
    ) -> Self {
        Self {
            handle,
            handlers,
            scheduler,
            options,
            state: LoopState::Initializing,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until STOP, replay completion, cancellation or a fatal error.
    /// The device is destroyed before returning in every case.
    pub fn run(mut self) -> Result<LoopOutcome> {
        log::info!("Event loop {}", self.state);
        let result = self.drive();

        self.transition(LoopState::Terminating);
        let destroyed = self.handle.destroy();

        match result {
            Ok(outcome) => {
                destroyed?;
                log::info!("Event loop finished: {:?}", outcome);
                Ok(outcome)
            }
            Err(e) => {
                if let Err(d) = destroyed {
                    log::warn!("Failed to destroy device: {}", d);
                }
                log::error!("Event loop failed: {}", e);
                Err(e)
            }
        }
    }

    fn transition(&mut self, to: LoopState) {
        if self.state != to {
            log::info!("Event loop {} -> {}", self.state, to);
            self.state = to;
        }
    }

    fn drive(&mut self) -> Result<LoopOutcome> {
        let signals = self.handle.signals().clone();
        let mut handshake_from = Instant::now();
        let mut quiet_since: Option<Instant> = None;

        loop {
            if signals.cancel.is_set() {
                log::info!("Cancelled");
                return Ok(LoopOutcome::Cancelled);
            }

            let now = Instant::now();

            if self.state != LoopState::Replaying && signals.handshake_done.is_set() {
                self.transition(LoopState::Replaying);
                self.scheduler.start(&self.handle, now);
            }

            if self.state != LoopState::Replaying
                && now.duration_since(handshake_from) >= self.options.handshake_timeout
            {
                return Err(Error::HandshakeTimeout(self.options.handshake_timeout));
            }

            if signals.replay_done.is_set() {
                let since = *quiet_since.get_or_insert(now);
                if now.duration_since(since) >= self.options.linger {
                    return Ok(LoopOutcome::ReplayComplete);
                }
            }

            let wait = self.next_wait(now, handshake_from, quiet_since);
            if self.handle.wait_readable(wait)? {
                quiet_since = None;

                let frame = match self.handle.read_frame() {
                    Ok(frame) => frame,
                    Err(Error::Protocol(FrameError::UnknownTag(tag))) if !self.options.strict => {
                        log::warn!("Ignoring frame with unknown tag {}", tag);
                        continue;
                    }
                    Err(e) => return Err(e),
                };

                if matches!(frame, Frame::Start { .. }) && self.state == LoopState::Initializing {
                    handshake_from = Instant::now();
                    self.transition(LoopState::Handshaking);
                }

                self.handlers.dispatch(&mut self.handle, &frame)?;

                if frame == Frame::Stop {
                    log::info!("Kernel stopped the device");
                    return Ok(LoopOutcome::Stopped);
                }
                continue;
            }

            if self.scheduler.until_next(Instant::now()) == Some(Duration::ZERO) {
                self.scheduler.inject_next(&mut self.handle)?;
            }
        }
    }

    /// Longest poll that does not overshoot a deadline.
    fn next_wait(
        &self,
        now: Instant,
        handshake_from: Instant,
        quiet_since: Option<Instant>,
    ) -> Duration {
        let mut wait = CANCEL_POLL;

        if self.state != LoopState::Replaying {
            let elapsed = now.duration_since(handshake_from);
            wait = wait.min(self.options.handshake_timeout.saturating_sub(elapsed));
        }
        if let Some(due) = self.scheduler.until_next(now) {
            wait = wait.min(due);
        }
        if let Some(since) = quiet_since {
            wait = wait.min(self.options.linger.saturating_sub(now.duration_since(since)));
        }
        wait
    }
}
