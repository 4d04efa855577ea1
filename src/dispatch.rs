//! Handler registry and dispatch of kernel frames.
//!
//! Handlers never write to the gateway themselves: they return a reply (or
//! reports to inject) and the dispatcher writes it before the next frame is
//! read, which keeps every GET_REPORT answered within the same iteration.

use std::collections::HashMap;

use thiserror::Error;

use crate::error::Result;
use crate::signal::Signals;
use crate::uhid::{
    DeviceHandle, DeviceIdentity, EventType, Frame, Gateway, GatewayError, GetReportRequest,
    OutputReport, SetReportRequest,
};

/// `EIO`, reported to the kernel when a GET_REPORT handler fails.
const REPLY_EIO: u16 = 5;

/// Error raised by a handler. Only fatal errors stop the event loop.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    fatal: bool,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), fatal: false }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self { message: message.into(), fatal: true }
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }
}

pub type HandlerResult<T> = std::result::Result<T, HandlerError>;

/// What a handler can see of the device.
pub struct HandlerContext<'a> {
    identity: &'a DeviceIdentity,
    signals: &'a Signals,
}

impl<'a> HandlerContext<'a> {
    pub fn new(identity: &'a DeviceIdentity, signals: &'a Signals) -> Self {
        Self { identity, signals }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        self.identity
    }

    pub fn uniq(&self) -> &str {
        &self.identity.uniq
    }

    /// Mark the kernel's initialization dialog as finished.
    pub fn set_handshake_done(&self) {
        if !self.signals.handshake_done.is_set() {
            log::info!("Handshake complete");
        }
        self.signals.handshake_done.set();
    }

    pub fn handshake_done(&self) -> bool {
        self.signals.handshake_done.is_set()
    }
}

/// Payload of a GET_REPORT_REPLY.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportReply {
    pub err: u16,
    pub data: Vec<u8>,
}

impl ReportReply {
    pub fn data(data: impl Into<Vec<u8>>) -> Self {
        Self { err: 0, data: data.into() }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn error(err: u16) -> Self {
        Self { err, data: Vec::new() }
    }
}

type GetReportFn =
    Box<dyn FnMut(&HandlerContext<'_>, &GetReportRequest) -> HandlerResult<ReportReply>>;
type SetReportFn = Box<dyn FnMut(&HandlerContext<'_>, &SetReportRequest) -> HandlerResult<u16>>;
type OutputFn =
    Box<dyn FnMut(&HandlerContext<'_>, &OutputReport) -> HandlerResult<Vec<Vec<u8>>>>;
type NotifyFn = Box<dyn FnMut(&HandlerContext<'_>) -> HandlerResult<()>>;

/// One registered handler; the variant fixes which tag it can serve.
pub enum Handler {
    /// Returns the reply data and error code for a GET_REPORT.
    GetReport(GetReportFn),
    /// Returns the error code for a SET_REPORT.
    SetReport(SetReportFn),
    /// Returns input reports to inject in response to an OUTPUT.
    Output(OutputFn),
    /// START, STOP, OPEN or CLOSE.
    Notify(NotifyFn),
}

/// Tag → handler map, fixed before the event loop starts.
#[derive(Default)]
pub struct Handlers {
    map: HashMap<EventType, Handler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_get_report<F>(mut self, f: F) -> Self
    where
        F: FnMut(&HandlerContext<'_>, &GetReportRequest) -> HandlerResult<ReportReply> + 'static,
    {
        self.map.insert(EventType::GetReport, Handler::GetReport(Box::new(f)));
        self
    }

    pub fn on_set_report<F>(mut self, f: F) -> Self
    where
        F: FnMut(&HandlerContext<'_>, &SetReportRequest) -> HandlerResult<u16> + 'static,
    {
        self.map.insert(EventType::SetReport, Handler::SetReport(Box::new(f)));
        self
    }

    pub fn on_output<F>(mut self, f: F) -> Self
    where
        F: FnMut(&HandlerContext<'_>, &OutputReport) -> HandlerResult<Vec<Vec<u8>>> + 'static,
    {
        self.map.insert(EventType::Output, Handler::Output(Box::new(f)));
        self
    }

    /// Register a notification for START, STOP, OPEN or CLOSE. Other tags
    /// carry payloads and are ignored here.
    pub fn on<F>(mut self, event: EventType, f: F) -> Self
    where
        F: FnMut(&HandlerContext<'_>) -> HandlerResult<()> + 'static,
    {
        match event {
            EventType::Start | EventType::Stop | EventType::Open | EventType::Close => {
                self.map.insert(event, Handler::Notify(Box::new(f)));
            }
            other => {
                debug_assert!(false, "{} carries a payload, use its on_* method", other);
                log::warn!("Cannot register a notification for {}", other);
            }
        }
        self
    }

    pub fn contains(&self, event: EventType) -> bool {
        self.map.contains_key(&event)
    }

    /// Route one kernel frame. Replies and injections are written before
    /// returning. Non-fatal handler errors are logged and swallowed.
    pub fn dispatch<G: Gateway>(
        &mut self,
        handle: &mut DeviceHandle<G>,
        frame: &Frame,
    ) -> Result<()> {
        let event = frame.event_type();
        log::debug!("Dispatching {}", event);

        match frame {
            Frame::GetReport(req) => {
                let outcome = match self.map.get_mut(&event) {
                    Some(Handler::GetReport(f)) => {
                        let identity = handle.identity().ok_or(GatewayError::NotCreated)?;
                        f(&HandlerContext::new(identity, handle.signals()), req)
                    }
                    _ => Ok(ReportReply::empty()),
                };
                let (reply, failure) = match outcome {
                    Ok(reply) => (reply, None),
                    Err(e) => (ReportReply::error(REPLY_EIO), Some(e)),
                };
                log::debug!(
                    "GET_REPORT id={} rnum={:#04x} -> err={} {} bytes",
                    req.id,
                    req.rnum,
                    reply.err,
                    reply.data.len()
                );
                handle.write_frame(&Frame::GetReportReply {
                    id: req.id,
                    err: reply.err,
                    data: reply.data,
                })?;
                failure.map_or(Ok(()), report)
            }
            Frame::SetReport(req) => {
                let outcome = match self.map.get_mut(&event) {
                    Some(Handler::SetReport(f)) => {
                        let identity = handle.identity().ok_or(GatewayError::NotCreated)?;
                        f(&HandlerContext::new(identity, handle.signals()), req)
                    }
                    _ => Ok(0),
                };
                let (err, failure) = match outcome {
                    Ok(err) => (err, None),
                    Err(e) => (REPLY_EIO, Some(e)),
                };
                handle.write_frame(&Frame::SetReportReply { id: req.id, err })?;
                failure.map_or(Ok(()), report)
            }
            Frame::Output(out) => {
                let outcome = match self.map.get_mut(&event) {
                    Some(Handler::Output(f)) => {
                        let identity = handle.identity().ok_or(GatewayError::NotCreated)?;
                        f(&HandlerContext::new(identity, handle.signals()), out)
                    }
                    _ => Ok(Vec::new()),
                };
                match outcome {
                    Ok(reports) => {
                        for r in &reports {
                            handle.inject(r)?;
                        }
                        if !reports.is_empty() {
                            log::debug!("OUTPUT -> {} injected report(s)", reports.len());
                        }
                        Ok(())
                    }
                    Err(e) => report(e),
                }
            }
            Frame::Start { .. } | Frame::Stop | Frame::Open | Frame::Close => {
                let outcome = match self.map.get_mut(&event) {
                    Some(Handler::Notify(f)) => {
                        let identity = handle.identity().ok_or(GatewayError::NotCreated)?;
                        f(&HandlerContext::new(identity, handle.signals()))
                    }
                    _ => Ok(()),
                };
                outcome.or_else(report)
            }
            other => {
                log::warn!("Ignoring unexpected {} from kernel", other.event_type());
                Ok(())
            }
        }
    }
}

/// Log a handler failure; escalate only fatal ones.
fn report(e: HandlerError) -> Result<()> {
    if e.is_fatal() {
        log::error!("Fatal handler error: {}", e);
        return Err(e.into());
    }
    log::warn!("Handler error: {}", e);
    Ok(())
}
