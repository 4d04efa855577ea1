use std::time::Duration;

use thiserror::Error;

use crate::capture::CaptureError;
use crate::dispatch::HandlerError;
use crate::uhid::{FrameError, GatewayError};

#[derive(Debug, Error)]
pub enum Error {
    #[error("protocol error: {0}")]
    Protocol(#[from] FrameError),

    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("handshake did not complete within {0:?}")]
    HandshakeTimeout(Duration),

    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
