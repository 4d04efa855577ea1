//! Virtual HID devices over the Linux uhid gateway, driven by captured
//! input reports.

pub mod capture;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod event_loop;
pub mod replay;
pub mod signal;
pub mod uhid;

pub use error::{Error, Result};
