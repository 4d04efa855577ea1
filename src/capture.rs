//! Parse a textual HID capture into a descriptor, device metadata and a
//! timed sequence of input reports.
//!
//! ```text
//! # name <string>
//! # phys <string>
//! # info <bus:hex> <vid:hex> <pid:hex>
//! # version <int>
//! # country <int>
//! R <count> <byte0> <byte1> …
//! E <sec>.<usec> <count> <byte0> <byte1> …
//! ```
//!
//! Bytes are decimal. Other lines are ignored.

use std::fmt;
use std::path::Path;

use thiserror::Error;

use crate::uhid::{BUS_USB, HID_MAX_DESCRIPTOR_SIZE, UHID_DATA_MAX};

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to read capture: {0}")]
    Read(#[from] std::io::Error),
    #[error("capture has no report descriptor")]
    MissingDescriptor,
    #[error("line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Microseconds since the first captured event.
    pub timestamp_us: u64,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub descriptor: Vec<u8>,
    pub name: String,
    pub phys: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus: u16,
    pub version: u16,
    pub country: u8,
    pub reports: Vec<Report>,
}

impl fmt::Display for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' {:04x}:{:04x} bus {:#04x}, {} descriptor bytes, {} reports",
            self.name,
            self.vendor_id,
            self.product_id,
            self.bus,
            self.descriptor.len(),
            self.reports.len()
        )
    }
}

/// Read and parse a capture file.
pub fn load(path: &Path) -> Result<Capture, CaptureError> {
    let content = std::fs::read_to_string(path)?;
    let capture = parse(&content)?;
    log::debug!("Loaded capture from {}: {}", path.display(), capture);
    Ok(capture)
}

/// Parse capture text.
pub fn parse(text: &str) -> Result<Capture, CaptureError> {
    let mut descriptor: Option<Vec<u8>> = None;
    let mut capture = Capture {
        descriptor: Vec::new(),
        name: String::new(),
        phys: String::new(),
        vendor_id: 0,
        product_id: 0,
        bus: BUS_USB,
        version: 0,
        country: 0,
        reports: Vec::new(),
    };
    let mut first_us: Option<u64> = None;
    let mut last_us = 0u64;

    for (idx, raw_line) in text.lines().enumerate() {
        let line = idx + 1;
        let malformed = |reason: String| CaptureError::Malformed { line, reason };
        let trimmed = raw_line.trim();

        if let Some(comment) = trimmed.strip_prefix('#') {
            parse_metadata(comment.trim(), &mut capture).map_err(malformed)?;
        } else if let Some(rest) = record_body(trimmed, 'R') {
            if descriptor.is_some() {
                return Err(malformed("duplicate report descriptor".into()));
            }
            let bytes = parse_counted_bytes(rest, HID_MAX_DESCRIPTOR_SIZE).map_err(malformed)?;
            descriptor = Some(bytes);
        } else if let Some(rest) = record_body(trimmed, 'E') {
            let (stamp, rest) = split_first(rest);
            let absolute = parse_timestamp(stamp).map_err(malformed)?;
            let payload = parse_counted_bytes(rest, UHID_DATA_MAX).map_err(malformed)?;

            let first = *first_us.get_or_insert(absolute);
            let timestamp_us = absolute
                .checked_sub(first)
                .filter(|&t| t >= last_us)
                .ok_or_else(|| malformed(format!("timestamp {} goes backwards", stamp)))?;
            last_us = timestamp_us;

            capture.reports.push(Report { timestamp_us, payload });
        }
    }

    capture.descriptor = descriptor.ok_or(CaptureError::MissingDescriptor)?;
    Ok(capture)
}

/// Body of an `R`/`E` record, accepting an optional `:` after the letter.
fn record_body(line: &str, tag: char) -> Option<&str> {
    let rest = line.strip_prefix(tag)?;
    let rest = rest.strip_prefix(':').unwrap_or(rest);
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim_start())
}

fn split_first(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn parse_metadata(comment: &str, capture: &mut Capture) -> Result<(), String> {
    let (key, value) = split_first(comment);
    match key {
        "name" => capture.name = value.to_string(),
        "phys" => capture.phys = value.to_string(),
        "info" => {
            let fields: Vec<&str> = value.split_whitespace().collect();
            let [bus, vid, pid] = fields.as_slice() else {
                return Err(format!("info expects 3 fields, got {}", fields.len()));
            };
            capture.bus = parse_hex_u16(bus)?;
            capture.vendor_id = parse_hex_u16(vid)?;
            capture.product_id = parse_hex_u16(pid)?;
        }
        "version" => {
            capture.version = value
                .parse()
                .map_err(|_| format!("invalid version '{}'", value))?;
        }
        "country" => {
            capture.country = value
                .parse()
                .map_err(|_| format!("invalid country '{}'", value))?;
        }
        _ => {}
    }
    Ok(())
}

fn parse_hex_u16(s: &str) -> Result<u16, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u16::from_str_radix(digits, 16).map_err(|_| format!("invalid hex value '{}'", s))
}

/// `<sec>.<usec>` to absolute microseconds. A short fraction is a decimal
/// fraction, so `1.5` is 1500000.
fn parse_timestamp(s: &str) -> Result<u64, String> {
    let invalid = || format!("invalid timestamp '{}'", s);
    let (secs, frac) = s.split_once('.').unwrap_or((s, ""));

    if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if frac.len() > 6 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let secs: u64 = secs.parse().map_err(|_| invalid())?;
    let micros: u64 = if frac.is_empty() {
        0
    } else {
        frac.parse::<u64>().map_err(|_| invalid())? * 10u64.pow(6 - frac.len() as u32)
    };

    secs.checked_mul(1_000_000)
        .and_then(|us| us.checked_add(micros))
        .ok_or_else(invalid)
}

fn parse_counted_bytes(s: &str, max: usize) -> Result<Vec<u8>, String> {
    let mut tokens = s.split_whitespace();
    let count: usize = tokens
        .next()
        .ok_or("missing byte count")?
        .parse()
        .map_err(|_| "invalid byte count".to_string())?;
    if count > max {
        return Err(format!("{} bytes exceeds the limit of {}", count, max));
    }

    let bytes = tokens
        .map(|t| t.parse::<u8>().map_err(|_| format!("invalid byte value '{}'", t)))
        .collect::<Result<Vec<u8>, String>>()?;

    if bytes.len() != count {
        return Err(format!("byte count {} but {} bytes present", count, bytes.len()));
    }
    Ok(bytes)
}
