//! Encode and decode `struct uhid_event` frames.
//!
//! Every frame is exactly [`UHID_EVENT_SIZE`] bytes: a `u32` tag followed by
//! the tag's payload at fixed offsets, zero padded. Integers are host byte
//! order since the kernel reads the raw packed struct.

use std::fmt;

use thiserror::Error;

use super::{HID_MAX_DESCRIPTOR_SIZE, UHID_DATA_MAX, UHID_EVENT_SIZE};

const TAG_LEN: usize = 4;

const NAME_LEN: usize = 128;
const PHYS_LEN: usize = 64;
const UNIQ_LEN: usize = 64;

// uhid_create2_req
const CREATE_NAME: usize = 0;
const CREATE_PHYS: usize = CREATE_NAME + NAME_LEN;
const CREATE_UNIQ: usize = CREATE_PHYS + PHYS_LEN;
const CREATE_RD_SIZE: usize = CREATE_UNIQ + UNIQ_LEN;
const CREATE_BUS: usize = CREATE_RD_SIZE + 2;
const CREATE_VENDOR: usize = CREATE_BUS + 2;
const CREATE_PRODUCT: usize = CREATE_VENDOR + 4;
const CREATE_VERSION: usize = CREATE_PRODUCT + 4;
const CREATE_COUNTRY: usize = CREATE_VERSION + 4;
const CREATE_RD_DATA: usize = CREATE_COUNTRY + 4;

// uhid_input2_req
const INPUT_SIZE: usize = 0;
const INPUT_DATA: usize = 2;

// uhid_output_req
const OUTPUT_DATA: usize = 0;
const OUTPUT_SIZE: usize = UHID_DATA_MAX;
const OUTPUT_RTYPE: usize = OUTPUT_SIZE + 2;

// uhid_get_report_req / uhid_set_report_req share the head
const REQ_ID: usize = 0;
const REQ_RNUM: usize = 4;
const REQ_RTYPE: usize = 5;
const SET_SIZE: usize = 6;
const SET_DATA: usize = 8;

// uhid_get_report_reply_req / uhid_set_report_reply_req
const REPLY_ID: usize = 0;
const REPLY_ERR: usize = 4;
const REPLY_SIZE: usize = 6;
const REPLY_DATA: usize = 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("short frame: {len} bytes, expected {UHID_EVENT_SIZE}")]
    ShortFrame { len: usize },
    #[error("unknown event tag {0}")]
    UnknownTag(u32),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// `enum uhid_event_type`, restricted to the tags this crate speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventType {
    Destroy,
    Start,
    Stop,
    Open,
    Close,
    Output,
    GetReport,
    GetReportReply,
    Create,
    Input,
    SetReport,
    SetReportReply,
}

impl EventType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            1 => EventType::Destroy,
            2 => EventType::Start,
            3 => EventType::Stop,
            4 => EventType::Open,
            5 => EventType::Close,
            6 => EventType::Output,
            9 => EventType::GetReport,
            10 => EventType::GetReportReply,
            11 => EventType::Create,
            12 => EventType::Input,
            13 => EventType::SetReport,
            14 => EventType::SetReportReply,
            _ => return None,
        })
    }

    pub fn raw(self) -> u32 {
        match self {
            EventType::Destroy => 1,
            EventType::Start => 2,
            EventType::Stop => 3,
            EventType::Open => 4,
            EventType::Close => 5,
            EventType::Output => 6,
            EventType::GetReport => 9,
            EventType::GetReportReply => 10,
            EventType::Create => 11,
            EventType::Input => 12,
            EventType::SetReport => 13,
            EventType::SetReportReply => 14,
        }
    }

    /// True for events the kernel sends to us.
    pub fn is_kernel_originated(self) -> bool {
        matches!(
            self,
            EventType::Start
                | EventType::Stop
                | EventType::Open
                | EventType::Close
                | EventType::Output
                | EventType::GetReport
                | EventType::SetReport
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventType::Destroy => "DESTROY",
            EventType::Start => "START",
            EventType::Stop => "STOP",
            EventType::Open => "OPEN",
            EventType::Close => "CLOSE",
            EventType::Output => "OUTPUT",
            EventType::GetReport => "GET_REPORT",
            EventType::GetReportReply => "GET_REPORT_REPLY",
            EventType::Create => "CREATE",
            EventType::Input => "INPUT",
            EventType::SetReport => "SET_REPORT",
            EventType::SetReportReply => "SET_REPORT_REPLY",
        };
        f.write_str(name)
    }
}

/// `enum uhid_report_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Feature,
    Output,
    Input,
}

impl ReportType {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(ReportType::Feature),
            1 => Some(ReportType::Output),
            2 => Some(ReportType::Input),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            ReportType::Feature => 0,
            ReportType::Output => 1,
            ReportType::Input => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub phys: String,
    pub uniq: String,
    pub bus: u16,
    pub vendor: u32,
    pub product: u32,
    pub version: u32,
    pub country: u32,
    pub descriptor: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetReportRequest {
    pub id: u32,
    pub rnum: u8,
    pub rtype: ReportType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetReportRequest {
    pub id: u32,
    pub rnum: u8,
    pub rtype: ReportType,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputReport {
    pub data: Vec<u8>,
    pub rtype: ReportType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Create(CreateRequest),
    Destroy,
    Input(Vec<u8>),
    Start { dev_flags: u64 },
    Stop,
    Open,
    Close,
    Output(OutputReport),
    GetReport(GetReportRequest),
    GetReportReply { id: u32, err: u16, data: Vec<u8> },
    SetReport(SetReportRequest),
    SetReportReply { id: u32, err: u16 },
}

impl Frame {
    pub fn event_type(&self) -> EventType {
        match self {
            Frame::Create(_) => EventType::Create,
            Frame::Destroy => EventType::Destroy,
            Frame::Input(_) => EventType::Input,
            Frame::Start { .. } => EventType::Start,
            Frame::Stop => EventType::Stop,
            Frame::Open => EventType::Open,
            Frame::Close => EventType::Close,
            Frame::Output(_) => EventType::Output,
            Frame::GetReport(_) => EventType::GetReport,
            Frame::GetReportReply { .. } => EventType::GetReportReply,
            Frame::SetReport(_) => EventType::SetReport,
            Frame::SetReportReply { .. } => EventType::SetReportReply,
        }
    }

    /// Serialize into a buffer of exactly [`UHID_EVENT_SIZE`] bytes.
    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        let mut buf = vec![0u8; UHID_EVENT_SIZE];
        buf[..TAG_LEN].copy_from_slice(&self.event_type().raw().to_ne_bytes());

        let p = &mut buf[TAG_LEN..];
        match self {
            Frame::Create(req) => {
                put_str(p, CREATE_NAME, NAME_LEN, &req.name, "name")?;
                put_str(p, CREATE_PHYS, PHYS_LEN, &req.phys, "phys")?;
                put_str(p, CREATE_UNIQ, UNIQ_LEN, &req.uniq, "uniq")?;
                let rd_size = put_bytes(
                    p,
                    CREATE_RD_DATA,
                    HID_MAX_DESCRIPTOR_SIZE,
                    &req.descriptor,
                    "descriptor",
                )?;
                put_u16(p, CREATE_RD_SIZE, rd_size);
                put_u16(p, CREATE_BUS, req.bus);
                put_u32(p, CREATE_VENDOR, req.vendor);
                put_u32(p, CREATE_PRODUCT, req.product);
                put_u32(p, CREATE_VERSION, req.version);
                put_u32(p, CREATE_COUNTRY, req.country);
            }
            Frame::Input(data) => {
                let size = put_bytes(p, INPUT_DATA, UHID_DATA_MAX, data, "input report")?;
                put_u16(p, INPUT_SIZE, size);
            }
            Frame::Start { dev_flags } => {
                p[..8].copy_from_slice(&dev_flags.to_ne_bytes());
            }
            Frame::Output(out) => {
                let size = put_bytes(p, OUTPUT_DATA, UHID_DATA_MAX, &out.data, "output report")?;
                put_u16(p, OUTPUT_SIZE, size);
                p[OUTPUT_RTYPE] = out.rtype.raw();
            }
            Frame::GetReport(req) => {
                put_u32(p, REQ_ID, req.id);
                p[REQ_RNUM] = req.rnum;
                p[REQ_RTYPE] = req.rtype.raw();
            }
            Frame::GetReportReply { id, err, data } => {
                put_u32(p, REPLY_ID, *id);
                put_u16(p, REPLY_ERR, *err);
                let size = put_bytes(p, REPLY_DATA, UHID_DATA_MAX, data, "reply data")?;
                put_u16(p, REPLY_SIZE, size);
            }
            Frame::SetReport(req) => {
                put_u32(p, REQ_ID, req.id);
                p[REQ_RNUM] = req.rnum;
                p[REQ_RTYPE] = req.rtype.raw();
                let size = put_bytes(p, SET_DATA, UHID_DATA_MAX, &req.data, "set-report data")?;
                put_u16(p, SET_SIZE, size);
            }
            Frame::SetReportReply { id, err } => {
                put_u32(p, REPLY_ID, *id);
                put_u16(p, REPLY_ERR, *err);
            }
            Frame::Destroy | Frame::Stop | Frame::Open | Frame::Close => {}
        }

        Ok(buf)
    }

    /// Parse one frame. Bytes past [`UHID_EVENT_SIZE`] are ignored.
    pub fn decode(buf: &[u8]) -> Result<Frame, FrameError> {
        if buf.len() < UHID_EVENT_SIZE {
            return Err(FrameError::ShortFrame { len: buf.len() });
        }

        let raw = get_u32(buf, 0);
        let ty = EventType::from_raw(raw).ok_or(FrameError::UnknownTag(raw))?;
        let p = &buf[TAG_LEN..UHID_EVENT_SIZE];

        let frame = match ty {
            EventType::Create => Frame::Create(CreateRequest {
                name: get_str(&p[CREATE_NAME..CREATE_NAME + NAME_LEN]),
                phys: get_str(&p[CREATE_PHYS..CREATE_PHYS + PHYS_LEN]),
                uniq: get_str(&p[CREATE_UNIQ..CREATE_UNIQ + UNIQ_LEN]),
                bus: get_u16(p, CREATE_BUS),
                vendor: get_u32(p, CREATE_VENDOR),
                product: get_u32(p, CREATE_PRODUCT),
                version: get_u32(p, CREATE_VERSION),
                country: get_u32(p, CREATE_COUNTRY),
                descriptor: get_bytes(
                    p,
                    CREATE_RD_DATA,
                    get_u16(p, CREATE_RD_SIZE),
                    HID_MAX_DESCRIPTOR_SIZE,
                )?,
            }),
            EventType::Destroy => Frame::Destroy,
            EventType::Input => {
                Frame::Input(get_bytes(p, INPUT_DATA, get_u16(p, INPUT_SIZE), UHID_DATA_MAX)?)
            }
            EventType::Start => {
                let mut flags = [0u8; 8];
                flags.copy_from_slice(&p[..8]);
                Frame::Start { dev_flags: u64::from_ne_bytes(flags) }
            }
            EventType::Stop => Frame::Stop,
            EventType::Open => Frame::Open,
            EventType::Close => Frame::Close,
            EventType::Output => Frame::Output(OutputReport {
                data: get_bytes(p, OUTPUT_DATA, get_u16(p, OUTPUT_SIZE), UHID_DATA_MAX)?,
                rtype: get_rtype(p[OUTPUT_RTYPE])?,
            }),
            EventType::GetReport => Frame::GetReport(GetReportRequest {
                id: get_u32(p, REQ_ID),
                rnum: p[REQ_RNUM],
                rtype: get_rtype(p[REQ_RTYPE])?,
            }),
            EventType::GetReportReply => Frame::GetReportReply {
                id: get_u32(p, REPLY_ID),
                err: get_u16(p, REPLY_ERR),
                data: get_bytes(p, REPLY_DATA, get_u16(p, REPLY_SIZE), UHID_DATA_MAX)?,
            },
            EventType::SetReport => Frame::SetReport(SetReportRequest {
                id: get_u32(p, REQ_ID),
                rnum: p[REQ_RNUM],
                rtype: get_rtype(p[REQ_RTYPE])?,
                data: get_bytes(p, SET_DATA, get_u16(p, SET_SIZE), UHID_DATA_MAX)?,
            }),
            EventType::SetReportReply => Frame::SetReportReply {
                id: get_u32(p, REPLY_ID),
                err: get_u16(p, REPLY_ERR),
            },
        };

        Ok(frame)
    }
}

fn put_u16(p: &mut [u8], at: usize, v: u16) {
    p[at..at + 2].copy_from_slice(&v.to_ne_bytes());
}

fn put_u32(p: &mut [u8], at: usize, v: u32) {
    p[at..at + 4].copy_from_slice(&v.to_ne_bytes());
}

/// Copy a NUL-padded string; one byte is kept for the terminator.
fn put_str(p: &mut [u8], at: usize, cap: usize, s: &str, field: &str) -> Result<(), FrameError> {
    let bytes = s.as_bytes();
    if bytes.len() >= cap {
        return Err(FrameError::InvalidPayload(format!(
            "{} is {} bytes, limit is {}",
            field,
            bytes.len(),
            cap - 1
        )));
    }
    if bytes.contains(&0) {
        return Err(FrameError::InvalidPayload(format!("{} contains a NUL byte", field)));
    }
    p[at..at + bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn put_bytes(
    p: &mut [u8],
    at: usize,
    cap: usize,
    data: &[u8],
    field: &str,
) -> Result<u16, FrameError> {
    if data.len() > cap {
        return Err(FrameError::InvalidPayload(format!(
            "{} is {} bytes, limit is {}",
            field,
            data.len(),
            cap
        )));
    }
    p[at..at + data.len()].copy_from_slice(data);
    Ok(data.len() as u16)
}

fn get_u16(p: &[u8], at: usize) -> u16 {
    u16::from_ne_bytes([p[at], p[at + 1]])
}

fn get_u32(p: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes([p[at], p[at + 1], p[at + 2], p[at + 3]])
}

fn get_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

fn get_bytes(p: &[u8], at: usize, size: u16, cap: usize) -> Result<Vec<u8>, FrameError> {
    let size = size as usize;
    if size > cap {
        return Err(FrameError::InvalidPayload(format!(
            "size {} exceeds capacity {}",
            size, cap
        )));
    }
    Ok(p[at..at + size].to_vec())
}

fn get_rtype(raw: u8) -> Result<ReportType, FrameError> {
    ReportType::from_raw(raw)
        .ok_or_else(|| FrameError::InvalidPayload(format!("unknown report type {}", raw)))
}
