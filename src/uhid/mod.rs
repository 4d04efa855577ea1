//! Linux user-space HID gateway (`/dev/uhid`): wire format, descriptor
//! ownership and the in-memory gateway used by tests.

mod frame;
mod gateway;
mod handle;
#[doc(hidden)]
pub mod mock;

pub use frame::{
    CreateRequest, EventType, Frame, FrameError, GetReportRequest, OutputReport, ReportType,
    SetReportRequest,
};
pub use gateway::{Gateway, UhidFile};
pub use handle::{DeviceHandle, DeviceIdentity, GatewayError};

/// Default gateway node.
pub const UHID_PATH: &str = "/dev/uhid";

/// Maximum payload of an input/output/feature report (`UHID_DATA_MAX`).
pub const UHID_DATA_MAX: usize = 4096;

/// Maximum report descriptor length (`HID_MAX_DESCRIPTOR_SIZE`).
pub const HID_MAX_DESCRIPTOR_SIZE: usize = 4096;

/// Size of `struct uhid_event`: a u32 tag followed by the union, whose
/// largest member is `uhid_create2_req` (name 128 + phys 64 + uniq 64 +
/// 2×u16 + 4×u32 + rd_data 4096).
pub const UHID_EVENT_SIZE: usize = 4 + 128 + 64 + 64 + 2 + 2 + 4 * 4 + HID_MAX_DESCRIPTOR_SIZE;

/// `BUS_USB` from `linux/input.h`.
pub const BUS_USB: u16 = 0x03;
/// `BUS_BLUETOOTH` from `linux/input.h`.
pub const BUS_BLUETOOTH: u16 = 0x05;
