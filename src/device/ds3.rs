//! Sony DualShock 3 (SIXAXIS).
//!
//! hid-sony reads feature report 0xF2 for the pairing MAC, then 0xF5 as
//! the last request of its device setup.

use super::{mac_from_uniq, DeviceProfile, Model};
use crate::dispatch::{HandlerContext, HandlerResult, Handlers, ReportReply};
use crate::uhid::GetReportRequest;

pub const DS3: DeviceProfile = DeviceProfile {
    name: "Sony PLAYSTATION(R)3 Controller",
    model: Model::DualShock3,

    vendor_id: 0x054c,
    product_ids: &[0x0268],

    default_uniq: "00:01:23:45:67:89",
};

const FEATURE_MAC: u8 = 0xF2;
const FEATURE_OPERATIONAL: u8 = 0xF5;

/// MAC lives in bytes 4..10.
const MAC_OFFSET: usize = 4;
const MAC_REPORT: [u8; 17] = [
    0xF2, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x50, 0x81, 0xD8, 0x01,
    0x8A,
];

const OPERATIONAL_REPORT: [u8; 8] = [0x01, 0x00, 0x18, 0x5E, 0x0F, 0x71, 0xA4, 0xBB];

pub fn get_report(ctx: &HandlerContext<'_>, req: &GetReportRequest) -> HandlerResult<ReportReply> {
    match req.rnum {
        FEATURE_MAC => {
            let mac = mac_from_uniq(ctx.uniq())?;
            let mut report = MAC_REPORT;
            report[MAC_OFFSET..MAC_OFFSET + 6].copy_from_slice(&mac);
            Ok(ReportReply::data(report))
        }
        FEATURE_OPERATIONAL => {
            ctx.set_handshake_done();
            Ok(ReportReply::data(OPERATIONAL_REPORT))
        }
        _ => Ok(ReportReply::empty()),
    }
}

pub fn handlers() -> Handlers {
    Handlers::new().on_get_report(get_report)
}
