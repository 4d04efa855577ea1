//! Sony DualShock 4. During USB setup hid-sony asks for the MAC through
//! feature report 0x81 and finishes with the calibration report 0x02.

use super::{mac_from_uniq, DeviceProfile, Model};
use crate::dispatch::{HandlerContext, HandlerResult, Handlers, ReportReply};
use crate::uhid::GetReportRequest;

pub const DS4: DeviceProfile = DeviceProfile {
    name: "Sony Interactive Entertainment Wireless Controller",
    model: Model::DualShock4,

    vendor_id: 0x054c,
    product_ids: &[0x05c4, 0x09cc, 0x0ba0],

    default_uniq: "01:23:45:67:89:ab",
};

const FEATURE_MAC: u8 = 0x81;
const FEATURE_CALIBRATION: u8 = 0x02;

pub fn get_report(ctx: &HandlerContext<'_>, req: &GetReportRequest) -> HandlerResult<ReportReply> {
    match req.rnum {
        FEATURE_MAC => {
            let mac = mac_from_uniq(ctx.uniq())?;
            let mut report = vec![FEATURE_MAC];
            report.extend_from_slice(&mac);
            Ok(ReportReply::data(report))
        }
        FEATURE_CALIBRATION => {
            ctx.set_handshake_done();
            Ok(ReportReply::empty())
        }
        _ => Ok(ReportReply::empty()),
    }
}

pub fn handlers() -> Handlers {
    Handlers::new().on_get_report(get_report)
}
