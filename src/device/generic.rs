//! Any HID device without a driver-specific dialog: replay may begin as
//! soon as a consumer opens the device.

use super::{DeviceProfile, Model};
use crate::dispatch::Handlers;
use crate::uhid::EventType;

pub const GENERIC: DeviceProfile = DeviceProfile {
    name: "Generic HID device",
    model: Model::Generic,

    vendor_id: 0,
    product_ids: &[],

    default_uniq: "",
};

pub fn handlers() -> Handlers {
    Handlers::new().on(EventType::Open, |ctx| {
        ctx.set_handshake_done();
        Ok(())
    })
}
