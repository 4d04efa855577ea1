mod ds3;
mod ds4;
mod generic;
mod switch_pro;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::dispatch::{HandlerError, HandlerResult, Handlers};

pub use ds3::DS3;
pub use ds4::DS4;
pub use generic::GENERIC;
pub use switch_pro::SWITCH_PRO;

/// Controller-specific parameters for device creation and the handshake.
#[derive(Debug, Clone, Copy)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub model: Model,

    pub vendor_id: u16,
    pub product_ids: &'static [u16],

    /// `uniq` used when none is configured.
    pub default_uniq: &'static str,
}

/// Controller model whose initialization dialog is emulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Model {
    #[serde(rename = "ds3")]
    DualShock3,
    #[serde(rename = "ds4")]
    DualShock4,
    SwitchPro,
    Generic,
}

impl Model {
    /// Pick a model from the captured vendor/product ids.
    pub fn detect(vendor_id: u16, product_id: u16) -> Self {
        for profile in [&DS3, &DS4, &SWITCH_PRO] {
            if profile.vendor_id == vendor_id && profile.product_ids.contains(&product_id) {
                log::info!("Detected {}", profile.name);
                return profile.model;
            }
        }
        log::info!(
            "No controller profile for {:04x}:{:04x}, using generic handshake",
            vendor_id,
            product_id
        );
        Model::Generic
    }

    pub fn profile(self) -> &'static DeviceProfile {
        match self {
            Model::DualShock3 => &DS3,
            Model::DualShock4 => &DS4,
            Model::SwitchPro => &SWITCH_PRO,
            Model::Generic => &GENERIC,
        }
    }

    /// Fresh handlers emulating this model's initialization dialog.
    pub fn handlers(self) -> Handlers {
        match self {
            Model::DualShock3 => ds3::handlers(),
            Model::DualShock4 => ds4::handlers(),
            Model::SwitchPro => switch_pro::handlers(),
            Model::Generic => generic::handlers(),
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Model::DualShock3 => write!(f, "ds3"),
            Model::DualShock4 => write!(f, "ds4"),
            Model::SwitchPro => write!(f, "switch-pro"),
            Model::Generic => write!(f, "generic"),
        }
    }
}

impl FromStr for Model {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ds3" | "dualshock3" | "dualshock-3" => Ok(Model::DualShock3),
            "ds4" | "dualshock4" | "dualshock-4" => Ok(Model::DualShock4),
            "switch-pro" | "switchpro" | "switch_pro" => Ok(Model::SwitchPro),
            "generic" => Ok(Model::Generic),
            _ => Err(format!(
                "Invalid model '{}'. Valid values: ds3, ds4, switch-pro, generic",
                s
            )),
        }
    }
}

/// First six bytes of a `:`-separated hex `uniq`, in written order.
pub fn mac_from_uniq(uniq: &str) -> HandlerResult<[u8; 6]> {
    let bytes = uniq
        .split(':')
        .map(|part| u8::from_str_radix(part.trim(), 16))
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|_| HandlerError::new(format!("uniq '{}' is not a MAC address", uniq)))?;

    let Some(head) = bytes.get(..6) else {
        return Err(HandlerError::new(format!(
            "uniq '{}' has {} bytes, need at least 6",
            uniq,
            bytes.len()
        )));
    };

    let mut mac = [0u8; 6];
    mac.copy_from_slice(head);
    Ok(mac)
}
