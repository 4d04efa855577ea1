//! Nintendo Switch Pro Controller.
//!
//! hid-nintendo drives the setup through output reports carrying a
//! sub-command at byte 10; each one expects a 0x21 reply report. The dialog
//! ends with "set input report mode" (0x03). Over USB the driver first
//! sends 0x80-prefixed transport commands, each acknowledged with 0x81.

use super::{mac_from_uniq, DeviceProfile, Model};
use crate::dispatch::{HandlerContext, HandlerResult, Handlers};
use crate::uhid::OutputReport;

pub const SWITCH_PRO: DeviceProfile = DeviceProfile {
    name: "Nintendo Co., Ltd. Pro Controller",
    model: Model::SwitchPro,

    vendor_id: 0x057e,
    product_ids: &[0x2009],

    default_uniq: "98:b6:e9:12:34:56",
};

const REPLY_LEN: usize = 64;

const SUBCOMMAND_OFFSET: usize = 10;

const SUB_REPORT_MODE: u8 = 0x03;
const SUB_DEVICE_INFO: u8 = 0x02;
const SUB_SPI_READ: u8 = 0x10;
const SUB_HOME_LIGHT: u8 = 0x38;
const SUB_PLAYER_LIGHTS: u8 = 0x30;
const SUB_IMU_ENABLE: u8 = 0x40;
const SUB_IMU_SENSITIVITY: u8 = 0x41;
const SUB_VIBRATION: u8 = 0x48;

const ACK: u8 = 0x80;
const ACK_WITH_DATA: u8 = 0x90;
const ACK_DEVICE_INFO: u8 = 0x82;

const USB_COMMAND_REPORT: u8 = 0x80;
const USB_REPLY_REPORT: u8 = 0x81;
const USB_CMD_STATUS: u8 = 0x01;
const USB_CMD_HANDSHAKE: u8 = 0x02;
const USB_CMD_BAUDRATE: u8 = 0x03;
const USB_CMD_NO_TIMEOUT: u8 = 0x04;

/// 0x21 header: report id, timer, battery/connection, buttons ×3,
/// left stick ×3, right stick ×3 (centred), vibrator.
const REPLY_HEADER: [u8; 13] = [
    0x21, 0x00, 0x91, 0x00, 0x00, 0x00, 0x00, 0x08, 0x80, 0x00, 0x08, 0x80, 0x00,
];

const fn subcommand_reply(ack: u8, subcommand: u8, data: &[u8]) -> [u8; REPLY_LEN] {
    let mut r = [0u8; REPLY_LEN];
    let mut i = 0;
    while i < REPLY_HEADER.len() {
        r[i] = REPLY_HEADER[i];
        i += 1;
    }
    r[13] = ack;
    r[14] = subcommand;
    let mut j = 0;
    while j < data.len() {
        r[15 + j] = data[j];
        j += 1;
    }
    r
}

/// SPI read reply: little-endian address, length, then the flash bytes.
const fn spi_reply(addr: u16, data: &[u8]) -> [u8; REPLY_LEN] {
    let mut r = subcommand_reply(ACK_WITH_DATA, SUB_SPI_READ, &[]);
    r[15] = addr as u8;
    r[16] = (addr >> 8) as u8;
    r[19] = data.len() as u8;
    let mut i = 0;
    while i < data.len() {
        r[20 + i] = data[i];
        i += 1;
    }
    r
}

const REPORT_MODE_ACK: [u8; REPLY_LEN] = subcommand_reply(ACK, SUB_REPORT_MODE, &[]);
const HOME_LIGHT_ACK: [u8; REPLY_LEN] = subcommand_reply(ACK, SUB_HOME_LIGHT, &[]);
const PLAYER_LIGHTS_ACK: [u8; REPLY_LEN] = subcommand_reply(ACK, SUB_PLAYER_LIGHTS, &[]);
const IMU_ENABLE_ACK: [u8; REPLY_LEN] = subcommand_reply(ACK, SUB_IMU_ENABLE, &[]);
const IMU_SENSITIVITY_ACK: [u8; REPLY_LEN] = subcommand_reply(ACK, SUB_IMU_SENSITIVITY, &[]);
const VIBRATION_ACK: [u8; REPLY_LEN] = subcommand_reply(ACK, SUB_VIBRATION, &[]);

// Factory calibration as read from a retail controller's SPI flash.
const SPI_IMU_CALIBRATION: [u8; REPLY_LEN] = spi_reply(
    0x6020,
    &[
        0xD3, 0xFF, 0xD5, 0xFF, 0x55, 0x01, 0x00, 0x40, 0x00, 0x40, 0x00, 0x40, 0x19, 0x00, 0xDD,
        0xFF, 0xDC, 0xFF, 0x3B, 0x34, 0x3B, 0x34, 0x3B, 0x34,
    ],
);
const SPI_STICK_CALIBRATION: [u8; REPLY_LEN] = spi_reply(
    0x603D,
    &[
        0xBA, 0xF5, 0x62, 0x6F, 0xC8, 0x77, 0xED, 0x95, 0x5B, 0x16, 0xD8, 0x7D, 0xF2, 0xB5, 0x5F,
        0x86, 0x65, 0x5E,
    ],
);
const SPI_SENSOR_PARAMS: [u8; REPLY_LEN] = spi_reply(
    0x6080,
    &[
        0x50, 0xFD, 0x00, 0x00, 0xC6, 0x0F, 0x0F, 0x30, 0x61, 0x96, 0x30, 0xF3, 0xD4, 0x14, 0x54,
        0x41, 0x15, 0x54, 0xC7, 0x79, 0x9C, 0x33, 0x36, 0x63,
    ],
);
const SPI_STICK_PARAMS: [u8; REPLY_LEN] = spi_reply(
    0x6086,
    &[
        0x0F, 0x30, 0x61, 0x96, 0x30, 0xF3, 0xD4, 0x14, 0x54, 0x41, 0x15, 0x54, 0xC7, 0x79, 0x9C,
        0x33, 0x36, 0x63,
    ],
);

/// Canned reply for a sub-command. SPI reads are keyed by the low address
/// byte that follows the sub-command.
fn canned_reply(subcommand: u8, arg: Option<u8>) -> Option<&'static [u8; REPLY_LEN]> {
    let reply = match (subcommand, arg) {
        (SUB_SPI_READ, Some(0x20)) => &SPI_IMU_CALIBRATION,
        (SUB_SPI_READ, Some(0x3D)) => &SPI_STICK_CALIBRATION,
        (SUB_SPI_READ, Some(0x80)) => &SPI_SENSOR_PARAMS,
        (SUB_SPI_READ, Some(0x86)) => &SPI_STICK_PARAMS,
        (SUB_SPI_READ, _) => return None,
        (SUB_REPORT_MODE, _) => &REPORT_MODE_ACK,
        (SUB_HOME_LIGHT, _) => &HOME_LIGHT_ACK,
        (SUB_PLAYER_LIGHTS, _) => &PLAYER_LIGHTS_ACK,
        (SUB_IMU_ENABLE, _) => &IMU_ENABLE_ACK,
        (SUB_IMU_SENSITIVITY, _) => &IMU_SENSITIVITY_ACK,
        (SUB_VIBRATION, _) => &VIBRATION_ACK,
        _ => return None,
    };
    Some(reply)
}

/// Reply to "request device info": firmware 3.139, Pro Controller type,
/// MAC from `uniq`.
fn device_info_reply(ctx: &HandlerContext<'_>) -> HandlerResult<Vec<u8>> {
    let mac = mac_from_uniq(ctx.uniq())?;
    let mut data = vec![0x03, 0x8B, 0x03, 0x02];
    data.extend_from_slice(&mac);
    data.extend_from_slice(&[0x01, 0x01]);
    Ok(subcommand_reply(ACK_DEVICE_INFO, SUB_DEVICE_INFO, &data).to_vec())
}

fn usb_reply(ctx: &HandlerContext<'_>, command: u8) -> HandlerResult<Option<Vec<u8>>> {
    let mut reply = vec![0u8; REPLY_LEN];
    reply[0] = USB_REPLY_REPORT;
    reply[1] = command;

    match command {
        USB_CMD_STATUS => {
            let mut mac = mac_from_uniq(ctx.uniq())?;
            mac.reverse();
            reply[3] = 0x03;
            reply[4..10].copy_from_slice(&mac);
        }
        USB_CMD_HANDSHAKE | USB_CMD_BAUDRATE | USB_CMD_NO_TIMEOUT => {}
        _ => return Ok(None),
    }
    Ok(Some(reply))
}

pub fn output(ctx: &HandlerContext<'_>, out: &OutputReport) -> HandlerResult<Vec<Vec<u8>>> {
    let data = &out.data;

    if data.first() == Some(&USB_COMMAND_REPORT) {
        let Some(&command) = data.get(1) else {
            return Ok(Vec::new());
        };
        return Ok(match usb_reply(ctx, command)? {
            Some(reply) => vec![reply],
            None => {
                log::debug!("Ignoring USB command {:#04x}", command);
                Vec::new()
            }
        });
    }

    let Some(&subcommand) = data.get(SUBCOMMAND_OFFSET) else {
        return Ok(Vec::new());
    };
    let arg = data.get(SUBCOMMAND_OFFSET + 1).copied();

    if subcommand == SUB_DEVICE_INFO {
        return Ok(vec![device_info_reply(ctx)?]);
    }

    let Some(reply) = canned_reply(subcommand, arg) else {
        log::debug!("Ignoring sub-command {:#04x} ({:02x?})", subcommand, arg);
        return Ok(Vec::new());
    };

    if subcommand == SUB_REPORT_MODE {
        ctx.set_handshake_done();
    }
    Ok(vec![reply.to_vec()])
}

pub fn handlers() -> Handlers {
    Handlers::new().on_output(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signals;
    use crate::uhid::{DeviceIdentity, ReportType};

    fn subcommand(sub: u8, arg: u8) -> OutputReport {
        let mut data = vec![0u8; 49];
        data[0] = 0x01;
        data[SUBCOMMAND_OFFSET] = sub;
        data[SUBCOMMAND_OFFSET + 1] = arg;
        OutputReport { data, rtype: ReportType::Output }
    }

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            name: SWITCH_PRO.name.into(),
            phys: String::new(),
            uniq: SWITCH_PRO.default_uniq.into(),
        }
    }

    #[test]
    fn test_replies_are_well_formed() {
        for reply in [
            &REPORT_MODE_ACK,
            &PLAYER_LIGHTS_ACK,
            &SPI_IMU_CALIBRATION,
            &SPI_STICK_PARAMS,
        ] {
            assert_eq!(reply.len(), REPLY_LEN);
            assert_eq!(reply[0], 0x21);
        }
        assert_eq!(&SPI_IMU_CALIBRATION[13..20], &[0x90, 0x10, 0x20, 0x60, 0x00, 0x00, 24]);
        assert_eq!(&SPI_STICK_CALIBRATION[13..20], &[0x90, 0x10, 0x3D, 0x60, 0x00, 0x00, 18]);
        assert_eq!(&VIBRATION_ACK[13..15], &[0x80, 0x48]);
    }

    #[test]
    fn test_spi_reads_keyed_by_address() {
        let id = identity();
        let signals = Signals::new();
        let ctx = HandlerContext::new(&id, &signals);

        let replies = output(&ctx, &subcommand(SUB_SPI_READ, 0x80)).unwrap();
        assert_eq!(replies, vec![SPI_SENSOR_PARAMS.to_vec()]);

        // User calibration at 0x8010 has no canned reply.
        assert!(output(&ctx, &subcommand(SUB_SPI_READ, 0x10)).unwrap().is_empty());
    }

    #[test]
    fn test_report_mode_ends_handshake() {
        let id = identity();
        let signals = Signals::new();
        let ctx = HandlerContext::new(&id, &signals);

        output(&ctx, &subcommand(SUB_VIBRATION, 0x01)).unwrap();
        assert!(!signals.handshake_done.is_set());

        let replies = output(&ctx, &subcommand(SUB_REPORT_MODE, 0x30)).unwrap();
        assert_eq!(replies, vec![REPORT_MODE_ACK.to_vec()]);
        assert!(signals.handshake_done.is_set());
    }

    #[test]
    fn test_unknown_and_short_outputs_ignored() {
        let id = identity();
        let signals = Signals::new();
        let ctx = HandlerContext::new(&id, &signals);

        assert!(output(&ctx, &subcommand(0x21, 0)).unwrap().is_empty());
        let short = OutputReport { data: vec![0x10, 0x01], rtype: ReportType::Output };
        assert!(output(&ctx, &short).unwrap().is_empty());
    }

    #[test]
    fn test_device_info_carries_mac() {
        let id = identity();
        let signals = Signals::new();
        let ctx = HandlerContext::new(&id, &signals);

        let replies = output(&ctx, &subcommand(SUB_DEVICE_INFO, 0)).unwrap();
        let reply = &replies[0];
        assert_eq!(reply.len(), REPLY_LEN);
        assert_eq!(&reply[13..15], &[ACK_DEVICE_INFO, SUB_DEVICE_INFO]);
        assert_eq!(reply[17], 0x03);
        assert_eq!(&reply[19..25], &[0x98, 0xb6, 0xe9, 0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_usb_transport_commands() {
        let id = identity();
        let signals = Signals::new();
        let ctx = HandlerContext::new(&id, &signals);
        let usb = |cmd| OutputReport {
            data: vec![USB_COMMAND_REPORT, cmd],
            rtype: ReportType::Output,
        };

        let replies = output(&ctx, &usb(USB_CMD_HANDSHAKE)).unwrap();
        assert_eq!(&replies[0][..2], &[USB_REPLY_REPORT, USB_CMD_HANDSHAKE]);

        let replies = output(&ctx, &usb(USB_CMD_STATUS)).unwrap();
        assert_eq!(&replies[0][4..10], &[0x56, 0x34, 0x12, 0xe9, 0xb6, 0x98]);

        assert!(output(&ctx, &usb(0x05)).unwrap().is_empty());
        assert!(!signals.handshake_done.is_set());
    }
}
