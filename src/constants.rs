//! Bit-exact constants for the LINE wire format.

use std::time::Duration;

/// First byte of every frame.
pub const SYNC: u8 = 0x55;

/// Mask selecting the 14 id bits of a request code.
pub const PARITY_MASK: u16 = 0x3FFF;

/// Position of the two parity bits within a request code.
pub const PARITY_POS: u16 = 14;

/// Added to the sum of payload bytes and payload length to form a checksum.
pub const CHECKSUM_OFFSET: u8 = 0xA3;

/// Time allowed for the first response byte (`size`) to arrive.
pub const T_REQ: Duration = Duration::from_millis(100);

/// Time allowed between successive response bytes, and for the checksum byte.
pub const T_DAT: Duration = Duration::from_millis(100);

/// Time allowed for a one-wire echo of our own transmission to arrive.
pub const T_ECHO: Duration = Duration::from_secs(1);

/// Address reserved for the bus master.
pub const MASTER_ADDRESS: u8 = 0;

/// Address meaning "not yet assigned".
pub const UNASSIGNED_ID: u8 = 14;

/// Address meaning "every node".
pub const BROADCAST_ID: u8 = 15;

/// Diagnostic request ids (14-bit, unshifted).
pub const REQ_WAKEUP: u16 = 0x0000;
pub const REQ_IDLE: u16 = 0x0100;
pub const REQ_SHUTDOWN: u16 = 0x0101;
pub const REQ_COND_CHANGE_ADDRESS: u16 = 0x01E0;
pub const REQ_OP_STATUS: u16 = 0x0200;
pub const REQ_POWER_STATUS: u16 = 0x0210;
pub const REQ_SERIAL_NUMBER: u16 = 0x0220;
pub const REQ_SW_NUMBER: u16 = 0x0230;

/// Low-nibble mask separating a diagnostic request's base code from its
/// target address.
pub const REQUEST_ID_MASK: u16 = 0x0ff0;

/// Operation status codes carried by `REQ_OP_STATUS` responses.
pub const OP_STATUS_INIT: u8 = 0x00;
pub const OP_STATUS_OK: u8 = 0x01;
pub const OP_STATUS_WARN: u8 = 0x02;
pub const OP_STATUS_ERROR: u8 = 0x03;
pub const OP_STATUS_BOOT: u8 = 0x40;
pub const OP_STATUS_BOOT_ERROR: u8 = 0x41;

/// Renders an operation status byte as the label used in `NodeStatus`.
///
/// Unknown codes round-trip as their hex value so a listener can still log
/// something useful instead of the request silently failing.
pub fn op_status_str(code: u8) -> String {
    match code {
        OP_STATUS_INIT => "Init",
        OP_STATUS_OK => "Ok",
        OP_STATUS_WARN => "Warn",
        OP_STATUS_ERROR => "Error",
        OP_STATUS_BOOT => "Boot",
        OP_STATUS_BOOT_ERROR => "BootError",
        _ => return format!("Unknown({code:#04x})"),
    }
    .to_string()
}

/// Inverse of [`op_status_str`], used by simulated peripherals to turn their
/// `op_status` field back into a wire byte.
pub fn op_status_code(label: &str) -> Option<u8> {
    Some(match label {
        "Init" => OP_STATUS_INIT,
        "Ok" => OP_STATUS_OK,
        "Warn" => OP_STATUS_WARN,
        "Error" => OP_STATUS_ERROR,
        "Boot" => OP_STATUS_BOOT,
        "BootError" => OP_STATUS_BOOT_ERROR,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn op_status_round_trips() {
        for code in [
            OP_STATUS_INIT,
            OP_STATUS_OK,
            OP_STATUS_WARN,
            OP_STATUS_ERROR,
            OP_STATUS_BOOT,
            OP_STATUS_BOOT_ERROR,
        ] {
            let label = op_status_str(code);
            assert_eq!(op_status_code(&label), Some(code));
        }
    }

    #[test]
    fn unknown_op_status_does_not_round_trip() {
        assert_eq!(op_status_code(&op_status_str(0x55)), None);
    }
}
