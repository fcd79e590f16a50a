//! Radio command bytes and MQTT action names
//!
//! Every radio frame is `[command byte][payload]`. The constants below are the
//! command characters understood by locomotive and keypad firmware, together
//! with the MQTT action suffixes used under `cab/<addr>/`.

/// Introduction (device self-announcement, or a request for one when empty)
pub const CMD_INTRO: u8 = b'A';
/// Subscribe a keypad to a locomotive
pub const CMD_SUBSCRIBE: u8 = b'B';
/// List known devices
pub const CMD_LIST_CABS: u8 = b'C';
/// Direction set
pub const CMD_DIRECTION: u8 = b'D';
/// Function on/off
pub const CMD_FUNCTION_SET: u8 = b'F';
/// Value-store get
pub const CMD_VALUE_GET: u8 = b'G';
/// Telemetry heartbeat
pub const CMD_HEARTBEAT: u8 = b'H';
/// Value-store list response
pub const CMD_VALUE_LIST: u8 = b'J';
/// Heartbeat field names
pub const CMD_HEARTBEAT_KEYS: u8 = b'K';
/// Value-store list request
pub const CMD_VALUE_LIST_REQ: u8 = b'L';
/// Function name
pub const CMD_FUNCTION_NAME: u8 = b'M';
/// Function get
pub const CMD_FUNCTION_GET: u8 = b'P';
/// Value-store set
pub const CMD_VALUE_SET: u8 = b'S';
/// Throttle set
pub const CMD_THROTTLE: u8 = b'T';
/// Function list request
pub const CMD_FUNCTION_LIST_REQ: u8 = b'U';
/// Function list response
pub const CMD_FUNCTION_LIST: u8 = b'V';
/// Ping, echoed back verbatim by the gateway
pub const CMD_PING: u8 = b'0';

pub const MQ_INTRO: &str = "intro";
pub const MQ_INTRO_REQ: &str = "intro/req";
pub const MQ_HEARTBEAT_KEYS: &str = "heartbeat/keys";
pub const MQ_HEARTBEAT_VALUES: &str = "heartbeat/values";
pub const MQ_HEARTBEAT: &str = "heartbeat";
pub const MQ_THROTTLE: &str = "throttle";
pub const MQ_DIRECTION: &str = "direction";
pub const MQ_FUNCTION_LIST_REQ: &str = "function/list/req";
pub const MQ_FUNCTION_LIST: &str = "function/list";
pub const MQ_FUNCTION_NAME: &str = "function/name/";
pub const MQ_FUNCTION_GET: &str = "function/get";
pub const MQ_FUNCTION_SET: &str = "function/";
pub const MQ_VALUE_LIST_REQ: &str = "value/list/req";
pub const MQ_VALUE_LIST: &str = "value/list";
pub const MQ_VALUE_GET: &str = "value/get";
pub const MQ_VALUE_SET: &str = "value/";

/// Direction names, indexed by their wire value
pub const DIRECTIONS: [&str; 4] = ["REVERSE", "FORWARD", "STOP", "NEUTRAL"];

pub const FUNCTION_ON: &str = "ON";
pub const FUNCTION_OFF: &str = "OFF";

/// Device type letters carried in introductions
pub const TYPE_LOCO: &str = "L";
pub const TYPE_KEYPAD: &str = "K";

/// Printable form of a command byte for log output
pub fn command_name(command: u8) -> String {
    if command.is_ascii_graphic() {
        (command as char).to_string()
    } else {
        format!("0x{command:02x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_indices_are_fixed() {
        assert_eq!(DIRECTIONS[0], "REVERSE");
        assert_eq!(DIRECTIONS[1], "FORWARD");
        assert_eq!(DIRECTIONS[2], "STOP");
        assert_eq!(DIRECTIONS[3], "NEUTRAL");
    }

    #[test]
    fn test_command_name() {
        assert_eq!(command_name(CMD_THROTTLE), "T");
        assert_eq!(command_name(CMD_PING), "0");
        assert_eq!(command_name(0x01), "0x01");
    }
}
