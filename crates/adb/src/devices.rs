use serde::{Deserialize, Serialize};

/// Connection state reported by `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceState {
    Device,
    Offline,
    Unauthorized,
    Other(String),
}

impl DeviceState {
    fn from_token(token: &str) -> Self {
        match token {
            "device" => DeviceState::Device,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            other => DeviceState::Other(other.to_string()),
        }
    }

    /// Whether the device is usable for file operations.
    pub fn is_online(&self) -> bool {
        matches!(self, DeviceState::Device)
    }
}

/// One row of `adb devices -l`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub serial: String,
    pub state: DeviceState,
    /// `model:` field when the server reports one, else the serial.
    pub model: Option<String>,
}

impl Device {
    /// Name to show in a device picker.
    pub fn display_name(&self) -> &str {
        self.model.as_deref().unwrap_or(&self.serial)
    }
}

/// Parses `adb devices -l` output. Header and daemon-banner lines are
/// skipped; malformed rows are dropped.
pub fn parse_devices(output: &str) -> Vec<Device> {
    output
        .lines()
        .filter(|line| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*')
        })
        .filter_map(parse_device_line)
        .collect()
}

fn parse_device_line(line: &str) -> Option<Device> {
    let mut tokens = line.split_whitespace();
    let serial = tokens.next()?.to_string();
    let state = DeviceState::from_token(tokens.next()?);
    let model = tokens
        .find_map(|token| token.strip_prefix("model:"))
        .map(str::to_string);
    Some(Device {
        serial,
        state,
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
List of devices attached
emulator-5554          device product:sdk_gphone64_x86_64 model:sdk_gphone64_x86_64 device:emu64x transport_id:1
R58M123456             device usb:1-2 product:beyond1 model:SM_G973F device:beyond1 transport_id:2
192.168.1.50:5555      offline
0a1b2c3d               unauthorized
";

    #[test]
    fn parses_all_rows() {
        let devices = parse_devices(SAMPLE);
        assert_eq!(devices.len(), 4);

        assert_eq!(devices[0].serial, "emulator-5554");
        assert_eq!(devices[0].state, DeviceState::Device);
        assert_eq!(devices[0].model.as_deref(), Some("sdk_gphone64_x86_64"));

        assert_eq!(devices[1].model.as_deref(), Some("SM_G973F"));

        assert_eq!(devices[2].serial, "192.168.1.50:5555");
        assert_eq!(devices[2].state, DeviceState::Offline);
        assert!(devices[2].model.is_none());

        assert_eq!(devices[3].state, DeviceState::Unauthorized);
    }

    #[test]
    fn skips_daemon_banner() {
        let output = "\
* daemon not running; starting now at tcp:5037
* daemon started successfully
List of devices attached
emulator-5554\tdevice
";
        let devices = parse_devices(output);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].serial, "emulator-5554");
    }

    #[test]
    fn empty_output_is_empty() {
        assert!(parse_devices("List of devices attached\n\n").is_empty());
    }

    #[test]
    fn unknown_state_preserved() {
        let devices = parse_devices("abc recovery\n");
        assert_eq!(devices[0].state, DeviceState::Other("recovery".into()));
        assert!(!devices[0].state.is_online());
    }

    #[test]
    fn display_name_prefers_model() {
        let devices = parse_devices(SAMPLE);
        assert_eq!(devices[1].display_name(), "SM_G973F");
        assert_eq!(devices[2].display_name(), "192.168.1.50:5555");
    }
}
