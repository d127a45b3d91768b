use crate::config::{AddressType, BrokerConfig, DeviceConfig};
use crate::mac_address::MacAddress;

/// A stable device address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0x49, 0x22, 0x05, 0x17, 0x0C, 0x1F]);

/// 0.16 °C, 0.32 %, internal probe, battery byte 0x50.
pub const INTERNAL_PAYLOAD: [u8; 6] = [0x10, 0x00, 0x20, 0x00, 0x00, 0x50];

/// -2.56 °C, -2.56 %, external probe.
pub const EXTERNAL_NEGATIVE_PAYLOAD: [u8; 6] = [0x00, 0xFF, 0x00, 0xFF, 0x01, 0x00];

pub fn device_config() -> DeviceConfig {
    DeviceConfig {
        address: TEST_MAC,
        address_text: TEST_MAC.to_string(),
        address_type: AddressType::Public,
    }
}

pub fn broker_config() -> BrokerConfig {
    BrokerConfig {
        host: "broker.local".to_string(),
        port: 1883,
        username: Some("user".to_string()),
        password: Some("secret".to_string()),
        client_id: "inkbird2mqtt-test".to_string(),
        topic_prefix: "inkbird/".to_string(),
    }
}
