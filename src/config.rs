//! Immutable configuration handed to each stage of a run.

use crate::mac_address::{MacAddress, ParseMacError};
use thiserror::Error;

/// How the thermometer advertises its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AddressType {
    #[default]
    Public,
    Random,
}

#[cfg(feature = "bluer")]
impl From<AddressType> for bluer::AddressType {
    fn from(address_type: AddressType) -> Self {
        match address_type {
            AddressType::Public => bluer::AddressType::LePublic,
            AddressType::Random => bluer::AddressType::LeRandom,
        }
    }
}

/// The single device read per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub address: MacAddress,
    /// The address exactly as configured; the topic is built from this text.
    pub address_text: String,
    pub address_type: AddressType,
}

impl DeviceConfig {
    pub fn parse(address: &str, address_type: AddressType) -> Result<Self, ParseMacError> {
        Ok(Self {
            address: address.parse()?,
            address_text: address.to_string(),
            address_type,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    /// Prepended verbatim to the device address to form the topic.
    pub topic_prefix: String,
}

impl BrokerConfig {
    /// Topic for a device: the prefix followed by the suffix, no separator added.
    pub fn topic_for(&self, suffix: &str) -> String {
        format!("{}{}", self.topic_prefix, suffix)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub device: DeviceConfig,
    pub broker: BrokerConfig,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    InvalidAddress(#[from] ParseMacError),
    #[error("MQTT host must not be empty")]
    EmptyHost,
    #[error("MQTT client id must not be empty")]
    EmptyClientId,
    #[error("MQTT password given without a username")]
    PasswordWithoutUsername,
}

impl Config {
    pub fn new(device: DeviceConfig, broker: BrokerConfig) -> Result<Self, ConfigError> {
        let config = Self { device, broker };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        if self.broker.client_id.is_empty() {
            return Err(ConfigError::EmptyClientId);
        }
        if self.broker.password.is_some() && self.broker.username.is_none() {
            return Err(ConfigError::PasswordWithoutUsername);
        }
        Ok(())
    }

    /// Topic the reading of the configured device is published on.
    pub fn topic(&self) -> String {
        self.broker.topic_for(&self.device.address_text)
    }
}
