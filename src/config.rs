// src/config.rs
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::ndef::DEFAULT_MAX_MESSAGE_SIZE;

pub const ENV_BIND_ADDR: &str = "NFC_BRIDGE_ADDR";
pub const ENV_TAG_TIMEOUT_SECS: &str = "NFC_TAG_TIMEOUT_SECS";
pub const ENV_MAX_MESSAGE_SIZE: &str = "NFC_MAX_MESSAGE_SIZE";
pub const ENV_NFC_AVAILABLE: &str = "NFC_AVAILABLE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    /// How long a session waits for a tag before timing out
    pub tag_timeout: Duration,
    pub max_message_size: usize,
    /// Answer given to `hasNfcSupport`
    pub nfc_available: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3500)),
            tag_timeout: Duration::from_secs(60),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            nfc_available: true,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_addr = parse(&lookup, ENV_BIND_ADDR)?.unwrap_or(defaults.bind_addr);
        let tag_timeout = match parse::<u64>(&lookup, ENV_TAG_TIMEOUT_SECS)? {
            Some(0) => return Err(invalid(ENV_TAG_TIMEOUT_SECS, "0", "must be at least one second")),
            Some(secs) => Duration::from_secs(secs),
            None => defaults.tag_timeout,
        };
        let max_message_size =
            parse(&lookup, ENV_MAX_MESSAGE_SIZE)?.unwrap_or(defaults.max_message_size);
        let nfc_available = match lookup(ENV_NFC_AVAILABLE) {
            Some(value) => parse_bool(ENV_NFC_AVAILABLE, &value)?,
            None => defaults.nfc_available,
        };

        Ok(Self {
            bind_addr,
            tag_timeout,
            max_message_size,
            nfc_available,
        })
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    lookup(var)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|err: T::Err| invalid(var, &value, &err.to_string()))
        })
        .transpose()
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(var, value, "expected true or false")),
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
