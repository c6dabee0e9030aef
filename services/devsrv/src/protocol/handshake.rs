//! Device identifier sent as the first message on a new connection

use std::fmt;

use crate::error::{DevSrvError, Result};

/// Identifier length in ASCII characters
pub const DEVICE_ID_LEN: usize = 12;

/// A validated device identifier: 12 characters of `0-9A-F`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    /// Validate the raw handshake bytes
    ///
    /// Surrounding whitespace (a trailing newline from a terminal client) is
    /// ignored; anything else must match exactly.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| DevSrvError::InvalidIdentifier(String::from_utf8_lossy(raw).into_owned()))?
            .trim();

        let valid = text.len() == DEVICE_ID_LEN
            && text
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'A'..=b'F').contains(&b));
        if !valid {
            return Err(DevSrvError::InvalidIdentifier(text.to_string()));
        }
        Ok(Self(text.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
