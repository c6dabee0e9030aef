//! Response payload and report decoding
//!
//! Payload slices passed in here are the bytes between the type byte and the
//! checksum, already checksum-verified by the caller.

use super::frame::{frame_type, FrameView, REPORT_LEN};
use super::ReportAck;

/// Cartridge lifetime in seconds (150 minutes)
pub const POTION_TOTAL_SECONDS: u32 = 150 * 60;

/// Status byte shared by heater and potion responses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Ok,
    /// The device saw a bad checksum on our command
    ChecksumError,
    CartridgeRemoved,
    CartridgeEmpty,
    CartridgeReadError,
    Unknown(u8),
}

impl From<u8> for DeviceStatus {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Ok,
            1 => Self::ChecksumError,
            2 => Self::CartridgeRemoved,
            3 => Self::CartridgeEmpty,
            4 => Self::CartridgeReadError,
            other => Self::Unknown(other),
        }
    }
}

impl DeviceStatus {
    pub fn describe(&self) -> String {
        match self {
            Self::Ok => "ok".to_string(),
            Self::ChecksumError => "device reported command checksum error".to_string(),
            Self::CartridgeRemoved => "potion cartridge removed".to_string(),
            Self::CartridgeEmpty => "potion cartridge empty".to_string(),
            Self::CartridgeReadError => "potion level read error".to_string(),
            Self::Unknown(code) => format!("unknown device status {}", code),
        }
    }
}

/// Decoded heater response: `[status, switch, expected, elapsed]`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaterState {
    pub status: DeviceStatus,
    pub switched_on: bool,
    pub expected_duration: u8,
    pub elapsed_duration: u8,
}

impl HeaterState {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match *payload {
            [status, switch, expected, elapsed, ..] => Some(Self {
                status: status.into(),
                switched_on: switch != 0,
                expected_duration: expected,
                elapsed_duration: elapsed,
            }),
            _ => None,
        }
    }

    /// Power level the device is running at, per the status-check rule
    pub fn power(&self) -> i32 {
        if self.switched_on {
            i32::from(self.expected_duration)
        } else {
            0
        }
    }
}

/// Decoded climate response
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClimateReading {
    Ok { temperature: f64, humidity: f64 },
    SensorFault,
    ChecksumError,
    Unknown(u8),
}

/// Temperature sentinel stored when the sensor is faulty
pub const TEMPERATURE_FAULT: f64 = -273.0;

/// Humidity sentinel stored when the sensor is faulty
pub const HUMIDITY_FAULT: f64 = 0.0;

impl ClimateReading {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match *payload {
            [0, temp_high, temp_low, hum_high, hum_low, ..] => Some(Self::Ok {
                temperature: temperature_from_bytes(temp_high, temp_low),
                humidity: f64::from(u16::from_be_bytes([hum_high, hum_low])) / 10.0,
            }),
            [1, ..] => Some(Self::SensorFault),
            [2, ..] => Some(Self::ChecksumError),
            [other, ..] => Some(Self::Unknown(other)),
            [] => None,
        }
    }
}

/// Sign-magnitude tenths of a degree: top bit of `high` is the sign
pub fn temperature_from_bytes(high: u8, low: u8) -> f64 {
    let magnitude = f64::from(u16::from(high & 0x7F) * 256 + u16::from(low)) / 10.0;
    if high & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Decoded potion-level response
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PotionReading {
    /// Remaining fraction, rounded to two decimals
    Level(f64),
    Status(DeviceStatus),
}

impl PotionReading {
    pub fn parse(payload: &[u8]) -> Option<Self> {
        match *payload {
            [0, minutes, seconds, ..] => Some(Self::Level(potion_remaining(minutes, seconds))),
            [0, ..] => None,
            [status, ..] => Some(Self::Status(status.into())),
            [] => None,
        }
    }
}

/// Remaining fraction from consumed `minutes:seconds`, rounded to 2 places
///
/// Rounds the stored binary value, so `0.995` (really `0.99499..`) becomes
/// `0.99`. Scaling by 100 first would push it up to `1.0`.
pub fn potion_remaining(minutes: u8, seconds: u8) -> f64 {
    let total = f64::from(POTION_TOTAL_SECONDS);
    let consumed = f64::from(u32::from(minutes) * 60 + u32::from(seconds));
    let remain = ((total - consumed) / total).max(0.0);
    format!("{remain:.2}").parse().unwrap_or(remain)
}

/// Unsolicited device report, subtype byte 3 and data byte 4
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    /// Potion level could not be read (loose contact)
    PotionReadError,
    /// Physical key pressed; key 0 means off
    KeyPress(u8),
    PotionEmpty,
    PotionReplaced,
    Unknown(u8),
}

impl Report {
    /// Validate the 6-byte report window and decode it
    ///
    /// The error value is the acknowledgement to send instead of `Ok`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ReportAck> {
        let view = FrameView::new(bytes);
        if !view.is_valid(REPORT_LEN) {
            return Err(ReportAck::ChecksumError);
        }
        if view.frame_type() != Some(frame_type::REPORT) {
            return Err(ReportAck::TypeError);
        }
        let (subtype, data) = (bytes[3], bytes[4]);
        Ok(match subtype {
            1 => Self::PotionReadError,
            2 => Self::KeyPress(data),
            3 => Self::PotionEmpty,
            4 => Self::PotionReplaced,
            other => Self::Unknown(other),
        })
    }
}
