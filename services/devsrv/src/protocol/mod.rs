//! Device wire protocol
//!
//! - `frame`: checksum codec and buffer views
//! - `handshake`: the device identifier a connection opens with
//! - `response`: decoding of response payloads and unsolicited reports
//! - [`Request`]: the fixed set of server-to-device frames

pub mod frame;
pub mod handshake;
pub mod response;

use bytes::Bytes;

pub use frame::{encode, frame_type, verify_checksum, FrameView, REPORT_LEN};
pub use handshake::DeviceId;
pub use response::{
    potion_remaining, temperature_from_bytes, ClimateReading, DeviceStatus, HeaterState,
    PotionReading, Report,
};

/// Valid heater-on durations
pub const HEATER_DURATION_RANGE: std::ops::RangeInclusive<u8> = 1..=8;

/// Shape of the response a request waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expect {
    /// Total response length including header and checksum
    pub len: usize,
    /// Type byte the response must carry
    pub frame_type: u8,
}

/// Acknowledgement sent back for an unsolicited report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportAck {
    Ok = 0,
    TypeError = 1,
    ChecksumError = 2,
}

/// A server-to-device frame together with the response it expects
#[derive(Debug, Clone)]
pub struct Request {
    name: &'static str,
    frame: Bytes,
    expect: Option<Expect>,
}

impl Request {
    fn new(name: &'static str, frame_type: u8, payload: &[u8], expect: Option<Expect>) -> Self {
        Self {
            name,
            frame: encode(frame_type, payload),
            expect,
        }
    }

    fn link(name: &'static str, payload: &[u8]) -> Self {
        Self::new(
            name,
            frame_type::LINK,
            payload,
            Some(Expect {
                len: 5,
                frame_type: frame_type::LINK,
            }),
        )
    }

    fn heater(name: &'static str, payload: &[u8]) -> Self {
        Self::new(
            name,
            frame_type::HEATER,
            payload,
            Some(Expect {
                len: 8,
                frame_type: frame_type::HEATER,
            }),
        )
    }

    /// Welcome signal for a newly seen device (`F5AA010001`)
    pub fn link_test() -> Self {
        Self::link("link test", &[0x00, 0x01])
    }

    /// `F5AA010000`
    pub fn heartbeat() -> Self {
        Self::link("heartbeat", &[0x00, 0x00])
    }

    /// `F5AA030000`
    pub fn status_check() -> Self {
        Self::heater("status check", &[0x00, 0x00])
    }

    /// `F5AA0301<dd>`; the caller validates `duration` first
    pub fn heater_on(duration: u8) -> Self {
        Self::heater("heater on", &[0x01, duration])
    }

    /// `F5AA030100`
    pub fn heater_off() -> Self {
        Self::heater("heater off", &[0x01, 0x00])
    }

    /// `F5AA04`
    pub fn read_climate() -> Self {
        Self::new(
            "climate read",
            frame_type::CLIMATE,
            &[],
            Some(Expect {
                len: 9,
                frame_type: frame_type::CLIMATE,
            }),
        )
    }

    /// `F5AA07`
    pub fn read_potion() -> Self {
        Self::new(
            "potion read",
            frame_type::POTION,
            &[],
            Some(Expect {
                len: 7,
                frame_type: frame_type::POTION,
            }),
        )
    }

    /// `F5AA080x`, fire-and-forget
    pub fn report_ack(ack: ReportAck) -> Self {
        Self::new("report ack", frame_type::REPORT, &[ack as u8], None)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Encoded bytes, checksum included
    pub fn frame(&self) -> &Bytes {
        &self.frame
    }

    pub fn expect(&self) -> Option<Expect> {
        self.expect
    }
}
