//! Unsolicited device reports
//!
//! A report is acknowledged before its effect is applied, and produces at
//! most one state write and exactly one acknowledgement frame.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{error, info, warn};

use crate::link::{DeviceLink, LinkError};
use crate::protocol::frame::to_hex;
use crate::protocol::{Report, ReportAck, Request};
use crate::store::{DeviceStore, DeviceUpdate, DOSAGE_EMPTY};

/// What a handled report asks of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Bad checksum or wrong type; an error ack was sent
    Rejected(ReportAck),
    /// Acknowledged and applied
    Handled(Report),
    /// Acknowledged; the potion level must be re-read
    RefreshPotion,
}

/// State write implied by a report, if any
pub fn report_update(report: Report) -> Option<DeviceUpdate> {
    match report {
        Report::KeyPress(0) => Some(DeviceUpdate::Power(0)),
        Report::KeyPress(key) => Some(DeviceUpdate::Power(2 * i32::from(key))),
        Report::PotionEmpty => Some(DeviceUpdate::Dosage(DOSAGE_EMPTY)),
        Report::PotionReadError | Report::PotionReplaced | Report::Unknown(_) => None,
    }
}

/// Validate, acknowledge and apply one report
///
/// Only the ack write can fail the call; a failed state write is logged.
pub async fn handle_report<S>(
    link: &mut DeviceLink<S>,
    store: &dyn DeviceStore,
    bytes: &[u8],
) -> Result<ReportOutcome, LinkError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mac = link.mac().to_string();
    let report = match Report::parse(bytes) {
        Ok(report) => report,
        Err(ack) => {
            warn!("{} rejected report {} ({:?})", mac, to_hex(bytes), ack);
            link.send(&Request::report_ack(ack)).await?;
            return Ok(ReportOutcome::Rejected(ack));
        },
    };

    link.send(&Request::report_ack(ReportAck::Ok)).await?;

    match report {
        Report::PotionReadError => warn!("{} potion level read error", mac),
        Report::KeyPress(key) => info!("{} key {} pressed", mac, key),
        Report::PotionEmpty => info!("{} potion empty", mac),
        Report::PotionReplaced => {
            info!("{} potion replaced", mac);
            return Ok(ReportOutcome::RefreshPotion);
        },
        Report::Unknown(subtype) => warn!("{} unknown report subtype {}", mac, subtype),
    }

    if let Some(update) = report_update(report) {
        if let Err(e) = store.apply(&mac, update).await {
            error!("{} report update failed: {:#}", mac, e);
        }
    }
    Ok(ReportOutcome::Handled(report))
}
