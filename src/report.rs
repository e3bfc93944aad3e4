// ABOUTME: Delivery receipt correlation: parse vendor receipt formats and match them to sent tokens
// ABOUTME: Persists the delivery status and optionally republishes it on the inbound queue

use crate::config::{GatewayConfig, ReportDialect, contains};
use crate::datatypes::tlv::{MESSAGE_STATE, RECEIPTED_MESSAGE_ID};
use crate::datatypes::{InboundUnit, delivery_status};
use crate::error::GatewayResult;
use crate::store::{self, InboundToken, QueueStore, SequenceName};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Channel stamped on requeued receipts.
pub const REPORT_CHANNEL: &str = "REPORT";

/// Status stored when a standard receipt carries `err:905` (duplicate submission).
pub const DUPLICATE_SUBMISSION_STATUS: u8 = 51;

const DUPLICATE_SUBMISSION_ERR: u32 = 905;

/// Message type prefix for receipts requeued on bulk channels.
const BULK_PREFIX: &str = "BULK_";

/// Correlation id and delivery status extracted from a receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReceipt {
    pub report_id: String,
    pub status: u8,
}

/// A receipt body that does not have the shape its dialect requires.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReceiptParseError {
    #[error("missing field {0}")]
    MissingField(&'static str),

    #[error("field {field} is not a status byte: {value:?}")]
    InvalidNumber { field: &'static str, value: String },
}

/// Extract `(report_id, status)` from a delivery receipt.
///
/// `Ok(None)` means the receipt lacks the fields its dialect correlates on
/// and is ignored without complaint.
pub fn parse_receipt(
    dialect: ReportDialect,
    parse_body: bool,
    unit: &InboundUnit,
) -> Result<Option<ParsedReceipt>, ReceiptParseError> {
    match dialect {
        ReportDialect::Standard => parse_standard(parse_body, unit),
        ReportDialect::NumericDigits => parse_numeric_digits(&unit.short_message).map(Some),
        ReportDialect::KeyedText => parse_keyed_text(&unit.short_message).map(Some),
    }
}

fn parse_standard(
    parse_body: bool,
    unit: &InboundUnit,
) -> Result<Option<ParsedReceipt>, ReceiptParseError> {
    let (Some(receipted_id), Some(state)) = (unit.tlv(RECEIPTED_MESSAGE_ID), unit.tlv(MESSAGE_STATE))
    else {
        return Ok(None);
    };

    let duplicate = parse_body
        && body_field(&unit.short_message, "err")
            .and_then(|err| err.parse::<u32>().ok())
            == Some(DUPLICATE_SUBMISSION_ERR);

    let status = if duplicate {
        DUPLICATE_SUBMISSION_STATUS
    } else {
        state
            .first_octet()
            .ok_or(ReceiptParseError::MissingField("message_state"))?
    };

    Ok(Some(ParsedReceipt {
        report_id: receipted_id.as_c_string(),
        status,
    }))
}

/// `id:<digits> ... :<status digits> ...`: second and eighth colon fields, digits only.
fn parse_numeric_digits(body: &str) -> Result<ParsedReceipt, ReceiptParseError> {
    let fields: Vec<&str> = body.split(':').collect();
    let id_field = fields.get(1).ok_or(ReceiptParseError::MissingField("id"))?;
    let status_field = fields.get(7).ok_or(ReceiptParseError::MissingField("status"))?;

    let report_id = digits(id_field);
    if report_id.is_empty() {
        return Err(ReceiptParseError::MissingField("id"));
    }
    let status_digits = digits(status_field);
    let status = status_digits
        .parse::<u8>()
        .map_err(|_| ReceiptParseError::InvalidNumber {
            field: "status",
            value: status_digits.clone(),
        })?;

    Ok(ParsedReceipt { report_id, status })
}

/// `id:<id> ... stat:<WORD> ...`
fn parse_keyed_text(body: &str) -> Result<ParsedReceipt, ReceiptParseError> {
    let report_id = body_field(body, "id").ok_or(ReceiptParseError::MissingField("id"))?;
    let stat = body_field(body, "stat").unwrap_or_default();
    Ok(ParsedReceipt {
        report_id: report_id.to_string(),
        status: delivery_status(stat),
    })
}

/// Value of the first space-separated `key:value` token with the given key.
fn body_field<'a>(body: &'a str, key: &str) -> Option<&'a str> {
    body.split(' ')
        .filter_map(|token| token.split_once(':'))
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, value)| value)
}

fn digits(field: &str) -> String {
    field.chars().filter(char::is_ascii_digit).collect()
}

/// Matches receipts to the tokens they report on.
pub struct ReportCorrelator<S> {
    store: Arc<S>,
    config: Arc<GatewayConfig>,
}

impl<S: QueueStore> ReportCorrelator<S> {
    pub fn new(store: Arc<S>, config: Arc<GatewayConfig>) -> Self {
        Self { store, config }
    }

    /// Handle one delivery receipt. Always reports the receipt as handled so a
    /// bad receipt never stalls the session's receive path.
    pub async fn on_receipt(&self, unit: &InboundUnit) -> bool {
        let reports = &self.config.reports;
        if contains(&reports.ignore_destinations, &unit.destination_addr) {
            debug!(destination = %unit.destination_addr, "receipt for ignored destination dropped");
            return true;
        }

        let receipt = match parse_receipt(reports.dialect, reports.parse_body, unit) {
            Ok(Some(receipt)) => receipt,
            Ok(None) => {
                debug!(source = %unit.source_addr, "receipt without correlation fields ignored");
                return true;
            }
            Err(e) => {
                warn!(error = %e, body = %unit.short_message, "malformed delivery receipt dropped");
                return true;
            }
        };

        if let Err(e) = self.apply(unit, &receipt).await {
            error!(report_id = %receipt.report_id, error = %e, "delivery receipt processing failed");
        }
        true
    }

    async fn apply(&self, unit: &InboundUnit, receipt: &ParsedReceipt) -> GatewayResult<()> {
        let Some(general_id) = self.resolve(receipt).await? else {
            warn!(
                report_id = %receipt.report_id,
                status = receipt.status,
                "no report record for receipt, status not stored"
            );
            return Ok(());
        };
        debug!(report_id = %receipt.report_id, general_id, status = receipt.status, "receipt correlated");

        if self.config.reports.wants_requeue(&unit.destination_addr) {
            self.requeue(unit, general_id, receipt.status).await?;
        }
        Ok(())
    }

    /// Store the status, retrying while the sender may not have recorded the id yet.
    async fn resolve(&self, receipt: &ParsedReceipt) -> GatewayResult<Option<i64>> {
        let attempts = self.config.reports.resolve_attempts.max(1);
        for attempt in 1..=attempts {
            let report_id = receipt.report_id.clone();
            let session_name = self.config.session_name.clone();
            let status = receipt.status;
            let resolved = store::blocking(&self.store, move |s| {
                s.update_report(&report_id, &session_name, status)
            })
            .await?;
            if resolved.is_some() {
                return Ok(resolved);
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.reports.resolve_pause()).await;
            }
        }
        Ok(None)
    }

    async fn requeue(&self, unit: &InboundUnit, general_id: i64, status: u8) -> GatewayResult<()> {
        let channel = &self.config.in_queue_channel;
        let mut message_type = unit.destination_addr.clone();
        let mut to_number = unit.destination_addr.clone();

        if contains(&self.config.reports.sender_lookup_channels, channel) {
            match store::blocking(&self.store, move |s| s.original_sender(general_id)).await? {
                Some(sender) => {
                    message_type = sender.clone();
                    to_number = sender;
                }
                None => warn!(general_id, "original sender not found, routing by destination"),
            }
        } else if contains(&self.config.reports.bulk_channels, channel) {
            message_type = format!("{BULK_PREFIX}{message_type}");
        }

        let from_number = unit.source_addr.clone();
        store::blocking(&self.store, move |s| {
            let id = s.next_sequence(SequenceName::Request)?;
            s.enqueue(&InboundToken {
                id,
                message_type,
                channel: REPORT_CHANNEL.to_string(),
                created_at: Utc::now(),
                from_number,
                to_number,
                text: format!("{general_id}\t{status}"),
            })
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Tlv;
    use crate::store::{OutboundToken, SqliteQueueStore, StoreOptions};
    use std::time::Duration;
    use tokio::time::Instant;

    const KEYED: &str = "id:A1B2 sub:001 dlvrd:001 submit date:1603110954 done date:1603110954 stat:DELIVRD err:000 text:hi";
    const NUMERIC: &str = "id:166157226 sub:000 dlvrd:000 submit date:1603110954 done date:1603110954 stat:DELIVRD err:002 text: t";

    fn receipt(body: &str) -> InboundUnit {
        InboundUnit::new("1555", "7000", body).as_delivery_receipt()
    }

    fn standard(id: &[u8], state: u8, body: &str) -> InboundUnit {
        receipt(body)
            .with_tlv(Tlv::new(RECEIPTED_MESSAGE_ID, id.to_vec()))
            .with_tlv(Tlv::new(MESSAGE_STATE, vec![state]))
    }

    fn correlator(config: GatewayConfig) -> (Arc<SqliteQueueStore>, ReportCorrelator<SqliteQueueStore>) {
        let store = Arc::new(SqliteQueueStore::open_in_memory(StoreOptions::default()).unwrap());
        let correlator = ReportCorrelator::new(store.clone(), Arc::new(config));
        (store, correlator)
    }

    #[test]
    fn standard_receipt_uses_tlvs() {
        let unit = standard(b"0A1B\0", 2, "");
        assert_eq!(
            parse_receipt(ReportDialect::Standard, false, &unit).unwrap(),
            Some(ParsedReceipt {
                report_id: "0A1B".into(),
                status: 2
            })
        );
    }

    #[test]
    fn standard_receipt_without_tlvs_is_ignored() {
        let unit = receipt(KEYED).with_tlv(Tlv::new(RECEIPTED_MESSAGE_ID, &b"x"[..]));
        assert_eq!(parse_receipt(ReportDialect::Standard, true, &unit).unwrap(), None);
    }

    #[test]
    fn duplicate_submission_error_overrides_state() {
        let body = "id:65799398 sub:001 dlvrd:001 submit date:1612011338 done date:1612011338 stat:UNDELIV err:905 Text:x";
        let unit = standard(b"65799398", 5, body);

        let parsed = parse_receipt(ReportDialect::Standard, true, &unit).unwrap().unwrap();
        assert_eq!(parsed.status, DUPLICATE_SUBMISSION_STATUS);

        // Body is only consulted when asked to.
        let parsed = parse_receipt(ReportDialect::Standard, false, &unit).unwrap().unwrap();
        assert_eq!(parsed.status, 5);
    }

    #[test]
    fn numeric_digits_dialect() {
        let parsed = parse_receipt(ReportDialect::NumericDigits, false, &receipt(NUMERIC))
            .unwrap()
            .unwrap();
        assert_eq!(parsed.report_id, "166157226");
        assert_eq!(parsed.status, 2);
    }

    #[test]
    fn numeric_digits_dialect_rejects_short_bodies() {
        assert_eq!(
            parse_receipt(ReportDialect::NumericDigits, false, &receipt("id:1 sub:2")),
            Err(ReceiptParseError::MissingField("status"))
        );
        assert!(matches!(
            parse_receipt(ReportDialect::NumericDigits, false, &receipt("id:1:2:3:4:5:6:999")),
            Err(ReceiptParseError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn keyed_text_dialect_maps_stat_words() {
        let parsed = parse_receipt(ReportDialect::KeyedText, false, &receipt(KEYED))
            .unwrap()
            .unwrap();
        assert_eq!(parsed, ParsedReceipt { report_id: "A1B2".into(), status: 2 });

        let unknown = receipt("id:Z9 stat:UNKNOWN");
        let parsed = parse_receipt(ReportDialect::KeyedText, false, &unknown).unwrap().unwrap();
        assert_eq!(parsed.status, 0);

        assert_eq!(
            parse_receipt(ReportDialect::KeyedText, false, &receipt("stat:DELIVRD")),
            Err(ReceiptParseError::MissingField("id"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn resolution_retries_until_record_appears() {
        let mut config = GatewayConfig::default();
        config.reports.dialect = ReportDialect::KeyedText;
        let (store, correlator) = correlator(config);

        let writer = tokio::spawn({
            let store = store.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(150)).await;
                store.insert_report("A1B2", "smsc", 42).unwrap();
            }
        });

        let started = Instant::now();
        assert!(correlator.on_receipt(&receipt(KEYED)).await);
        writer.await.unwrap();

        // Third attempt, after two pauses.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(300));
        let record = store.report("A1B2", "smsc").unwrap().unwrap();
        assert_eq!((record.general_id, record.status), (42, Some(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn unresolved_receipt_gives_up_after_configured_attempts() {
        let mut config = GatewayConfig::default();
        config.reports.dialect = ReportDialect::KeyedText;
        config.reports.requeue_all = true;
        let (store, correlator) = correlator(config);

        let started = Instant::now();
        assert!(correlator.on_receipt(&receipt(KEYED)).await);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(400) && elapsed < Duration::from_millis(500));
        assert_eq!(store.report_count().unwrap(), 0);
        assert!(store.inbound_queue().unwrap().is_empty());
    }

    #[tokio::test]
    async fn resolved_receipt_is_requeued_for_listed_destination() {
        let mut config = GatewayConfig::default();
        config.reports.dialect = ReportDialect::KeyedText;
        config.reports.requeue_destinations = vec!["7000".into()];
        let (store, correlator) = correlator(config);
        store.insert_report("A1B2", "smsc", 42).unwrap();

        assert!(correlator.on_receipt(&receipt(KEYED)).await);
        let queued = store.inbound_queue().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].message_type, "7000");
        assert_eq!(queued[0].channel, REPORT_CHANNEL);
        assert_eq!(queued[0].from_number, "1555");
        assert_eq!(queued[0].to_number, "7000");
        assert_eq!(queued[0].text, "42\t2");
    }

    #[tokio::test]
    async fn bulk_channel_prefixes_message_type() {
        let mut config = GatewayConfig::default();
        config.reports.dialect = ReportDialect::KeyedText;
        config.reports.requeue_all = true;
        config.in_queue_channel = "SMS-ATL-BULK".into();
        let (store, correlator) = correlator(config);
        store.insert_report("A1B2", "smsc", 42).unwrap();

        correlator.on_receipt(&receipt(KEYED)).await;
        assert_eq!(store.inbound_queue().unwrap()[0].message_type, "BULK_7000");
    }

    #[tokio::test]
    async fn sender_lookup_channel_routes_to_original_sender() {
        let mut config = GatewayConfig::default();
        config.reports.dialect = ReportDialect::KeyedText;
        config.reports.requeue_all = true;
        config.in_queue_channel = "GMS-SMS".into();
        let (store, correlator) = correlator(config);
        store
            .push_outbound(&OutboundToken::text(42, "SMS", "3030", "1555", "hi"))
            .unwrap();
        store.insert_report("A1B2", "smsc", 42).unwrap();

        correlator.on_receipt(&receipt(KEYED)).await;
        let queued = &store.inbound_queue().unwrap()[0];
        assert_eq!(queued.message_type, "3030");
        assert_eq!(queued.to_number, "3030");
    }

    #[tokio::test]
    async fn ignored_destination_is_dropped() {
        let mut config = GatewayConfig::default();
        config.reports.dialect = ReportDialect::KeyedText;
        config.reports.ignore_destinations = vec!["7000".into()];
        let (store, correlator) = correlator(config);
        store.insert_report("A1B2", "smsc", 42).unwrap();

        assert!(correlator.on_receipt(&receipt(KEYED)).await);
        assert_eq!(store.report("A1B2", "smsc").unwrap().unwrap().status, None);
    }

    #[tokio::test]
    async fn malformed_receipt_is_still_handled() {
        let mut config = GatewayConfig::default();
        config.reports.dialect = ReportDialect::NumericDigits;
        let (_store, correlator) = correlator(config);
        assert!(correlator.on_receipt(&receipt("garbage")).await);
    }
}
