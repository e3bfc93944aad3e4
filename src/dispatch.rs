// ABOUTME: Outbound drain cycle: lease tokens, encode and segment text, submit units, log outcomes
// ABOUTME: Also records the SMSC message ids that later delivery receipts are correlated against

use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::gsm;
use crate::session::{SmppError, SmscSession, SubmitUnit};
use crate::store::{self, OutboundToken, QueueStore, SequenceName, StoreError};
use crate::datatypes::CommandStatus;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

/// Result code logged for tokens rejected before anything was sent.
pub const LOCAL_FAILURE_CODE: i64 = -100500;

/// Largest default-alphabet payload per unit, in octets.
pub const MAX_TEXT_UNIT: usize = 160;

/// Largest 8-bit/binary payload per unit, in octets.
pub const MAX_BINARY_UNIT: usize = 140;

/// What one drain cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Tokens leased from the store.
    pub leased: usize,
    /// Tokens whose units were all sent and that were marked complete.
    pub completed: usize,
    /// Tokens completed with the local failure code and nothing sent.
    pub rejected: usize,
    /// Tokens left leased after a transport failure.
    pub abandoned: usize,
    /// Units handed to the session.
    pub units_sent: usize,
}

enum TokenOutcome {
    Sent { units: usize },
    Rejected,
}

/// Drains the outbound queue through a session.
pub struct Dispatcher<S, C> {
    store: Arc<S>,
    session: Arc<C>,
    config: Arc<GatewayConfig>,
}

impl<S, C> Dispatcher<S, C>
where
    S: QueueStore,
    C: SmscSession,
{
    pub fn new(store: Arc<S>, session: Arc<C>, config: Arc<GatewayConfig>) -> Self {
        Self {
            store,
            session,
            config,
        }
    }

    /// Run one drain cycle.
    ///
    /// Leases at most `messages_per_cycle` tokens and stops early once the
    /// store has nothing left. A transport failure abandons the current token
    /// and moves on; any other failure ends the cycle with an error.
    pub async fn drain(&self) -> GatewayResult<DrainSummary> {
        let mut summary = DrainSummary::default();

        while summary.leased < self.config.dispatch.messages_per_cycle {
            let Some(token) = store::blocking(&self.store, |s| s.dequeue_start()).await? else {
                break;
            };
            summary.leased += 1;

            match self.process(&token).await {
                Ok(outcome) => {
                    let (message_type, id) = (token.message_type.clone(), token.id);
                    store::blocking(&self.store, move |s| s.dequeue_end(&message_type, id)).await?;
                    match outcome {
                        TokenOutcome::Sent { units } => {
                            summary.completed += 1;
                            summary.units_sent += units;
                        }
                        TokenOutcome::Rejected => summary.rejected += 1,
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(token_id = token.id, error = %e, "send failed, token left for redelivery");
                    summary.abandoned += 1;
                }
                Err(e) => return Err(e),
            }
        }

        if summary.leased > 0 {
            debug!(
                leased = summary.leased,
                completed = summary.completed,
                rejected = summary.rejected,
                abandoned = summary.abandoned,
                units = summary.units_sent,
                "drain cycle finished"
            );
        }
        Ok(summary)
    }

    async fn process(&self, token: &OutboundToken) -> GatewayResult<TokenOutcome> {
        if token.to_number.is_empty() {
            self.reject(token, "empty destination").await?;
            return Ok(TokenOutcome::Rejected);
        }

        let payload = match self.user_data(token) {
            Ok(payload) => payload,
            Err(GatewayError::InvalidPayload(reason)) => {
                self.reject(token, &reason).await?;
                return Ok(TokenOutcome::Rejected);
            }
            Err(e) => return Err(e),
        };

        let max = if token.data_coding == 0 {
            MAX_TEXT_UNIT
        } else {
            MAX_BINARY_UNIT
        };
        let request_report = self.config.reports.wants_report(&token.from_number);

        let units = segment(&payload, max, self.config.dispatch.long_sms);
        let count = units.len();
        for chunk in units {
            self.send_unit(token, chunk, request_report).await?;
        }
        Ok(TokenOutcome::Sent { units: count })
    }

    fn user_data(&self, token: &OutboundToken) -> GatewayResult<Bytes> {
        if token.data_coding == 0 {
            let encoded = if self.config.dispatch.use_gsm_encoding {
                gsm::encode(&token.text)
            } else {
                gsm::encode_ascii(&token.text)
            };
            return Ok(Bytes::from(encoded));
        }

        STANDARD
            .decode(token.text.trim())
            .map(Bytes::from)
            .map_err(|e| GatewayError::InvalidPayload(format!("base64 payload: {e}")))
    }

    async fn send_unit(
        &self,
        token: &OutboundToken,
        payload: Bytes,
        request_report: bool,
    ) -> GatewayResult<()> {
        let unit = SubmitUnit {
            source_addr: token.from_number.clone(),
            destination_addr: token.to_number.clone(),
            data_coding: token.data_coding,
            payload,
            validity: None,
            udhi: token.udhi,
            response_timeout: self.config.session.response_timeout(),
            request_report,
        };

        let status = match self.session.submit(unit).await {
            Ok(outcome) => {
                if outcome.status.is_ok() && request_report && !outcome.message_id.is_empty() {
                    self.record_report(&outcome.message_id, token.id).await?;
                }
                outcome.status
            }
            Err(SmppError::Protocol(status)) => status,
            Err(e) => return Err(e.into()),
        };

        let seq = self.log(token.id, status.result_code()).await?;
        debug!(token_id = token.id, seq, status = ?status, "unit logged");
        Ok(())
    }

    /// Point `message_id` at `token_id`, reusing the record if the SMSC recycled the id.
    async fn record_report(&self, message_id: &str, token_id: i64) -> GatewayResult<()> {
        let message_id = message_id.to_string();
        let session_name = self.config.session_name.clone();

        store::blocking(&self.store, move |s| {
            if s.report_exists(&message_id, &session_name)? {
                debug!(report_id = %message_id, token_id, "message id reused, reassigning report");
                return s.reassign_report(&message_id, &session_name, token_id);
            }

            match s.insert_report(&message_id, &session_name, token_id) {
                Err(StoreError::DuplicateKey(key)) => {
                    warn!(report_id = %message_id, token_id, key = %key, "report already recorded");
                    Ok(())
                }
                other => other,
            }
        })
        .await?;
        Ok(())
    }

    /// Append one outbound log row and return its sequence number.
    async fn log(&self, token_id: i64, result_code: i64) -> GatewayResult<i64> {
        let seq = store::blocking(&self.store, move |s| {
            let seq = s.next_sequence(SequenceName::OutSms)?;
            s.log_outbound(seq, token_id, Utc::now(), result_code)?;
            Ok(seq)
        })
        .await?;
        Ok(seq)
    }

    async fn reject(&self, token: &OutboundToken, reason: &str) -> GatewayResult<()> {
        warn!(token_id = token.id, reason, "outbound token rejected");
        self.log(token.id, LOCAL_FAILURE_CODE).await?;
        Ok(())
    }
}

/// Split `payload` into consecutive units of at most `max` octets.
///
/// Always yields at least one unit, so an empty payload is still sent and
/// logged. In long mode the whole payload is one unit and the session does
/// any further segmentation.
pub fn segment(payload: &Bytes, max: usize, long_sms: bool) -> Vec<Bytes> {
    if long_sms || payload.is_empty() {
        return vec![payload.clone()];
    }
    let max = max.max(1);
    (0..payload.len())
        .step_by(max)
        .map(|start| payload.slice(start..(start + max).min(payload.len())))
        .collect()
}
