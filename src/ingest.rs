// ABOUTME: Inbound pipeline for mobile originated messages: normalise, sequence, route, enqueue, log
// ABOUTME: Side-effect failures go to a failure sink and never reject the unit

use crate::config::{GatewayConfig, contains};
use crate::datatypes::InboundUnit;
use crate::error::GatewayError;
use crate::store::{InboundToken, QueueStore, SequenceName};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

/// A transliteration that could not be applied.
#[derive(Error, Debug)]
#[error("Transliteration failed: {0}")]
pub struct TransliterationError(pub String);

/// Text normalisation applied to received messages.
pub trait Transliterator: Send + Sync + 'static {
    fn transliterate(&self, text: &str) -> Result<String, TransliterationError>;
}

/// Leaves text unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTransliterator;

impl Transliterator for IdentityTransliterator {
    fn transliterate(&self, text: &str) -> Result<String, TransliterationError> {
        Ok(text.to_string())
    }
}

/// Receives side-effect failures of the inbound path.
pub trait FailureSink: Send + Sync + 'static {
    /// `text` is the message text of the unit being processed.
    fn failed(&self, text: &str, error: &GatewayError);
}

/// Reports failures as `error!` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingFailureSink;

impl FailureSink for TracingFailureSink {
    fn failed(&self, text: &str, error: &GatewayError) {
        error!(text, error = %error, "inbound processing step failed");
    }
}

/// Turns received units into inbound queue tokens.
pub struct IngestPipeline<S> {
    store: Arc<S>,
    config: Arc<GatewayConfig>,
    transliterator: Arc<dyn Transliterator>,
    failures: Arc<dyn FailureSink>,
}

impl<S: QueueStore> IngestPipeline<S> {
    pub fn new(store: Arc<S>, config: Arc<GatewayConfig>) -> Self {
        Self {
            store,
            config,
            transliterator: Arc::new(IdentityTransliterator),
            failures: Arc::new(TracingFailureSink),
        }
    }

    pub fn with_transliterator(mut self, transliterator: Arc<dyn Transliterator>) -> Self {
        self.transliterator = transliterator;
        self
    }

    pub fn with_failure_sink(mut self, failures: Arc<dyn FailureSink>) -> Self {
        self.failures = failures;
        self
    }

    /// Ingest one mobile originated unit.
    ///
    /// Returns `false` only when no request id could be assigned.
    pub fn on_unit(&self, unit: &InboundUnit) -> bool {
        let inbound = &self.config.inbound;
        let destination = unit.destination_addr.as_str();

        let text = if contains(&inbound.no_transliterate, destination) {
            unit.short_message.clone()
        } else {
            match self.transliterator.transliterate(&unit.short_message) {
                Ok(text) => text,
                Err(e) => {
                    warn!(destination, error = %e, "transliteration failed, keeping original text");
                    unit.short_message.clone()
                }
            }
        };

        let id = match self.store.next_sequence(SequenceName::Request) {
            Ok(id) => id,
            Err(e) => {
                self.failures.failed(&text, &GatewayError::from(e));
                return false;
            }
        };

        let to_number = route(destination, unit.data_coding, &inbound.tag_coding_scheme);
        let now = Utc::now();

        if contains(&inbound.ignore, &to_number) {
            debug!(id, to_number = %to_number, "inbound unit on ignore list, not enqueued");
        } else {
            let token = InboundToken {
                id,
                message_type: format!("{}{}", inbound.message_type_prefix, destination),
                channel: self.config.in_queue_channel.clone(),
                created_at: now,
                from_number: unit.source_addr.clone(),
                to_number,
                text: text.clone(),
            };
            match self.store.enqueue(&token) {
                Ok(()) => debug!(id, message_type = %token.message_type, "inbound unit enqueued"),
                Err(e) => self.failures.failed(&text, &GatewayError::from(e)),
            }
        }

        if let Err(e) = self
            .store
            .log_inbound(id, now, &unit.source_addr, destination, &text)
        {
            self.failures.failed(&text, &GatewayError::from(e));
        }

        if let Some(service) = inbound.affiliates.get(destination) {
            if let Err(e) = self.store.log_affiliate(id, service) {
                self.failures.failed(&text, &GatewayError::from(e));
            }
        }

        true
    }
}

/// Routed number for a destination: `&` + two hex digits of the data coding
/// in front of listed destinations when the coding is not the default.
fn route(destination: &str, data_coding: u8, tagged: &[String]) -> String {
    if data_coding != 0 && contains(tagged, destination) {
        format!("&{data_coding:02X}{destination}")
    } else {
        destination.to_string()
    }
}
