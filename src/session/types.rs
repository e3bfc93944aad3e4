// ABOUTME: Value types exchanged with the SMPP session: outbound units, submit outcomes, events
// ABOUTME: Keeps the dispatch core independent of PDU layouts while carrying everything submit_sm needs

use crate::datatypes::{CommandStatus, InboundUnit};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::oneshot;

/// One wire-level submit_sm worth of user data.
///
/// A long message becomes several of these, sent in order.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitUnit {
    /// Source phone number
    pub source_addr: String,
    /// Destination phone number
    pub destination_addr: String,
    /// Data coding scheme (0 = SMSC default alphabet)
    pub data_coding: u8,
    /// Encoded user data, at most one segment long
    pub payload: Bytes,
    /// Absolute validity period, `None` for the SMSC default
    pub validity: Option<DateTime<Utc>>,
    /// User data header indicator for esm_class
    pub udhi: bool,
    /// How long to wait for the submit_sm_resp
    pub response_timeout: Duration,
    /// Ask the SMSC for a delivery receipt (registered_delivery = 1)
    pub request_report: bool,
}

/// Response to a [`SubmitUnit`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    /// command_status of the submit_sm_resp
    pub status: CommandStatus,
    /// SMSC message id, empty when none was returned
    pub message_id: String,
}

impl SubmitOutcome {
    pub fn accepted(message_id: impl Into<String>) -> Self {
        Self {
            status: CommandStatus::Ok,
            message_id: message_id.into(),
        }
    }

    pub fn rejected(status: CommandStatus) -> Self {
        Self {
            status,
            message_id: String::new(),
        }
    }
}

/// Connectivity of one configured SMSC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointState {
    /// Endpoint address as configured, e.g. `10.0.0.5:2775`
    pub address: String,
    /// True while the endpoint is connected and bound
    pub connected: bool,
    /// Last command_status or reason reported for this endpoint
    pub last_command_status: String,
}

/// Notification published by a running session.
#[derive(Debug)]
pub enum SessionEvent {
    /// A deliver_sm arrived. When `handled` is present the session waits for
    /// the core's verdict before acknowledging the PDU.
    Unit {
        unit: InboundUnit,
        handled: Option<oneshot::Sender<bool>>,
    },
    /// An endpoint finished binding.
    Connected { endpoint: String },
    /// An endpoint was lost.
    Disconnected { reason: String, endpoint: String },
}
