//! Rows owned by the queue store.

use chrono::{DateTime, Utc};

/// A queued outbound message produced upstream and leased by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundToken {
    /// Queue row identity; also the general id reports point back to.
    pub id: i64,
    pub request_id: i64,
    /// Routing class used by the lease filter and dequeue completion.
    pub message_type: String,
    pub channel: String,
    pub created_at: DateTime<Utc>,
    pub from_number: String,
    pub to_number: String,
    /// GSM/ASCII text when `data_coding == 0`, base64 payload otherwise.
    pub text: String,
    pub data_coding: u8,
    pub udhi: bool,
}

impl OutboundToken {
    /// A default-alphabet text message with no UDH.
    pub fn text(
        id: i64,
        message_type: impl Into<String>,
        from_number: impl Into<String>,
        to_number: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            request_id: id,
            message_type: message_type.into(),
            channel: String::new(),
            created_at: Utc::now(),
            from_number: from_number.into(),
            to_number: to_number.into(),
            text: text.into(),
            data_coding: 0,
            udhi: false,
        }
    }
}

/// A received message (or requeued receipt) written to the inbound queue.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundToken {
    pub id: i64,
    pub message_type: String,
    pub channel: String,
    pub created_at: DateTime<Utc>,
    pub from_number: String,
    pub to_number: String,
    pub text: String,
}

/// Correlation between an SMSC message id and the outbound token it was sent for.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportRecord {
    pub report_id: String,
    pub session_name: String,
    pub general_id: i64,
    pub status: Option<u8>,
    pub status_at: Option<DateTime<Utc>>,
}

/// Last observed connectivity of one endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStatusRecord {
    pub field_name: String,
    pub status: String,
    pub is_down: bool,
    pub updated_at: DateTime<Utc>,
}

/// One row of the outbound send log.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundLogRow {
    pub id: i64,
    pub token_id: i64,
    pub logged_at: DateTime<Utc>,
    pub result_code: i64,
}

/// One row of the raw inbound receipt log.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundLogRow {
    pub id: i64,
    pub received_at: DateTime<Utc>,
    pub from_number: String,
    pub to_number: String,
    pub text: String,
}

/// Lease state of an outbound queue row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Pending,
    Leased,
    Done,
}

impl LeaseState {
    pub fn as_str(self) -> &'static str {
        match self {
            LeaseState::Pending => "pending",
            LeaseState::Leased => "leased",
            LeaseState::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(LeaseState::Pending),
            "leased" => Some(LeaseState::Leased),
            "done" => Some(LeaseState::Done),
            _ => None,
        }
    }
}

/// Named monotonic counters, each living in its own logical database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SequenceName {
    /// Inbound request ids, kept in the inbound database.
    Request,
    /// Outbound log ids, kept in the outbound database.
    OutSms,
}

impl SequenceName {
    pub fn as_str(self) -> &'static str {
        match self {
            SequenceName::Request => "request",
            SequenceName::OutSms => "out_sms",
        }
    }
}
