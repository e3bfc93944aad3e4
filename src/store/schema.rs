//! Table layouts for the three logical databases.

/// Inbound database: request sequence, inbound queue, receipt and affiliate logs, reports.
pub(crate) const INBOUND: &str = "
CREATE TABLE IF NOT EXISTS sequences (
    name  TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS inbound_queue (
    id           INTEGER PRIMARY KEY,
    message_type TEXT NOT NULL,
    channel      TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    from_number  TEXT NOT NULL,
    to_number    TEXT NOT NULL,
    text         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS inbound_log (
    id          INTEGER NOT NULL,
    received_at TEXT NOT NULL,
    from_number TEXT NOT NULL,
    to_number   TEXT NOT NULL,
    text        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS affiliate_log (
    request_id INTEGER NOT NULL,
    service    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS outgoing_reports (
    report_id    TEXT NOT NULL,
    session_name TEXT NOT NULL,
    general_id   INTEGER NOT NULL,
    status       INTEGER,
    status_at    TEXT,
    PRIMARY KEY (report_id, session_name)
);
";

/// Outbound database: out_sms sequence, outbound queue with lease columns, send log.
pub(crate) const OUTBOUND: &str = "
CREATE TABLE IF NOT EXISTS sequences (
    name  TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS outbound_queue (
    id            INTEGER PRIMARY KEY,
    request_id    INTEGER NOT NULL,
    message_type  TEXT NOT NULL,
    channel       TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    from_number   TEXT NOT NULL,
    to_number     TEXT NOT NULL,
    text          TEXT NOT NULL,
    coding_scheme INTEGER NOT NULL DEFAULT 0,
    udhi          INTEGER NOT NULL DEFAULT 0,
    lease_state   TEXT NOT NULL DEFAULT 'pending',
    leased_at     TEXT
);

CREATE INDEX IF NOT EXISTS idx_outbound_queue_lease
    ON outbound_queue (lease_state, message_type, id);

CREATE TABLE IF NOT EXISTS outbound_log (
    id          INTEGER PRIMARY KEY,
    token_id    INTEGER NOT NULL,
    logged_at   TEXT NOT NULL,
    result_code INTEGER NOT NULL
);
";

/// Status database: one row per configured endpoint field.
pub(crate) const STATUS: &str = "
CREATE TABLE IF NOT EXISTS connection_status (
    field_name TEXT PRIMARY KEY,
    status     TEXT NOT NULL,
    is_down    INTEGER NOT NULL,
    updated_at TEXT NOT NULL
);
";
