//! SQLite-backed queue store.

use crate::store::error::{StoreError, StoreResult};
use crate::store::schema;
use crate::store::types::{
    ConnectionStatusRecord, InboundLogRow, InboundToken, LeaseState, OutboundLogRow,
    OutboundToken, ReportRecord, SequenceName,
};
use crate::store::QueueStore;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

/// Longest status text persisted for an endpoint.
const STATUS_TEXT_LIMIT: usize = 128;

/// Pause between attempts when a status write loses to another writer.
const STATUS_RETRY_PAUSE: Duration = Duration::from_millis(50);

/// Database files for the three logical connections.
#[derive(Debug, Clone)]
pub struct StorePaths {
    pub inbound: PathBuf,
    pub outbound: PathBuf,
    pub status: PathBuf,
}

impl StorePaths {
    /// `inbound.db`, `outbound.db` and `status.db` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            inbound: dir.join("inbound.db"),
            outbound: dir.join("outbound.db"),
            status: dir.join("status.db"),
        }
    }
}

/// Lease behaviour of [`SqliteQueueStore::dequeue_start`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Only rows with one of these message types are leased. Empty means all.
    pub message_types: Vec<String>,
    /// A lease older than this is considered abandoned and handed out again.
    pub lease_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            message_types: Vec::new(),
            lease_timeout: Duration::from_secs(300),
        }
    }
}

/// [`QueueStore`] over three SQLite connections, each behind its own mutex.
///
/// Every method takes exactly one lock for exactly one statement or
/// transaction. Connections are closed when the store is dropped.
pub struct SqliteQueueStore {
    inbound: Mutex<Connection>,
    outbound: Mutex<Connection>,
    status: Mutex<Connection>,
    options: StoreOptions,
}

impl SqliteQueueStore {
    /// Open (creating if needed) the three database files.
    pub fn open(paths: &StorePaths, options: StoreOptions) -> StoreResult<Self> {
        Ok(Self {
            inbound: Mutex::new(open_file(&paths.inbound, schema::INBOUND)?),
            outbound: Mutex::new(open_file(&paths.outbound, schema::OUTBOUND)?),
            status: Mutex::new(open_file(&paths.status, schema::STATUS)?),
            options,
        })
    }

    /// Three private in-memory databases.
    pub fn open_in_memory(options: StoreOptions) -> StoreResult<Self> {
        Ok(Self {
            inbound: Mutex::new(open_memory(schema::INBOUND)?),
            outbound: Mutex::new(open_memory(schema::OUTBOUND)?),
            status: Mutex::new(open_memory(schema::STATUS)?),
            options,
        })
    }

    /// Insert a pending outbound row, as an upstream producer would.
    pub fn push_outbound(&self, token: &OutboundToken) -> StoreResult<()> {
        let conn = lock(&self.outbound, "outbound")?;
        conn.execute(
            "INSERT INTO outbound_queue (id, request_id, message_type, channel, created_at, from_number, to_number, text, coding_scheme, udhi, lease_state)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                token.id,
                token.request_id,
                token.message_type,
                token.channel,
                timestamp(token.created_at),
                token.from_number,
                token.to_number,
                token.text,
                token.data_coding,
                token.udhi,
                LeaseState::Pending.as_str(),
            ],
        )
        .map_err(|e| StoreError::from_insert(e, format!("outbound_queue:{}", token.id)))?;
        Ok(())
    }

    /// Current lease state of an outbound row.
    pub fn lease_state(&self, id: i64) -> StoreResult<Option<LeaseState>> {
        let conn = lock(&self.outbound, "outbound")?;
        let result = conn.query_row(
            "SELECT lease_state FROM outbound_queue WHERE id = ?1",
            params![id],
            |row| row.get::<_, String>(0),
        );
        match result {
            Ok(state) => LeaseState::parse(&state)
                .map(Some)
                .ok_or_else(|| StoreError::InvalidData(format!("lease state {state:?}"))),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Send log rows in insertion order.
    pub fn outbound_log(&self) -> StoreResult<Vec<OutboundLogRow>> {
        let conn = lock(&self.outbound, "outbound")?;
        let mut stmt = conn.prepare(
            "SELECT id, token_id, logged_at, result_code FROM outbound_log ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, token_id, logged_at, result_code)| {
                Ok(OutboundLogRow {
                    id,
                    token_id,
                    logged_at: parse_timestamp(&logged_at)?,
                    result_code,
                })
            })
            .collect()
    }

    pub fn report(&self, report_id: &str, session_name: &str) -> StoreResult<Option<ReportRecord>> {
        let conn = lock(&self.inbound, "inbound")?;
        let result = conn.query_row(
            "SELECT general_id, status, status_at FROM outgoing_reports
             WHERE report_id = ?1 AND session_name = ?2",
            params![report_id, session_name],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<u8>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        );
        match result {
            Ok((general_id, status, status_at)) => Ok(Some(ReportRecord {
                report_id: report_id.to_string(),
                session_name: session_name.to_string(),
                general_id,
                status,
                status_at: status_at.as_deref().map(parse_timestamp).transpose()?,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn report_count(&self) -> StoreResult<i64> {
        let conn = lock(&self.inbound, "inbound")?;
        Ok(conn.query_row("SELECT COUNT(*) FROM outgoing_reports", [], |row| row.get(0))?)
    }

    /// Inbound queue rows in id order.
    pub fn inbound_queue(&self) -> StoreResult<Vec<InboundToken>> {
        let conn = lock(&self.inbound, "inbound")?;
        let mut stmt = conn.prepare(
            "SELECT id, message_type, channel, created_at, from_number, to_number, text
             FROM inbound_queue ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(
                |(id, message_type, channel, created_at, from_number, to_number, text)| {
                    Ok(InboundToken {
                        id,
                        message_type,
                        channel,
                        created_at: parse_timestamp(&created_at)?,
                        from_number,
                        to_number,
                        text,
                    })
                },
            )
            .collect()
    }

    /// Raw receipt log rows in insertion order.
    pub fn inbound_log(&self) -> StoreResult<Vec<InboundLogRow>> {
        let conn = lock(&self.inbound, "inbound")?;
        let mut stmt = conn.prepare(
            "SELECT id, received_at, from_number, to_number, text FROM inbound_log ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, received_at, from_number, to_number, text)| {
                Ok(InboundLogRow {
                    id,
                    received_at: parse_timestamp(&received_at)?,
                    from_number,
                    to_number,
                    text,
                })
            })
            .collect()
    }

    /// `(request_id, service)` pairs in insertion order.
    pub fn affiliate_log(&self) -> StoreResult<Vec<(i64, String)>> {
        let conn = lock(&self.inbound, "inbound")?;
        let mut stmt =
            conn.prepare("SELECT request_id, service FROM affiliate_log ORDER BY rowid")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn connection_status(&self, field_name: &str) -> StoreResult<Option<ConnectionStatusRecord>> {
        let conn = lock(&self.status, "status")?;
        let result = conn.query_row(
            "SELECT status, is_down, updated_at FROM connection_status WHERE field_name = ?1",
            params![field_name],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, bool>(1)?,
                    row.get::<_, String>(2)?,
                ))
            },
        );
        match result {
            Ok((status, is_down, updated_at)) => Ok(Some(ConnectionStatusRecord {
                field_name: field_name.to_string(),
                status,
                is_down,
                updated_at: parse_timestamp(&updated_at)?,
            })),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn try_update_status(&self, text: &str, is_down: bool, field_name: &str) -> StoreResult<()> {
        let conn = lock(&self.status, "status")?;
        conn.execute(
            "INSERT INTO connection_status (field_name, status, is_down, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(field_name) DO UPDATE SET
                status = excluded.status,
                is_down = excluded.is_down,
                updated_at = excluded.updated_at",
            params![field_name, text, is_down, timestamp(Utc::now())],
        )?;
        Ok(())
    }
}

impl QueueStore for SqliteQueueStore {
    fn dequeue_start(&self) -> StoreResult<Option<OutboundToken>> {
        let lease_timeout = chrono::Duration::from_std(self.options.lease_timeout)
            .map_err(|e| StoreError::InvalidData(format!("lease timeout: {e}")))?;
        let now = Utc::now();
        let cutoff = timestamp(now - lease_timeout);

        let mut sql = String::from(
            "SELECT id, request_id, message_type, channel, created_at, from_number, to_number, text, coding_scheme, udhi
             FROM outbound_queue
             WHERE (lease_state = 'pending' OR (lease_state = 'leased' AND leased_at < ?1))",
        );
        if !self.options.message_types.is_empty() {
            let placeholders = (0..self.options.message_types.len())
                .map(|i| format!("?{}", i + 2))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" AND message_type IN ({placeholders})"));
        }
        sql.push_str(" ORDER BY id LIMIT 1");

        let mut values = Vec::with_capacity(self.options.message_types.len() + 1);
        values.push(cutoff.clone());
        values.extend(self.options.message_types.iter().cloned());

        let mut conn = lock(&self.outbound, "outbound")?;
        // Take the write lock up front so a busy database is waited out, not upgraded into.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let result = tx.query_row(&sql, params_from_iter(values.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, u8>(8)?,
                row.get::<_, bool>(9)?,
            ))
        });
        let row = match result {
            Ok(row) => row,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let (id, request_id, message_type, channel, created_at, from_number, to_number, text, data_coding, udhi) =
            row;

        let changed = tx.execute(
            "UPDATE outbound_queue SET lease_state = 'leased', leased_at = ?1
             WHERE id = ?2
               AND (lease_state = 'pending' OR (lease_state = 'leased' AND leased_at < ?3))",
            params![timestamp(now), id, cutoff],
        )?;
        if changed != 1 {
            // Another writer took the row between select and update.
            return Ok(None);
        }
        tx.commit()?;

        debug!(token_id = id, message_type = %message_type, "leased outbound token");
        Ok(Some(OutboundToken {
            id,
            request_id,
            message_type,
            channel,
            created_at: parse_timestamp(&created_at)?,
            from_number,
            to_number,
            text,
            data_coding,
            udhi,
        }))
    }

    fn dequeue_end(&self, message_type: &str, id: i64) -> StoreResult<()> {
        let conn = lock(&self.outbound, "outbound")?;
        let changed = conn.execute(
            "UPDATE outbound_queue SET lease_state = 'done' WHERE id = ?1 AND message_type = ?2",
            params![id, message_type],
        )?;
        if changed == 0 {
            warn!(token_id = id, message_type, "dequeue completion matched no row");
        }
        Ok(())
    }

    fn enqueue(&self, token: &InboundToken) -> StoreResult<()> {
        let conn = lock(&self.inbound, "inbound")?;
        conn.execute(
            "INSERT INTO inbound_queue (id, message_type, channel, created_at, from_number, to_number, text)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                token.id,
                token.message_type,
                token.channel,
                timestamp(token.created_at),
                token.from_number,
                token.to_number,
                token.text,
            ],
        )
        .map_err(|e| StoreError::from_insert(e, format!("inbound_queue:{}", token.id)))?;
        Ok(())
    }

    fn next_sequence(&self, name: SequenceName) -> StoreResult<i64> {
        let (conn, label) = match name {
            SequenceName::Request => (&self.inbound, "inbound"),
            SequenceName::OutSms => (&self.outbound, "outbound"),
        };
        let conn = lock(conn, label)?;
        Ok(conn.query_row(
            "INSERT INTO sequences (name, value) VALUES (?1, 1)
             ON CONFLICT(name) DO UPDATE SET value = value + 1
             RETURNING value",
            params![name.as_str()],
            |row| row.get(0),
        )?)
    }

    fn log_outbound(
        &self,
        seq: i64,
        token_id: i64,
        at: DateTime<Utc>,
        result_code: i64,
    ) -> StoreResult<()> {
        let conn = lock(&self.outbound, "outbound")?;
        conn.execute(
            "INSERT INTO outbound_log (id, token_id, logged_at, result_code) VALUES (?1, ?2, ?3, ?4)",
            params![seq, token_id, timestamp(at), result_code],
        )
        .map_err(|e| StoreError::from_insert(e, format!("outbound_log:{seq}")))?;
        Ok(())
    }

    fn log_inbound(
        &self,
        id: i64,
        at: DateTime<Utc>,
        from_number: &str,
        to_number: &str,
        text: &str,
    ) -> StoreResult<()> {
        let conn = lock(&self.inbound, "inbound")?;
        conn.execute(
            "INSERT INTO inbound_log (id, received_at, from_number, to_number, text) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, timestamp(at), from_number, to_number, text],
        )?;
        Ok(())
    }

    fn log_affiliate(&self, request_id: i64, service: &str) -> StoreResult<()> {
        let conn = lock(&self.inbound, "inbound")?;
        conn.execute(
            "INSERT INTO affiliate_log (request_id, service) VALUES (?1, ?2)",
            params![request_id, service],
        )?;
        Ok(())
    }

    fn insert_report(
        &self,
        report_id: &str,
        session_name: &str,
        general_id: i64,
    ) -> StoreResult<()> {
        let conn = lock(&self.inbound, "inbound")?;
        conn.execute(
            "INSERT INTO outgoing_reports (report_id, session_name, general_id) VALUES (?1, ?2, ?3)",
            params![report_id, session_name, general_id],
        )
        .map_err(|e| StoreError::from_insert(e, format!("{session_name}/{report_id}")))?;
        Ok(())
    }

    fn report_exists(&self, report_id: &str, session_name: &str) -> StoreResult<bool> {
        let conn = lock(&self.inbound, "inbound")?;
        Ok(conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM outgoing_reports WHERE report_id = ?1 AND session_name = ?2)",
            params![report_id, session_name],
            |row| row.get(0),
        )?)
    }

    fn reassign_report(
        &self,
        report_id: &str,
        session_name: &str,
        general_id: i64,
    ) -> StoreResult<()> {
        let conn = lock(&self.inbound, "inbound")?;
        conn.execute(
            "UPDATE outgoing_reports SET general_id = ?3, status = NULL, status_at = NULL
             WHERE report_id = ?1 AND session_name = ?2",
            params![report_id, session_name, general_id],
        )?;
        Ok(())
    }

    fn update_report(
        &self,
        report_id: &str,
        session_name: &str,
        status: u8,
    ) -> StoreResult<Option<i64>> {
        let conn = lock(&self.inbound, "inbound")?;
        let result = conn.query_row(
            "UPDATE outgoing_reports SET status = ?3, status_at = ?4
             WHERE report_id = ?1 AND session_name = ?2
             RETURNING general_id",
            params![report_id, session_name, status, timestamp(Utc::now())],
            |row| row.get(0),
        );
        match result {
            Ok(general_id) => Ok(Some(general_id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn original_sender(&self, general_id: i64) -> StoreResult<Option<String>> {
        let conn = lock(&self.outbound, "outbound")?;
        let result = conn.query_row(
            "SELECT from_number FROM outbound_queue WHERE id = ?1",
            params![general_id],
            |row| row.get(0),
        );
        match result {
            Ok(sender) => Ok(Some(sender)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn update_status(&self, text: &str, is_down: bool, field_name: &str) -> StoreResult<()> {
        let text: String = text.chars().take(STATUS_TEXT_LIMIT).collect();
        loop {
            match self.try_update_status(&text, is_down, field_name) {
                Err(e) if e.is_write_conflict() => {
                    debug!(field = field_name, error = %e, "status write conflicted, retrying");
                    std::thread::sleep(STATUS_RETRY_PAUSE);
                }
                other => return other,
            }
        }
    }
}

fn lock<'a>(conn: &'a Mutex<Connection>, name: &'static str) -> StoreResult<MutexGuard<'a, Connection>> {
    conn.lock().map_err(|_| StoreError::LockPoisoned(name))
}

fn open_file(path: &Path, schema: &str) -> StoreResult<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 1000;
    ",
    )?;
    conn.execute_batch(schema)?;
    Ok(conn)
}

fn open_memory(schema: &str) -> StoreResult<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(schema)?;
    Ok(conn)
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("timestamp {value:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteQueueStore {
        SqliteQueueStore::open_in_memory(StoreOptions::default()).unwrap()
    }

    #[test]
    fn sequences_are_independent_and_increasing() {
        let store = store();
        assert_eq!(store.next_sequence(SequenceName::Request).unwrap(), 1);
        assert_eq!(store.next_sequence(SequenceName::Request).unwrap(), 2);
        assert_eq!(store.next_sequence(SequenceName::OutSms).unwrap(), 1);
        assert_eq!(store.next_sequence(SequenceName::Request).unwrap(), 3);
    }

    #[test]
    fn leased_token_is_not_handed_out_twice() {
        let store = store();
        store.push_outbound(&OutboundToken::text(1, "SMS", "100", "200", "a")).unwrap();
        store.push_outbound(&OutboundToken::text(2, "SMS", "100", "200", "b")).unwrap();

        let first = store.dequeue_start().unwrap().unwrap();
        let second = store.dequeue_start().unwrap().unwrap();
        assert_eq!((first.id, second.id), (1, 2));
        assert!(store.dequeue_start().unwrap().is_none());
        assert_eq!(store.lease_state(1).unwrap(), Some(LeaseState::Leased));

        store.dequeue_end("SMS", 1).unwrap();
        assert_eq!(store.lease_state(1).unwrap(), Some(LeaseState::Done));
        assert_eq!(store.lease_state(2).unwrap(), Some(LeaseState::Leased));
    }

    #[test]
    fn lease_filter_limits_message_types() {
        let store = SqliteQueueStore::open_in_memory(StoreOptions {
            message_types: vec!["BULK".into(), "VIP".into()],
            ..StoreOptions::default()
        })
        .unwrap();
        store.push_outbound(&OutboundToken::text(1, "SMS", "1", "2", "x")).unwrap();
        store.push_outbound(&OutboundToken::text(2, "VIP", "1", "2", "y")).unwrap();

        assert_eq!(store.dequeue_start().unwrap().map(|t| t.id), Some(2));
        assert!(store.dequeue_start().unwrap().is_none());
    }

    #[test]
    fn expired_lease_is_reclaimed() {
        let store = SqliteQueueStore::open_in_memory(StoreOptions {
            lease_timeout: Duration::ZERO,
            ..StoreOptions::default()
        })
        .unwrap();
        store.push_outbound(&OutboundToken::text(7, "SMS", "1", "2", "x")).unwrap();

        assert!(store.dequeue_start().unwrap().is_some());
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.dequeue_start().unwrap().map(|t| t.id), Some(7));
    }

    #[test]
    fn token_fields_survive_the_queue() {
        let store = store();
        let token = OutboundToken {
            channel: "SMS-ATL-BULK".into(),
            data_coding: 8,
            udhi: true,
            request_id: 99,
            ..OutboundToken::text(3, "SMS", "100", "200", "AAEC")
        };
        store.push_outbound(&token).unwrap();

        let leased = store.dequeue_start().unwrap().unwrap();
        assert_eq!(leased.channel, "SMS-ATL-BULK");
        assert_eq!(leased.data_coding, 8);
        assert!(leased.udhi);
        assert_eq!(leased.request_id, 99);
        assert_eq!(leased.text, "AAEC");
    }

    #[test]
    fn duplicate_report_insert_is_reported() {
        let store = store();
        store.insert_report("abc", "smsc", 1).unwrap();
        let err = store.insert_report("abc", "smsc", 2).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));

        // Same id on another session is a different record.
        store.insert_report("abc", "other", 2).unwrap();
        assert_eq!(store.report_count().unwrap(), 2);
    }

    #[test]
    fn report_lifecycle() {
        let store = store();
        assert_eq!(store.update_report("r1", "smsc", 2).unwrap(), None);
        assert!(!store.report_exists("r1", "smsc").unwrap());

        store.insert_report("r1", "smsc", 10).unwrap();
        assert!(store.report_exists("r1", "smsc").unwrap());
        assert_eq!(store.update_report("r1", "smsc", 2).unwrap(), Some(10));

        let record = store.report("r1", "smsc").unwrap().unwrap();
        assert_eq!(record.status, Some(2));
        assert!(record.status_at.is_some());

        store.reassign_report("r1", "smsc", 11).unwrap();
        let record = store.report("r1", "smsc").unwrap().unwrap();
        assert_eq!(record.general_id, 11);
        assert_eq!(record.status, None);
        assert_eq!(record.status_at, None);
    }

    #[test]
    fn original_sender_reads_outbound_row() {
        let store = store();
        store.push_outbound(&OutboundToken::text(5, "SMS", "7000", "200", "x")).unwrap();
        assert_eq!(store.original_sender(5).unwrap().as_deref(), Some("7000"));
        assert_eq!(store.original_sender(6).unwrap(), None);
    }

    #[test]
    fn status_text_is_truncated_and_overwritten() {
        let store = store();
        let long = "x".repeat(300);
        store.update_status(&long, true, "smsc_1").unwrap();
        let record = store.connection_status("smsc_1").unwrap().unwrap();
        assert_eq!(record.status.chars().count(), STATUS_TEXT_LIMIT);
        assert!(record.is_down);

        store.update_status("connected", false, "smsc_1").unwrap();
        let record = store.connection_status("smsc_1").unwrap().unwrap();
        assert_eq!(record.status, "connected");
        assert!(!record.is_down);
    }

    #[test]
    fn inbound_rows_are_written() {
        let store = store();
        let now = Utc::now();
        store
            .enqueue(&InboundToken {
                id: 1,
                message_type: "IN_200".into(),
                channel: "SMS".into(),
                created_at: now,
                from_number: "100".into(),
                to_number: "200".into(),
                text: "hello".into(),
            })
            .unwrap();
        store.log_inbound(1, now, "100", "200", "hello").unwrap();
        store.log_affiliate(1, "weather").unwrap();

        assert_eq!(store.inbound_queue().unwrap()[0].message_type, "IN_200");
        assert_eq!(store.inbound_log().unwrap()[0].text, "hello");
        assert_eq!(store.affiliate_log().unwrap(), vec![(1, "weather".to_string())]);
    }

    #[test]
    fn status_write_waits_out_a_competing_writer() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let store = SqliteQueueStore::open(&paths, StoreOptions::default()).unwrap();

        let blocker = Connection::open(&paths.status).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();
        let holder = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            blocker.execute_batch("COMMIT").unwrap();
        });

        store.update_status("connected", false, "smsc_1").unwrap();
        holder.join().unwrap();

        let record = store.connection_status("smsc_1").unwrap().unwrap();
        assert_eq!(record.status, "connected");
    }

    #[test]
    fn lease_waits_out_a_competing_writer() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let store = SqliteQueueStore::open(&paths, StoreOptions::default()).unwrap();
        store
            .push_outbound(&OutboundToken::text(1, "SMS", "100", "200", "hi"))
            .unwrap();

        let blocker = Connection::open(&paths.outbound).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();
        let holder = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            blocker.execute_batch("COMMIT").unwrap();
        });

        let token = store.dequeue_start().unwrap().unwrap();
        holder.join().unwrap();

        assert_eq!(token.id, 1);
        assert_eq!(store.lease_state(1).unwrap(), Some(LeaseState::Leased));
    }

    #[test]
    fn log_rows_keep_result_codes() {
        let store = store();
        let seq = store.next_sequence(SequenceName::OutSms).unwrap();
        store.log_outbound(seq, 42, Utc::now(), -100500).unwrap();
        let log = store.outbound_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!((log[0].id, log[0].token_id, log[0].result_code), (1, 42, -100500));
    }
}
