//! Queue store.
//!
//! Every persisted entity the dispatch core touches lives behind
//! [`QueueStore`]. Operations are synchronous and each one is atomic with
//! respect to its logical database: the outbound queue and send log, the
//! inbound queue with its logs and report table, and the endpoint status
//! table. The three never share a lock.
//!
//! Async callers reach the store through [`blocking`], which runs the
//! operation on tokio's blocking pool so a busy database file never stalls a
//! runtime thread.

mod error;
mod schema;
mod sqlite;
mod types;

pub use error::{StoreError, StoreResult};
pub use sqlite::{SqliteQueueStore, StoreOptions, StorePaths};
pub use types::{
    ConnectionStatusRecord, InboundLogRow, InboundToken, LeaseState, OutboundLogRow,
    OutboundToken, ReportRecord, SequenceName,
};

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Persistence operations consumed by the dispatch core.
pub trait QueueStore: Send + Sync + 'static {
    /// Lease the next available outbound token, `None` when nothing is leaseable.
    ///
    /// A leased token is not handed out again until it is completed with
    /// [`QueueStore::dequeue_end`] or its lease expires.
    fn dequeue_start(&self) -> StoreResult<Option<OutboundToken>>;

    /// Mark a leased token as completed.
    fn dequeue_end(&self, message_type: &str, id: i64) -> StoreResult<()>;

    /// Append a token to the inbound queue.
    fn enqueue(&self, token: &InboundToken) -> StoreResult<()>;

    /// Next value of a named counter. Values are strictly increasing.
    fn next_sequence(&self, name: SequenceName) -> StoreResult<i64>;

    /// Record the result of one send attempt (or a local validation failure).
    fn log_outbound(
        &self,
        seq: i64,
        token_id: i64,
        at: DateTime<Utc>,
        result_code: i64,
    ) -> StoreResult<()>;

    /// Record a received unit as it arrived.
    fn log_inbound(
        &self,
        id: i64,
        at: DateTime<Utc>,
        from_number: &str,
        to_number: &str,
        text: &str,
    ) -> StoreResult<()>;

    /// Record the service tag of a received unit routed to an affiliate number.
    fn log_affiliate(&self, request_id: i64, service: &str) -> StoreResult<()>;

    /// Create a report record. Fails with [`StoreError::DuplicateKey`] if the
    /// `(report_id, session_name)` pair already exists.
    fn insert_report(&self, report_id: &str, session_name: &str, general_id: i64)
    -> StoreResult<()>;

    fn report_exists(&self, report_id: &str, session_name: &str) -> StoreResult<bool>;

    /// Point an existing report record at a new token and clear its status.
    fn reassign_report(
        &self,
        report_id: &str,
        session_name: &str,
        general_id: i64,
    ) -> StoreResult<()>;

    /// Store a delivery status. Returns the owning token id, or `None` when no
    /// record exists yet.
    fn update_report(
        &self,
        report_id: &str,
        session_name: &str,
        status: u8,
    ) -> StoreResult<Option<i64>>;

    /// Sender number of the outbound token with the given id.
    fn original_sender(&self, general_id: i64) -> StoreResult<Option<String>>;

    /// Overwrite the status row for an endpoint field.
    ///
    /// Write conflicts with other writers are retried until the write lands.
    fn update_status(&self, text: &str, is_down: bool, field_name: &str) -> StoreResult<()>;
}

/// Run `op` against `store` on the blocking thread pool.
///
/// Group statements that belong to one logical step into a single `op`.
pub async fn blocking<S, T, F>(store: &Arc<S>, op: F) -> StoreResult<T>
where
    S: QueueStore,
    T: Send + 'static,
    F: FnOnce(&S) -> StoreResult<T> + Send + 'static,
{
    let store = store.clone();
    tokio::task::spawn_blocking(move || op(&store)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn busy_database_does_not_stall_the_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let paths = StorePaths::in_dir(dir.path());
        let store = Arc::new(SqliteQueueStore::open(&paths, StoreOptions::default()).unwrap());
        store
            .push_outbound(&OutboundToken::text(1, "SMS", "100", "200", "hi"))
            .unwrap();

        let blocker = Connection::open(&paths.outbound).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();
        let holder = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            blocker.execute_batch("COMMIT").unwrap();
        });

        // Single-threaded runtime: the ticker only advances if the lease wait is off-thread.
        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = ticks.clone();
            async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            }
        });

        let token = blocking(&store, |s| s.dequeue_start()).await.unwrap();
        ticker.abort();
        holder.join().unwrap();

        assert_eq!(token.map(|t| t.id), Some(1));
        assert!(ticks.load(Ordering::SeqCst) >= 5);
    }
}
