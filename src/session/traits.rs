// ABOUTME: Contract between the dispatch core and the SMPP session that owns the SMSC connections
// ABOUTME: Session implementations push inbound traffic and connectivity changes onto an event channel

use crate::session::error::SmppResult;
use crate::session::types::{EndpointState, SessionEvent, SubmitOutcome, SubmitUnit};
use std::future::Future;
use tokio::sync::mpsc;

/// Long-lived session to one or more SMSC endpoints.
///
/// Framing, binding, reconnection and enquire_link handling all live behind
/// this trait. Implementations must be safe to call from several drain
/// workers at once.
pub trait SmscSession: Send + Sync + 'static {
    /// Start connecting and binding.
    ///
    /// Received units and connectivity changes are published on `events` for
    /// as long as the session runs. Dropping the sender ends the event stream.
    fn start(&self, events: mpsc::Sender<SessionEvent>) -> impl Future<Output = SmppResult<()>> + Send;

    /// Unbind and close every endpoint connection.
    fn stop(&self) -> impl Future<Output = SmppResult<()>> + Send;

    /// Send one unit as a submit_sm and wait for its response.
    ///
    /// A response with a non-OK command_status is returned as `Ok` with that
    /// status. `Err` is reserved for transport and validation failures.
    fn submit(&self, unit: SubmitUnit) -> impl Future<Output = SmppResult<SubmitOutcome>> + Send;

    /// Snapshot of per-endpoint connectivity.
    fn endpoints(&self) -> Vec<EndpointState>;
}
