// ABOUTME: Connection health monitor writing one human readable status row per configured endpoint
// ABOUTME: Driven by the periodic sampler and by the session's connect/disconnect events

use crate::config::EndpointConfig;
use crate::error::GatewayResult;
use crate::session::SmscSession;
use crate::store::QueueStore;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Status text for a bound endpoint.
pub const CONNECTED_STATUS: &str = "connected";

/// Prefix of the status text for a lost endpoint; the reason follows.
pub const DISCONNECTED_PREFIX: &str = "not connected - ";

/// Maps endpoint connectivity onto status rows.
///
/// Endpoints the session reports but the configuration does not name are
/// skipped.
pub struct HealthMonitor<S, C> {
    store: Arc<S>,
    session: Arc<C>,
    fields: HashMap<String, String>,
}

impl<S, C> HealthMonitor<S, C>
where
    S: QueueStore,
    C: SmscSession,
{
    pub fn new(store: Arc<S>, session: Arc<C>, endpoints: &[EndpointConfig]) -> Self {
        let fields = endpoints
            .iter()
            .map(|e| (e.address.clone(), e.field_name.clone()))
            .collect();
        Self {
            store,
            session,
            fields,
        }
    }

    /// Write the current state of every endpoint. Returns the rows written.
    pub fn sample(&self) -> GatewayResult<usize> {
        let mut written = 0;
        for endpoint in self.session.endpoints() {
            let recorded = if endpoint.connected {
                self.record_connected(&endpoint.address)?
            } else {
                self.record_disconnected(&endpoint.address, &endpoint.last_command_status)?
            };
            if recorded {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Returns false when `endpoint` is not configured.
    pub fn record_connected(&self, endpoint: &str) -> GatewayResult<bool> {
        self.write(endpoint, CONNECTED_STATUS, false)
    }

    /// Returns false when `endpoint` is not configured.
    pub fn record_disconnected(&self, endpoint: &str, reason: &str) -> GatewayResult<bool> {
        self.write(endpoint, &format!("{DISCONNECTED_PREFIX}{reason}"), true)
    }

    fn write(&self, endpoint: &str, status: &str, is_down: bool) -> GatewayResult<bool> {
        let Some(field_name) = self.fields.get(endpoint) else {
            debug!(endpoint, "status for unconfigured endpoint skipped");
            return Ok(false);
        };
        self.store.update_status(status, is_down, field_name)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::LoopbackSession;
    use crate::store::{SqliteQueueStore, StoreOptions};

    fn endpoints() -> Vec<EndpointConfig> {
        vec![
            EndpointConfig {
                address: "10.0.0.1:2775".into(),
                field_name: "smsc_1".into(),
            },
            EndpointConfig {
                address: "10.0.0.2:2775".into(),
                field_name: "smsc_2".into(),
            },
        ]
    }

    #[tokio::test]
    async fn sample_writes_one_row_per_configured_endpoint() {
        let store = Arc::new(SqliteQueueStore::open_in_memory(StoreOptions::default()).unwrap());
        let session = Arc::new(LoopbackSession::new([
            "10.0.0.1:2775",
            "10.0.0.2:2775",
            "10.0.0.9:2775",
        ]));
        session.set_connected("10.0.0.1:2775", true, "").await;
        session
            .set_connected("10.0.0.2:2775", false, "ESME_RBINDFAIL")
            .await;

        let monitor = HealthMonitor::new(store.clone(), session, &endpoints());
        assert_eq!(monitor.sample().unwrap(), 2);

        let up = store.connection_status("smsc_1").unwrap().unwrap();
        assert_eq!((up.status.as_str(), up.is_down), ("connected", false));

        let down = store.connection_status("smsc_2").unwrap().unwrap();
        assert_eq!(down.status, "not connected - ESME_RBINDFAIL");
        assert!(down.is_down);
    }

    #[test]
    fn unknown_endpoint_is_skipped() {
        let store = Arc::new(SqliteQueueStore::open_in_memory(StoreOptions::default()).unwrap());
        let session = Arc::new(LoopbackSession::new(Vec::<String>::new()));
        let monitor = HealthMonitor::new(store, session, &endpoints());
        assert!(!monitor.record_connected("192.168.1.1:2775").unwrap());
        assert!(monitor.record_disconnected("10.0.0.1:2775", "timeout").unwrap());
    }
}
