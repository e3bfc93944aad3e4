// ABOUTME: In-process session that accepts every submit locally and lets callers inject inbound traffic
// ABOUTME: Used to exercise the dispatch core end to end without an SMSC

use crate::session::error::{SmppError, SmppResult};
use crate::session::traits::SmscSession;
use crate::session::types::{EndpointState, SessionEvent, SubmitOutcome, SubmitUnit};
use crate::datatypes::InboundUnit;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Session double that records submits instead of sending them.
///
/// Submits are answered from a script of queued results first and accepted
/// with sequential hex message ids once the script is empty.
#[derive(Debug, Default)]
pub struct LoopbackSession {
    state: Mutex<LoopbackState>,
}

#[derive(Debug, Default)]
struct LoopbackState {
    events: Option<mpsc::Sender<SessionEvent>>,
    submitted: Vec<SubmitUnit>,
    accepted: Vec<String>,
    script: VecDeque<SmppResult<SubmitOutcome>>,
    endpoints: Vec<EndpointState>,
    next_message_id: u64,
    submit_delay: Option<Duration>,
}

impl LoopbackSession {
    /// A session with one initially disconnected endpoint per address.
    pub fn new<I, A>(addresses: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        let endpoints = addresses
            .into_iter()
            .map(|address| EndpointState {
                address: address.into(),
                connected: false,
                last_command_status: String::new(),
            })
            .collect();
        Self {
            state: Mutex::new(LoopbackState {
                endpoints,
                ..LoopbackState::default()
            }),
        }
    }

    /// Queue the result of a future submit.
    pub fn script(&self, result: SmppResult<SubmitOutcome>) {
        self.state().script.push_back(result);
    }

    /// Hold every submit for `delay` before answering.
    pub fn set_submit_delay(&self, delay: Duration) {
        self.state().submit_delay = Some(delay);
    }

    /// Every unit submitted so far, in order.
    pub fn submitted(&self) -> Vec<SubmitUnit> {
        self.state().submitted.clone()
    }

    /// Message ids handed out for accepted submits, in order.
    pub fn accepted_ids(&self) -> Vec<String> {
        self.state().accepted.clone()
    }

    /// Flip one endpoint's connectivity and publish the matching event.
    pub async fn set_connected(&self, address: &str, connected: bool, reason: &str) {
        let events = {
            let mut state = self.state();
            if let Some(endpoint) = state.endpoints.iter_mut().find(|e| e.address == address) {
                endpoint.connected = connected;
                endpoint.last_command_status = reason.to_string();
            }
            state.events.clone()
        };
        let event = if connected {
            SessionEvent::Connected {
                endpoint: address.to_string(),
            }
        } else {
            SessionEvent::Disconnected {
                reason: reason.to_string(),
                endpoint: address.to_string(),
            }
        };
        if let Some(events) = events {
            let _ = events.send(event).await;
        }
    }

    /// Publish a received unit and wait for the core's verdict.
    ///
    /// Returns `None` when the session is not started or the verdict was dropped.
    pub async fn deliver(&self, unit: InboundUnit) -> Option<bool> {
        let events = self.state().events.clone()?;
        let (tx, rx) = oneshot::channel();
        events
            .send(SessionEvent::Unit {
                unit,
                handled: Some(tx),
            })
            .await
            .ok()?;
        rx.await.ok()
    }

    fn state(&self) -> MutexGuard<'_, LoopbackState> {
        // A panic while holding this lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SmscSession for LoopbackSession {
    async fn start(&self, events: mpsc::Sender<SessionEvent>) -> SmppResult<()> {
        let addresses: Vec<String> = {
            let mut state = self.state();
            state.events = Some(events.clone());
            state
                .endpoints
                .iter_mut()
                .map(|endpoint| {
                    endpoint.connected = true;
                    endpoint.last_command_status = "ESME_ROK".to_string();
                    endpoint.address.clone()
                })
                .collect()
        };
        for endpoint in addresses {
            events
                .send(SessionEvent::Connected { endpoint })
                .await
                .map_err(|_| SmppError::ConnectionClosed)?;
        }
        Ok(())
    }

    async fn stop(&self) -> SmppResult<()> {
        let mut state = self.state();
        state.events = None;
        for endpoint in &mut state.endpoints {
            endpoint.connected = false;
            endpoint.last_command_status = "unbound".to_string();
        }
        Ok(())
    }

    async fn submit(&self, unit: SubmitUnit) -> SmppResult<SubmitOutcome> {
        let delay = self.state().submit_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        state.submitted.push(unit);
        let result = match state.script.pop_front() {
            Some(result) => result,
            None => {
                state.next_message_id += 1;
                Ok(SubmitOutcome::accepted(format!("{:08X}", state.next_message_id)))
            }
        };
        if let Ok(outcome) = &result {
            if outcome.status.is_ok() && !outcome.message_id.is_empty() {
                state.accepted.push(outcome.message_id.clone());
            }
        }
        result
    }

    fn endpoints(&self) -> Vec<EndpointState> {
        self.state().endpoints.clone()
    }
}
