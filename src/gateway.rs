// ABOUTME: Gateway lifecycle: dispatch and health timers, worker admission, session event pump
// ABOUTME: Wires the dispatcher, correlator, ingest pipeline and health monitor to one session and store

use crate::config::GatewayConfig;
use crate::dispatch::Dispatcher;
use crate::error::{GatewayError, GatewayResult};
use crate::gate::ConcurrencyGate;
use crate::health::HealthMonitor;
use crate::ingest::{FailureSink, IngestPipeline, Transliterator};
use crate::report::ReportCorrelator;
use crate::session::{SessionEvent, SmscSession};
use crate::store::QueueStore;
use crate::datatypes::InboundUnit;
use std::sync::Arc;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Session events buffered before the session's publisher waits.
const EVENT_BUFFER: usize = 256;

/// Builder for [`Gateway`].
pub struct GatewayBuilder<S, C> {
    store: Arc<S>,
    session: Arc<C>,
    config: GatewayConfig,
    transliterator: Option<Arc<dyn Transliterator>>,
    failures: Option<Arc<dyn FailureSink>>,
}

impl<S, C> GatewayBuilder<S, C>
where
    S: QueueStore,
    C: SmscSession,
{
    /// Normalise inbound text with `transliterator` instead of leaving it unchanged.
    pub fn transliterator(mut self, transliterator: Arc<dyn Transliterator>) -> Self {
        self.transliterator = Some(transliterator);
        self
    }

    /// Report inbound side-effect failures to `failures` instead of the log.
    pub fn failure_sink(mut self, failures: Arc<dyn FailureSink>) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Validate the configuration and assemble the gateway.
    pub fn build(self) -> GatewayResult<Gateway<S, C>> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let mut ingest = IngestPipeline::new(self.store.clone(), config.clone());
        if let Some(transliterator) = self.transliterator {
            ingest = ingest.with_transliterator(transliterator);
        }
        if let Some(failures) = self.failures {
            ingest = ingest.with_failure_sink(failures);
        }

        let shared = Shared {
            dispatcher: Dispatcher::new(self.store.clone(), self.session.clone(), config.clone()),
            correlator: ReportCorrelator::new(self.store.clone(), config.clone()),
            health: Arc::new(HealthMonitor::new(
                self.store,
                self.session.clone(),
                &config.endpoints,
            )),
            ingest,
            gate: ConcurrencyGate::new(config.dispatch.max_workers),
            wake: Notify::new(),
            session: self.session,
            config,
        };

        Ok(Gateway {
            shared: Arc::new(shared),
            running: None,
        })
    }
}

struct Shared<S, C> {
    config: Arc<GatewayConfig>,
    session: Arc<C>,
    gate: ConcurrencyGate,
    wake: Notify,
    dispatcher: Dispatcher<S, C>,
    correlator: ReportCorrelator<S>,
    ingest: IngestPipeline<S>,
    health: Arc<HealthMonitor<S, C>>,
}

struct Running {
    shutdown: watch::Sender<bool>,
    tasks: JoinSet<()>,
}

/// The dispatch core bound to one session and one store.
///
/// ```rust,no_run
/// use smpp_dispatch::{Gateway, GatewayConfig, LoopbackSession, SqliteQueueStore, StoreOptions};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let config = GatewayConfig::default();
/// let store = Arc::new(SqliteQueueStore::open_in_memory(StoreOptions::from(&config))?);
/// let session = Arc::new(LoopbackSession::new(["127.0.0.1:2775"]));
///
/// let mut gateway = Gateway::builder(store, session, config).build()?;
/// gateway.start().await?;
/// // ...
/// gateway.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Gateway<S, C> {
    shared: Arc<Shared<S, C>>,
    running: Option<Running>,
}

impl<S, C> Gateway<S, C>
where
    S: QueueStore,
    C: SmscSession,
{
    pub fn builder(store: Arc<S>, session: Arc<C>, config: GatewayConfig) -> GatewayBuilder<S, C> {
        GatewayBuilder {
            store,
            session,
            config,
            transliterator: None,
            failures: None,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Start the session, both timers, worker admission and the event pump.
    pub async fn start(&mut self) -> GatewayResult<()> {
        if self.running.is_some() {
            return Err(GatewayError::InvalidState("gateway already started"));
        }
        if self.shared.gate.is_closed() {
            return Err(GatewayError::InvalidState("gateway was stopped and cannot restart"));
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let mut tasks = JoinSet::new();

        tasks.spawn(pump_events(self.shared.clone(), events_rx, shutdown_rx.clone()));
        tasks.spawn(dispatch_timer(self.shared.clone(), shutdown_rx.clone()));
        tasks.spawn(admit_workers(self.shared.clone(), shutdown_rx.clone()));
        tasks.spawn(health_timer(self.shared.clone(), shutdown_rx));

        if let Err(e) = self.shared.session.start(events_tx).await {
            let _ = shutdown.send(true);
            self.shared.gate.dont_wait_any_more();
            while tasks.join_next().await.is_some() {}
            return Err(e.into());
        }

        info!(
            session = %self.shared.config.session_name,
            endpoints = self.shared.config.endpoints.len(),
            max_workers = self.shared.gate.capacity(),
            "gateway started"
        );
        self.running = Some(Running { shutdown, tasks });
        Ok(())
    }

    /// Stop admitting work, close the session and wait for running cycles to finish.
    pub async fn stop(&mut self) -> GatewayResult<()> {
        let Some(mut running) = self.running.take() else {
            return Ok(());
        };

        let _ = running.shutdown.send(true);
        self.shared.gate.dont_wait_any_more();
        let stopped = self.shared.session.stop().await;

        while let Some(result) = running.tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "gateway task failed");
            }
        }

        info!(session = %self.shared.config.session_name, "gateway stopped");
        stopped.map_err(GatewayError::from)
    }
}

/// Wakes one waiting worker per dispatch interval. Unconsumed wakes do not stack.
async fn dispatch_timer<S, C>(shared: Arc<Shared<S, C>>, mut shutdown: watch::Receiver<bool>)
where
    S: QueueStore,
    C: SmscSession,
{
    let mut ticker = interval(shared.config.dispatch.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => shared.wake.notify_one(),
            _ = shutdown.changed() => break,
        }
    }
}

/// Runs one worker per free gate slot until the gate closes.
async fn admit_workers<S, C>(shared: Arc<Shared<S, C>>, shutdown: watch::Receiver<bool>)
where
    S: QueueStore,
    C: SmscSession,
{
    let mut workers = JoinSet::new();
    while shared.gate.wait_and_increment().await {
        workers.spawn(drain_worker(shared.clone(), shutdown.clone()));
        // Reap finished workers so the set does not grow unbounded.
        while let Some(result) = workers.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "dispatch worker failed");
            }
        }
    }
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "dispatch worker failed");
        }
    }
}

/// One drain cycle, then idle until the next tick before giving the slot back.
async fn drain_worker<S, C>(shared: Arc<Shared<S, C>>, mut shutdown: watch::Receiver<bool>)
where
    S: QueueStore,
    C: SmscSession,
{
    if let Err(e) = shared.dispatcher.drain().await {
        error!(error = %e, "drain cycle aborted");
    }

    if !*shutdown.borrow() {
        tokio::select! {
            _ = shared.wake.notified() => {}
            _ = shutdown.changed() => {}
        }
    }
    shared.gate.decrement();
}

async fn health_timer<S, C>(shared: Arc<Shared<S, C>>, mut shutdown: watch::Receiver<bool>)
where
    S: QueueStore,
    C: SmscSession,
{
    let mut ticker = interval(shared.config.health.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let health = shared.health.clone();
                match tokio::task::spawn_blocking(move || health.sample()).await {
                    Ok(Ok(written)) => debug!(written, "endpoint status sampled"),
                    Ok(Err(e)) => error!(error = %e, "endpoint status sample failed"),
                    Err(e) => error!(error = %e, "endpoint status task failed"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

/// Consumes session events until shutdown or until the session drops its sender.
async fn pump_events<S, C>(
    shared: Arc<Shared<S, C>>,
    mut events: mpsc::Receiver<SessionEvent>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: QueueStore,
    C: SmscSession,
{
    let mut handlers = JoinSet::new();
    loop {
        let event = tokio::select! {
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
            _ = shutdown.changed() => break,
        };

        match event {
            SessionEvent::Unit { unit, handled } => {
                handlers.spawn(handle_unit(shared.clone(), unit, handled));
            }
            SessionEvent::Connected { endpoint } => {
                let health = shared.health.clone();
                handlers.spawn(async move {
                    record_connectivity(health, endpoint, None).await;
                });
            }
            SessionEvent::Disconnected { reason, endpoint } => {
                warn!(endpoint = %endpoint, reason = %reason, "endpoint disconnected");
                let health = shared.health.clone();
                handlers.spawn(async move {
                    record_connectivity(health, endpoint, Some(reason)).await;
                });
            }
        }

        while let Some(result) = handlers.try_join_next() {
            if let Err(e) = result {
                error!(error = %e, "session event handler failed");
            }
        }
    }

    while let Some(result) = handlers.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "session event handler failed");
        }
    }
}

async fn handle_unit<S, C>(
    shared: Arc<Shared<S, C>>,
    unit: InboundUnit,
    handled: Option<oneshot::Sender<bool>>,
) where
    S: QueueStore,
    C: SmscSession,
{
    let verdict = if unit.is_delivery_receipt() {
        shared.correlator.on_receipt(&unit).await
    } else {
        // Ingestion is a run of synchronous store writes.
        let ingest = shared.clone();
        match tokio::task::spawn_blocking(move || ingest.ingest.on_unit(&unit)).await {
            Ok(verdict) => verdict,
            Err(e) => {
                error!(error = %e, "inbound unit task failed");
                false
            }
        }
    };
    if let Some(handled) = handled {
        let _ = handled.send(verdict);
    }
}

/// `reason` is `None` for a connect.
async fn record_connectivity<S, C>(
    health: Arc<HealthMonitor<S, C>>,
    endpoint: String,
    reason: Option<String>,
) where
    S: QueueStore,
    C: SmscSession,
{
    let result = tokio::task::spawn_blocking(move || match reason {
        None => health.record_connected(&endpoint),
        Some(reason) => health.record_disconnected(&endpoint, &reason),
    })
    .await;
    match result {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => error!(error = %e, "endpoint status write failed"),
        Err(e) => error!(error = %e, "endpoint status task failed"),
    }
}
