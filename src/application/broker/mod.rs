//! Session broker
//!
//! All registry mutations are funnelled through one command queue drained
//! by a single worker task. The worker takes the registry write lock, lets
//! [`BrokerCore`] apply the mutation, releases the lock and only then talks
//! to providers, controllers, the audio coordinator and the identity
//! resolver. Nothing outbound ever runs with the lock held, so a callback
//! re-entering the broker from another thread can only ever enqueue.

mod command;
pub mod effect;
pub mod state_machine;

pub use state_machine::BrokerCore;
pub use effect::Effects;

use crate::application::controller::{ControllerCommand, ControllerEvent, ControllerHandle, ControllerHub};
use crate::application::provider::{ProviderAdapter, ProviderConnection, ProviderObserver, SubscriptionId};
use crate::config::BrokerConfig;
use crate::domain::audio::AudioCoordinator;
use crate::domain::call::{CallDirection, CallSnapshot, CallState, ConferenceSnapshot, SessionRegistry};
use crate::domain::identity::IdentityResolver;
use crate::domain::provider::{ConnectionService, ProviderEvent};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::{
    AccountHandle, Address, ControllerId, ProviderId, SessionId,
};
use crate::domain::shared::Result;
use crate::infrastructure::metrics;
use command::{BrokerCommand, Reply};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Timing knobs of the broker worker
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// How long a provider has to acknowledge a create request
    pub create_timeout: Duration,
    /// Identity lookups slower than this are abandoned
    pub identity_timeout: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            create_timeout: Duration::from_secs(5),
            identity_timeout: Duration::from_secs(2),
        }
    }
}

impl From<&BrokerConfig> for BrokerSettings {
    fn from(config: &BrokerConfig) -> Self {
        Self {
            create_timeout: Duration::from_millis(config.create_timeout_ms),
            identity_timeout: Duration::from_millis(config.identity_timeout_ms),
        }
    }
}

/// Cloneable handle to the broker worker.
///
/// Mutating calls enqueue a command and wait for the worker's answer;
/// they return once the resulting provider commands have been queued,
/// not once the provider has acted. Read-only queries take the registry
/// read lock directly.
#[derive(Clone)]
pub struct SessionBroker {
    tx: mpsc::UnboundedSender<BrokerCommand>,
    registry: Arc<RwLock<SessionRegistry>>,
}

impl SessionBroker {
    /// Start the worker on the current tokio runtime
    pub fn spawn(
        settings: BrokerSettings,
        audio: Arc<dyn AudioCoordinator>,
        identity: Option<Arc<dyn IdentityResolver>>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(RwLock::new(SessionRegistry::new()));

        let worker = BrokerWorker {
            registry: registry.clone(),
            core: BrokerCore::new(),
            hub: ControllerHub::new(),
            adapters: HashMap::new(),
            settings,
            audio,
            identity,
            tx: tx.downgrade(),
        };
        tokio::spawn(worker.run(rx));
        info!("Session broker started");

        Self { tx, registry }
    }

    /// Bind a provider: its events start flowing into the broker and
    /// sessions can be created on its accounts.
    pub async fn bind_provider(
        &self,
        connection: Arc<ProviderConnection>,
        service: Arc<dyn ConnectionService>,
    ) -> Result<()> {
        self.request(|reply| BrokerCommand::BindProvider {
            connection,
            service,
            reply,
        })
        .await
    }

    /// Unbind a provider. Its sessions are disconnected as if it was lost.
    pub async fn unbind_provider(&self, provider_id: &ProviderId) -> Result<()> {
        let provider_id = provider_id.clone();
        self.request(|reply| BrokerCommand::UnbindProvider { provider_id, reply })
            .await
    }

    /// Create a session and ask its provider to connect it. Returns as soon
    /// as the create command is queued; the provider confirms later.
    pub async fn create_session(
        &self,
        account: AccountHandle,
        address: Address,
        direction: CallDirection,
    ) -> Result<SessionId> {
        self.request(|reply| BrokerCommand::CreateSession {
            account,
            address,
            direction,
            reply,
        })
        .await
    }

    /// Attach a controller. The returned handle already holds the full
    /// catch-up; every later delta follows it in order.
    pub async fn attach_controller(&self) -> Result<ControllerHandle> {
        let (id, events) = self.request(|reply| BrokerCommand::Attach { reply }).await?;
        Ok(ControllerHandle::new(id, self.clone(), events))
    }

    /// Run a command on behalf of an attached controller. Fails with
    /// `ControllerDetached` once that controller has detached.
    pub async fn execute(&self, controller_id: ControllerId, command: ControllerCommand) -> Result<()> {
        self.request(|reply| BrokerCommand::Controller {
            controller_id,
            command,
            reply,
        })
        .await
    }

    /// Detach immediately; nothing is sent to providers
    pub fn detach(&self, controller_id: ControllerId) {
        let _ = self.tx.send(BrokerCommand::Detach { controller_id });
    }

    /// Stop the worker. Attached controllers see their event stream end.
    pub fn shutdown(&self) {
        let _ = self.tx.send(BrokerCommand::Shutdown);
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }

    pub fn snapshot(&self) -> Vec<CallSnapshot> {
        self.registry.read().snapshots()
    }

    pub fn conference_snapshots(&self) -> Vec<ConferenceSnapshot> {
        self.registry.read().conference_snapshots()
    }

    pub fn call(&self, session_id: &SessionId) -> Option<CallSnapshot> {
        self.registry.read().get(session_id).map(|call| call.snapshot())
    }

    pub fn count_in_state(&self, state: CallState) -> usize {
        self.registry.read().count_in_state(state)
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> BrokerCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| DomainError::BrokerUnavailable)?;
        rx.await.map_err(|_| DomainError::BrokerUnavailable)?
    }
}

/// Forwards a provider's events into the broker queue
struct BrokerObserver {
    tx: mpsc::WeakUnboundedSender<BrokerCommand>,
}

impl ProviderObserver for BrokerObserver {
    fn on_event(&self, provider_id: &ProviderId, event: ProviderEvent) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(BrokerCommand::Provider {
                provider_id: provider_id.clone(),
                event,
            });
        }
    }

    fn on_lost(&self, provider_id: &ProviderId, reason: &str) {
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(BrokerCommand::ProviderLost {
                provider_id: provider_id.clone(),
                reason: reason.to_string(),
            });
        }
    }
}

struct Binding {
    adapter: ProviderAdapter,
    connection: Arc<ProviderConnection>,
    subscription: SubscriptionId,
}

struct BrokerWorker {
    registry: Arc<RwLock<SessionRegistry>>,
    core: BrokerCore,
    hub: ControllerHub,
    adapters: HashMap<ProviderId, Binding>,
    settings: BrokerSettings,
    audio: Arc<dyn AudioCoordinator>,
    identity: Option<Arc<dyn IdentityResolver>>,
    /// Weak so the queue closes once every public handle is gone
    tx: mpsc::WeakUnboundedSender<BrokerCommand>,
}

impl BrokerWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<BrokerCommand>) {
        while let Some(command) = rx.recv().await {
            if matches!(command, BrokerCommand::Shutdown) {
                info!("Session broker shutting down");
                break;
            }
            self.handle(command);
        }

        for (_, binding) in self.adapters.drain() {
            binding.connection.unsubscribe(binding.subscription);
        }
        debug!("Session broker worker stopped");
    }

    fn handle(&mut self, command: BrokerCommand) {
        let mut fx = Effects::new();
        match command {
            BrokerCommand::BindProvider {
                connection,
                service,
                reply,
            } => {
                let result = self.bind(connection, service);
                let _ = reply.send(result);
            }
            BrokerCommand::UnbindProvider { provider_id, reply } => {
                let result = if self.unbind(&provider_id) {
                    self.provider_gone(&mut fx, &provider_id, "provider unbound");
                    Ok(())
                } else {
                    Err(DomainError::ProviderNotBound(provider_id))
                };
                self.dispatch(fx);
                let _ = reply.send(result);
            }
            BrokerCommand::Provider { provider_id, event } => {
                let name = event.name();
                let session = event.session_id();
                let result = {
                    let mut registry = self.registry.write();
                    self.core
                        .apply_provider_event(&mut registry, &mut fx, &provider_id, event)
                };
                if let Err(e) = result {
                    warn!(
                        "Provider {} event {} ({:?}) refused: {}",
                        provider_id, name, session, e
                    );
                    metrics::record_provider_event_refused(name, e.code());
                }
                self.dispatch(fx);
            }
            BrokerCommand::ProviderLost {
                provider_id,
                reason,
            } => {
                if self.unbind(&provider_id) {
                    self.provider_gone(&mut fx, &provider_id, &reason);
                    self.dispatch(fx);
                }
            }
            BrokerCommand::CreateSession {
                account,
                address,
                direction,
                reply,
            } => {
                let result = {
                    let mut registry = self.registry.write();
                    self.core
                        .create_session(&mut registry, &mut fx, account, address, direction)
                };
                self.dispatch(fx);
                let _ = reply.send(result);
            }
            BrokerCommand::Attach { reply } => {
                let catch_up = {
                    let registry = self.registry.read();
                    self.core.catch_up(&registry)
                };
                let attached = self.hub.attach(catch_up);
                metrics::set_attached_controllers(self.hub.len());
                let _ = reply.send(Ok(attached));
            }
            BrokerCommand::Detach { controller_id } => {
                self.hub.detach(&controller_id);
                metrics::set_attached_controllers(self.hub.len());
            }
            BrokerCommand::Controller {
                controller_id,
                command,
                reply,
            } => {
                let name = command.name();
                let result = if !self.hub.contains(&controller_id) {
                    Err(DomainError::ControllerDetached(controller_id))
                } else {
                    let mut registry = self.registry.write();
                    self.core
                        .apply_controller_command(&mut registry, &mut fx, command)
                };
                match &result {
                    Ok(()) => debug!("Controller {} {} accepted", controller_id, name),
                    Err(e) => info!("Controller {} {} refused: {}", controller_id, name, e),
                }
                self.dispatch(fx);
                let _ = reply.send(result);
            }
            BrokerCommand::IdentityResolved {
                session_id,
                identity,
            } => {
                let result = {
                    let mut registry = self.registry.write();
                    self.core
                        .identity_resolved(&mut registry, &mut fx, session_id, identity)
                };
                if let Err(e) = result {
                    debug!("Identity for {} arrived too late: {}", session_id, e);
                }
                self.dispatch(fx);
            }
            BrokerCommand::CreateTimeout { session_id } => {
                let aborted = {
                    let mut registry = self.registry.write();
                    self.core.create_timed_out(&mut registry, &mut fx, session_id)
                };
                if aborted {
                    self.dispatch(fx);
                }
            }
            BrokerCommand::Shutdown => {}
        }
    }

    fn bind(
        &mut self,
        connection: Arc<ProviderConnection>,
        service: Arc<dyn ConnectionService>,
    ) -> Result<()> {
        let provider_id = connection.provider_id().clone();
        if self.adapters.contains_key(&provider_id) {
            return Err(DomainError::ValidationError(format!(
                "provider {} is already bound",
                provider_id
            )));
        }
        if connection.is_lost() {
            return Err(DomainError::ProviderLost(provider_id));
        }

        let adapter = ProviderAdapter::spawn(connection.clone(), service);
        let subscription = connection.subscribe(Arc::new(BrokerObserver {
            tx: self.tx.clone(),
        }));
        self.core.bind_provider(provider_id.clone());
        self.adapters.insert(
            provider_id.clone(),
            Binding {
                adapter,
                connection,
                subscription,
            },
        );
        info!("Provider {} bound", provider_id);
        Ok(())
    }

    /// Drop the binding; returns false if the provider was not bound
    fn unbind(&mut self, provider_id: &ProviderId) -> bool {
        match self.adapters.remove(provider_id) {
            Some(binding) => {
                binding.connection.unsubscribe(binding.subscription);
                true
            }
            None => false,
        }
    }

    fn provider_gone(&mut self, fx: &mut Effects, provider_id: &ProviderId, reason: &str) {
        let mut registry = self.registry.write();
        self.core.provider_lost(&mut registry, fx, provider_id, reason);
    }

    /// Carry out the effects of one mutation. Runs without the registry lock.
    fn dispatch(&mut self, fx: Effects) {
        for (provider_id, command) in fx.provider_commands {
            match self.adapters.get(&provider_id) {
                Some(binding) => {
                    let name = command.name();
                    if let Err(e) = binding.adapter.send(command) {
                        warn!("Could not send {} to {}: {}", name, provider_id, e);
                    }
                }
                None => warn!(
                    "Dropping {} for unbound provider {}",
                    command.name(),
                    provider_id
                ),
            }
        }

        for directive in fx.audio {
            debug!("Audio directive {:?}", directive);
            self.audio.apply(directive);
        }

        for notification in &fx.notifications {
            match notification {
                ControllerEvent::CallAdded { call } => {
                    metrics::record_session_created(call.direction)
                }
                ControllerEvent::StateChanged {
                    state: CallState::Disconnected,
                    cause,
                    ..
                } => metrics::record_session_disconnected(cause.as_ref()),
                _ => {}
            }
        }
        let pruned = self.hub.broadcast(&fx.notifications);
        if pruned > 0 {
            info!("Pruned {} detached controllers", pruned);
        }

        for (session_id, address) in fx.resolve {
            self.resolve_identity(session_id, address);
        }
        for session_id in fx.arm_timeouts {
            self.arm_create_timeout(session_id);
        }

        metrics::set_live_sessions(self.registry.read().live_count());
        metrics::set_attached_controllers(self.hub.len());
    }

    fn resolve_identity(&self, session_id: SessionId, address: Address) {
        let resolver = match &self.identity {
            Some(resolver) => resolver.clone(),
            None => return,
        };
        let tx = self.tx.clone();
        let limit = self.settings.identity_timeout;

        tokio::spawn(async move {
            match tokio::time::timeout(limit, resolver.resolve(&address)).await {
                Ok(Some(identity)) => {
                    if let Some(tx) = tx.upgrade() {
                        let _ = tx.send(BrokerCommand::IdentityResolved {
                            session_id,
                            identity,
                        });
                    }
                }
                Ok(None) => debug!("No identity known for {}", address),
                Err(_) => warn!("Identity lookup for {} timed out", address),
            }
        });
    }

    fn arm_create_timeout(&self, session_id: SessionId) {
        let tx = self.tx.clone();
        let limit = self.settings.create_timeout;

        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(BrokerCommand::CreateTimeout { session_id });
            }
        });
    }
}
