//! Shared harness: a broker bound to a scripted provider whose commands
//! the test reads back, plus a recording audio coordinator.

#![allow(dead_code)]

use async_trait::async_trait;
use callbroker::application::{
    BrokerSettings, ControllerEvent, ControllerHandle, IntentProcessor, ProviderConnection,
    SessionBroker,
};
use callbroker::domain::account::{Account, AccountRegistry};
use callbroker::domain::call::{CallState, DisconnectCode};
use callbroker::domain::identity::IdentityResolver;
use callbroker::domain::provider::{ConnectionService, ProviderCommand, ProviderError};
use callbroker::domain::shared::value_objects::{AccountHandle, SessionId};
use callbroker::infrastructure::audio::RecordingAudioCoordinator;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

pub const PROVIDER: &str = "pstn";
pub const WAIT: Duration = Duration::from_secs(2);

/// Records every command; answers `Unreachable` once told to
pub struct ScriptedProvider {
    commands: mpsc::UnboundedSender<ProviderCommand>,
    unreachable: AtomicBool,
}

impl ScriptedProvider {
    pub fn go_unreachable(&self) {
        self.unreachable.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionService for ScriptedProvider {
    async fn on_command(&self, command: ProviderCommand) -> Result<(), ProviderError> {
        let _ = self.commands.send(command);
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(ProviderError::Unreachable("link down".to_string()));
        }
        Ok(())
    }
}

pub struct Harness {
    pub broker: SessionBroker,
    pub intents: IntentProcessor,
    pub accounts: Arc<AccountRegistry>,
    pub connection: Arc<ProviderConnection>,
    pub provider: Arc<ScriptedProvider>,
    pub audio: Arc<RecordingAudioCoordinator>,
    pub account: AccountHandle,
    commands: Mutex<mpsc::UnboundedReceiver<ProviderCommand>>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_settings(BrokerSettings::default()).await
    }

    pub async fn with_settings(settings: BrokerSettings) -> Self {
        Self::build(settings, None).await
    }

    pub async fn with_identity(identity: Arc<dyn IdentityResolver>) -> Self {
        Self::build(BrokerSettings::default(), Some(identity)).await
    }

    async fn build(settings: BrokerSettings, identity: Option<Arc<dyn IdentityResolver>>) -> Self {
        let audio = Arc::new(RecordingAudioCoordinator::new());
        let broker = SessionBroker::spawn(settings, audio.clone(), identity);

        let (tx, rx) = mpsc::unbounded_channel();
        let provider = Arc::new(ScriptedProvider {
            commands: tx,
            unreachable: AtomicBool::new(false),
        });
        let connection = ProviderConnection::new(PROVIDER);
        broker
            .bind_provider(connection.clone(), provider.clone())
            .await
            .unwrap();

        let account = AccountHandle::new(PROVIDER, "A0");
        let accounts = Arc::new(AccountRegistry::new());
        accounts.register(Account::new(account.clone(), "Line A0").with_schemes(["tel"]));
        accounts.set_default_outgoing(&account).unwrap();
        let intents = IntentProcessor::new(accounts.clone(), broker.clone(), "tel");

        Self {
            broker,
            intents,
            accounts,
            connection,
            provider,
            audio,
            account,
            commands: Mutex::new(rx),
        }
    }

    pub async fn controller(&self) -> ControllerHandle {
        self.broker.attach_controller().await.unwrap()
    }

    /// Next command the provider received
    pub async fn next_command(&self) -> ProviderCommand {
        let mut commands = self.commands.lock().await;
        tokio::time::timeout(WAIT, commands.recv())
            .await
            .expect("provider command")
            .expect("command channel open")
    }

    pub async fn no_command(&self) {
        let mut commands = self.commands.lock().await;
        assert!(
            tokio::time::timeout(Duration::from_millis(50), commands.recv())
                .await
                .is_err(),
            "unexpected provider command"
        );
    }

    /// Returns once the broker has worked through everything queued so far
    pub async fn sync(&self) {
        drop(self.broker.attach_controller().await.unwrap());
    }

    /// Place an outgoing call and consume its `CreateConnection`
    pub async fn dial(&self, number: &str) -> SessionId {
        let id = self.intents.place_call(number, None).await.unwrap();
        match self.next_command().await {
            ProviderCommand::CreateConnection { session_id, .. } => assert_eq!(session_id, id),
            other => panic!("expected create_connection, got {:?}", other),
        }
        id
    }

    /// Dial and let the far end answer
    pub async fn connect(&self, number: &str) -> SessionId {
        let id = self.dial(number).await;
        self.connection
            .connection_created(id, CallState::Dialing, Default::default());
        self.connection.set_active(id);
        self.sync().await;
        id
    }

    /// Surface an incoming call and have the provider report it ringing
    pub async fn ring(&self, number: &str) -> SessionId {
        let id = self
            .intents
            .process_incoming_call(&self.account, number)
            .await
            .unwrap();
        match self.next_command().await {
            ProviderCommand::CreateConnection {
                session_id,
                is_incoming,
                ..
            } => {
                assert_eq!(session_id, id);
                assert!(is_incoming);
            }
            other => panic!("expected create_connection, got {:?}", other),
        }
        self.connection
            .connection_created(id, CallState::Ringing, Default::default());
        self.sync().await;
        id
    }

    pub fn state(&self, id: &SessionId) -> Option<CallState> {
        self.broker.call(id).map(|call| call.state)
    }
}

/// Skip events until one matches
pub async fn wait_for<F>(controller: &mut ControllerHandle, mut matches: F) -> ControllerEvent
where
    F: FnMut(&ControllerEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = controller.next_event().await.expect("broker running");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("controller event")
}

pub async fn wait_for_state(
    controller: &mut ControllerHandle,
    id: SessionId,
    state: CallState,
) -> ControllerEvent {
    wait_for(controller, |event| {
        matches!(event, ControllerEvent::StateChanged { call_id, state: s, .. }
            if *call_id == id && *s == state)
    })
    .await
}

pub fn cause_of(event: &ControllerEvent) -> Option<DisconnectCode> {
    match event {
        ControllerEvent::StateChanged { cause, .. } => cause.as_ref().map(|cause| cause.code),
        _ => None,
    }
}

/// State changes already delivered to `controller` for one call.
/// Everything queued is consumed.
pub fn state_path(
    controller: &mut ControllerHandle,
    id: SessionId,
) -> Vec<(CallState, Option<DisconnectCode>)> {
    let mut path = Vec::new();
    while let Some(event) = controller.try_next_event() {
        if let ControllerEvent::StateChanged {
            call_id,
            state,
            cause,
        } = event
        {
            if call_id == id {
                path.push((state, cause.map(|cause| cause.code)));
            }
        }
    }
    path
}

/// A controller's picture of the registry, rebuilt from its event stream
#[derive(Debug, Default, PartialEq)]
pub struct View {
    pub calls: HashMap<SessionId, CallState>,
}

impl View {
    pub fn apply(&mut self, event: &ControllerEvent) {
        match event {
            ControllerEvent::CallAdded { call } | ControllerEvent::DetailsChanged { call } => {
                self.calls.insert(call.id, call.state);
            }
            ControllerEvent::StateChanged { call_id, state, .. } => {
                self.calls.insert(*call_id, *state);
            }
            ControllerEvent::CallRemoved { call_id } => {
                self.calls.remove(call_id);
            }
            ControllerEvent::ConferenceAdded { members, .. } => {
                for call in members {
                    self.calls.insert(call.id, call.state);
                }
            }
            _ => {}
        }
    }

    /// Apply whatever is already queued for this controller
    pub fn drain(&mut self, controller: &mut ControllerHandle) {
        while let Some(event) = controller.try_next_event() {
            self.apply(&event);
        }
    }

    pub fn of(broker: &SessionBroker) -> Self {
        Self {
            calls: broker
                .snapshot()
                .into_iter()
                .map(|call| (call.id, call.state))
                .collect(),
        }
    }
}
