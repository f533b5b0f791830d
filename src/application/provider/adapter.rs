//! Provider adapter - ordered command forwarding to a connection service

use crate::application::provider::connection::ProviderConnection;
use crate::domain::provider::{ConnectionService, ProviderCommand, ProviderError};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::value_objects::ProviderId;
use crate::domain::shared::Result;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Broker-side end of one provider binding.
///
/// `send` never waits on the provider: commands are queued and a
/// forwarding task hands them to [`ConnectionService::on_command`] one at a
/// time, in order. An `Unreachable` answer marks the connection lost, which
/// every subscriber (the broker included) observes through the connection.
/// Dropping the adapter lets already queued commands drain.
pub struct ProviderAdapter {
    provider_id: ProviderId,
    tx: mpsc::UnboundedSender<ProviderCommand>,
}

impl ProviderAdapter {
    pub fn spawn(connection: Arc<ProviderConnection>, service: Arc<dyn ConnectionService>) -> Self {
        let provider_id = connection.provider_id().clone();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(forward(connection, service, rx));
        info!("Provider adapter started for {}", provider_id);
        Self { provider_id, tx }
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    /// Queue a command. Fails once the provider has been lost.
    pub fn send(&self, command: ProviderCommand) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| DomainError::ProviderLost(self.provider_id.clone()))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

async fn forward(
    connection: Arc<ProviderConnection>,
    service: Arc<dyn ConnectionService>,
    mut rx: mpsc::UnboundedReceiver<ProviderCommand>,
) {
    while let Some(command) = rx.recv().await {
        let name = command.name();
        let session = command.session_id();
        let hold = matches!(command, ProviderCommand::Hold { .. });
        match service.on_command(command).await {
            Ok(()) => debug!(
                "Provider {} accepted {} ({:?})",
                connection.provider_id(),
                name,
                session
            ),
            Err(ProviderError::Rejected(reason)) => {
                warn!(
                    "Provider {} rejected {} ({:?}): {}",
                    connection.provider_id(),
                    name,
                    session,
                    reason
                );
                if let (true, Some(session_id)) = (hold, session) {
                    connection.hold_failed(session_id);
                }
            }
            Err(ProviderError::Unreachable(reason)) => {
                connection.lost(&reason);
                break;
            }
        }
    }
    debug!("Provider adapter for {} stopped", connection.provider_id());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::provider::connection::ProviderObserver;
    use crate::domain::provider::ProviderEvent;
    use crate::domain::shared::value_objects::SessionId;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<ProviderCommand>>,
        fail_after: Option<usize>,
    }

    #[async_trait]
    impl ConnectionService for Recording {
        async fn on_command(&self, command: ProviderCommand) -> std::result::Result<(), ProviderError> {
            let mut seen = self.seen.lock();
            if self.fail_after.map_or(false, |n| seen.len() >= n) {
                return Err(ProviderError::Unreachable("gone".to_string()));
            }
            seen.push(command);
            Ok(())
        }
    }

    #[derive(Default)]
    struct LostFlag(Mutex<Option<String>>);

    impl ProviderObserver for LostFlag {
        fn on_event(&self, _provider_id: &ProviderId, _event: ProviderEvent) {}

        fn on_lost(&self, _provider_id: &ProviderId, reason: &str) {
            *self.0.lock() = Some(reason.to_string());
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn test_commands_forwarded_in_order() {
        let connection = ProviderConnection::new("pstn");
        let service = Arc::new(Recording::default());
        let adapter = ProviderAdapter::spawn(connection, service.clone());

        let ids: Vec<SessionId> = (0..5).map(|_| SessionId::new()).collect();
        for id in &ids {
            adapter.send(ProviderCommand::Hold { session_id: *id }).unwrap();
        }
        settle().await;

        let seen: Vec<Option<SessionId>> =
            service.seen.lock().iter().map(|c| c.session_id()).collect();
        assert_eq!(seen, ids.into_iter().map(Some).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_unreachable_marks_connection_lost() {
        let connection = ProviderConnection::new("pstn");
        let flag = Arc::new(LostFlag::default());
        connection.subscribe(flag.clone());

        let service = Arc::new(Recording {
            fail_after: Some(1),
            ..Default::default()
        });
        let adapter = ProviderAdapter::spawn(connection.clone(), service);

        adapter.send(ProviderCommand::Disconnect { session_id: SessionId::new() }).unwrap();
        adapter.send(ProviderCommand::Disconnect { session_id: SessionId::new() }).unwrap();
        settle().await;

        assert!(connection.is_lost());
        assert_eq!(flag.0.lock().as_deref(), Some("gone"));
        assert!(adapter.is_closed());
        assert_eq!(
            adapter.send(ProviderCommand::StopTone { session_id: SessionId::new() }),
            Err(DomainError::ProviderLost(ProviderId::new("pstn")))
        );
    }

    struct Refusing;

    #[async_trait]
    impl ConnectionService for Refusing {
        async fn on_command(&self, _command: ProviderCommand) -> std::result::Result<(), ProviderError> {
            Err(ProviderError::Rejected("busy".to_string()))
        }
    }

    #[derive(Default)]
    struct Events(Mutex<Vec<ProviderEvent>>);

    impl ProviderObserver for Events {
        fn on_event(&self, _provider_id: &ProviderId, event: ProviderEvent) {
            self.0.lock().push(event);
        }

        fn on_lost(&self, _provider_id: &ProviderId, _reason: &str) {}
    }

    #[tokio::test]
    async fn test_rejected_hold_is_reported_as_hold_failed() {
        let connection = ProviderConnection::new("pstn");
        let events = Arc::new(Events::default());
        connection.subscribe(events.clone());
        let adapter = ProviderAdapter::spawn(connection.clone(), Arc::new(Refusing));

        let held = SessionId::new();
        adapter.send(ProviderCommand::Hold { session_id: held }).unwrap();
        adapter.send(ProviderCommand::Unhold { session_id: SessionId::new() }).unwrap();
        settle().await;

        assert_eq!(
            *events.0.lock(),
            vec![ProviderEvent::HoldFailed { session_id: held }]
        );
        assert!(!connection.is_lost());
    }
}
