//! Messages drained by the broker worker

use crate::application::controller::{ControllerCommand, ControllerEvent};
use crate::application::provider::ProviderConnection;
use crate::domain::call::CallDirection;
use crate::domain::identity::CallerIdentity;
use crate::domain::provider::{ConnectionService, ProviderEvent};
use crate::domain::shared::value_objects::{
    AccountHandle, Address, ControllerId, ProviderId, SessionId,
};
use crate::domain::shared::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

/// Every mutation of the session registry enters through this queue,
/// whichever thread or task produced it.
pub(crate) enum BrokerCommand {
    BindProvider {
        connection: Arc<ProviderConnection>,
        service: Arc<dyn ConnectionService>,
        reply: Reply<()>,
    },
    UnbindProvider {
        provider_id: ProviderId,
        reply: Reply<()>,
    },
    Provider {
        provider_id: ProviderId,
        event: ProviderEvent,
    },
    ProviderLost {
        provider_id: ProviderId,
        reason: String,
    },
    CreateSession {
        account: AccountHandle,
        address: Address,
        direction: CallDirection,
        reply: Reply<SessionId>,
    },
    Attach {
        reply: Reply<(ControllerId, mpsc::UnboundedReceiver<ControllerEvent>)>,
    },
    Detach {
        controller_id: ControllerId,
    },
    Controller {
        controller_id: ControllerId,
        command: ControllerCommand,
        reply: Reply<()>,
    },
    IdentityResolved {
        session_id: SessionId,
        identity: CallerIdentity,
    },
    CreateTimeout {
        session_id: SessionId,
    },
    Shutdown,
}
