//! Shared handler state

use crate::application::{IntentProcessor, SessionBroker};
use crate::domain::account::AccountRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub broker: SessionBroker,
    pub intents: IntentProcessor,
    pub accounts: Arc<AccountRegistry>,
}

impl AppState {
    pub fn new(broker: SessionBroker, intents: IntentProcessor) -> Self {
        let accounts = intents.accounts().clone();
        Self {
            broker,
            intents,
            accounts,
        }
    }
}
