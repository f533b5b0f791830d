//! Controller fan-out
//!
//! The hub is owned by the broker worker, so every attached controller
//! sees notifications in exactly the order the worker produced them.

use crate::application::controller::event::ControllerEvent;
use crate::domain::shared::value_objects::ControllerId;
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct ControllerHub {
    /// Attach order is kept so fan-out is deterministic
    controllers: Vec<(ControllerId, mpsc::UnboundedSender<ControllerEvent>)>,
}

impl ControllerHub {
    pub fn new() -> Self {
        Self {
            controllers: Vec::new(),
        }
    }

    /// Attach a controller, queueing `catch_up` ahead of any later delta
    pub fn attach(
        &mut self,
        catch_up: Vec<ControllerEvent>,
    ) -> (ControllerId, mpsc::UnboundedReceiver<ControllerEvent>) {
        let id = ControllerId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let count = catch_up.len();
        for event in catch_up {
            // Receiver is still in hand, send cannot fail
            let _ = tx.send(event);
        }
        self.controllers.push((id, tx));
        info!("Controller {} attached ({} catch-up events)", id, count);
        (id, rx)
    }

    pub fn detach(&mut self, id: &ControllerId) -> bool {
        let before = self.controllers.len();
        self.controllers.retain(|(existing, _)| existing != id);
        let removed = before != self.controllers.len();
        if removed {
            info!("Controller {} detached", id);
        }
        removed
    }

    /// Send every event to every controller. Controllers whose receiver is
    /// gone are pruned; returns how many were.
    pub fn broadcast(&mut self, events: &[ControllerEvent]) -> usize {
        if events.is_empty() {
            return 0;
        }

        let before = self.controllers.len();
        self.controllers.retain(|(id, tx)| {
            for event in events {
                if tx.send(event.clone()).is_err() {
                    debug!("Pruning controller {}: receiver dropped", id);
                    return false;
                }
            }
            true
        });
        before - self.controllers.len()
    }

    pub fn contains(&self, id: &ControllerId) -> bool {
        self.controllers.iter().any(|(existing, _)| existing == id)
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

impl Default for ControllerHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::value_objects::SessionId;

    fn removed(id: SessionId) -> ControllerEvent {
        ControllerEvent::CallRemoved { call_id: id }
    }

    #[test]
    fn test_catch_up_precedes_deltas() {
        let mut hub = ControllerHub::new();
        let first = SessionId::new();
        let second = SessionId::new();

        let (_, mut rx) = hub.attach(vec![removed(first)]);
        hub.broadcast(&[removed(second)]);

        assert_eq!(rx.try_recv().unwrap(), removed(first));
        assert_eq!(rx.try_recv().unwrap(), removed(second));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_prunes_dropped_receivers() {
        let mut hub = ControllerHub::new();
        let (_, rx_a) = hub.attach(Vec::new());
        let (b, mut rx_b) = hub.attach(Vec::new());
        drop(rx_a);

        assert_eq!(hub.broadcast(&[removed(SessionId::new())]), 1);
        assert_eq!(hub.len(), 1);
        assert!(hub.contains(&b));
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn test_detach() {
        let mut hub = ControllerHub::new();
        let (id, _rx) = hub.attach(Vec::new());
        assert!(hub.detach(&id));
        assert!(!hub.detach(&id));
        assert!(hub.is_empty());
    }
}
