//! Provider connection - the event bus a provider publishes on
//!
//! A provider implementation holds an `Arc<ProviderConnection>` and reports
//! every state change through it. Each event is replayed to every observer
//! subscribed at the moment of delivery. Delivery, subscription and
//! unsubscription all take the same lock, so an observer that has been
//! unsubscribed never sees another event and one that has just been
//! subscribed never misses one.

use crate::domain::call::{
    CallCapabilities, CallDirection, CallState, ConferenceState, DisconnectCause, Presentation,
    VideoState,
};
use crate::domain::provider::ProviderEvent;
use crate::domain::shared::value_objects::{
    AccountHandle, Address, ConferenceId, ProviderId, SessionId,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Receives provider events.
///
/// Called with the connection lock held: implementations must not block
/// and must not call back into the same connection.
pub trait ProviderObserver: Send + Sync {
    fn on_event(&self, provider_id: &ProviderId, event: ProviderEvent);

    /// The provider is gone; no further events will follow
    fn on_lost(&self, provider_id: &ProviderId, reason: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscribers {
    next_id: u64,
    observers: Vec<(SubscriptionId, Arc<dyn ProviderObserver>)>,
    lost: bool,
}

pub struct ProviderConnection {
    provider_id: ProviderId,
    subscribers: Mutex<Subscribers>,
}

impl ProviderConnection {
    pub fn new(provider_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            provider_id: ProviderId::new(provider_id),
            subscribers: Mutex::new(Subscribers {
                next_id: 1,
                observers: Vec::new(),
                lost: false,
            }),
        })
    }

    pub fn provider_id(&self) -> &ProviderId {
        &self.provider_id
    }

    pub fn subscribe(&self, observer: Arc<dyn ProviderObserver>) -> SubscriptionId {
        let mut subscribers = self.subscribers.lock();
        let id = SubscriptionId(subscribers.next_id);
        subscribers.next_id += 1;
        subscribers.observers.push((id, observer));
        debug!(
            "Provider {} subscription {:?} added ({} total)",
            self.provider_id,
            id,
            subscribers.observers.len()
        );
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.observers.len();
        subscribers.observers.retain(|(existing, _)| *existing != id);
        before != subscribers.observers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().observers.len()
    }

    pub fn is_lost(&self) -> bool {
        self.subscribers.lock().lost
    }

    /// Publish one event to every current subscriber
    pub fn publish(&self, event: ProviderEvent) {
        let subscribers = self.subscribers.lock();
        if subscribers.lost {
            warn!(
                "Provider {} published {} after connection loss; dropped",
                self.provider_id,
                event.name()
            );
            return;
        }
        if subscribers.observers.is_empty() {
            debug!(
                "Provider {} published {} with no subscribers",
                self.provider_id,
                event.name()
            );
            return;
        }
        for (_, observer) in subscribers.observers.iter() {
            observer.on_event(&self.provider_id, event.clone());
        }
    }

    /// Mark the connection lost and tell every subscriber. Only the first
    /// call has an effect.
    pub fn lost(&self, reason: &str) {
        let mut subscribers = self.subscribers.lock();
        if subscribers.lost {
            return;
        }
        subscribers.lost = true;
        warn!("Provider {} lost: {}", self.provider_id, reason);
        for (_, observer) in subscribers.observers.iter() {
            observer.on_lost(&self.provider_id, reason);
        }
    }

    pub fn connection_created(&self, session_id: SessionId, state: CallState, capabilities: CallCapabilities) {
        self.publish(ProviderEvent::ConnectionCreated {
            session_id,
            state,
            capabilities,
        });
    }

    pub fn create_failed(&self, session_id: SessionId, cause: DisconnectCause) {
        self.publish(ProviderEvent::CreateFailed { session_id, cause });
    }

    pub fn set_dialing(&self, session_id: SessionId) {
        self.publish(ProviderEvent::SetDialing { session_id });
    }

    pub fn set_ringing(&self, session_id: SessionId) {
        self.publish(ProviderEvent::SetRinging { session_id });
    }

    pub fn set_active(&self, session_id: SessionId) {
        self.publish(ProviderEvent::SetActive { session_id });
    }

    pub fn set_on_hold(&self, session_id: SessionId) {
        self.publish(ProviderEvent::SetOnHold { session_id });
    }

    pub fn hold_failed(&self, session_id: SessionId) {
        self.publish(ProviderEvent::HoldFailed { session_id });
    }

    pub fn set_disconnected(&self, session_id: SessionId, cause: DisconnectCause) {
        self.publish(ProviderEvent::SetDisconnected { session_id, cause });
    }

    pub fn remove_call(&self, session_id: SessionId) {
        self.publish(ProviderEvent::RemoveCall { session_id });
    }

    pub fn set_capabilities(&self, session_id: SessionId, capabilities: CallCapabilities) {
        self.publish(ProviderEvent::CapabilitiesChanged {
            session_id,
            capabilities,
        });
    }

    pub fn set_conferenceable(&self, session_id: SessionId, peers: Vec<SessionId>) {
        self.publish(ProviderEvent::ConferenceableChanged { session_id, peers });
    }

    pub fn set_address(&self, session_id: SessionId, address: Address, presentation: Presentation) {
        self.publish(ProviderEvent::AddressChanged {
            session_id,
            address,
            presentation,
        });
    }

    pub fn set_caller_display_name(
        &self,
        session_id: SessionId,
        name: Option<String>,
        presentation: Presentation,
    ) {
        self.publish(ProviderEvent::CallerDisplayNameChanged {
            session_id,
            name,
            presentation,
        });
    }

    pub fn set_video_state(&self, session_id: SessionId, video_state: VideoState) {
        self.publish(ProviderEvent::VideoStateChanged {
            session_id,
            video_state,
        });
    }

    pub fn set_video_provider(&self, session_id: SessionId, video_provider: Option<String>) {
        self.publish(ProviderEvent::VideoProviderChanged {
            session_id,
            video_provider,
        });
    }

    pub fn post_dial_wait(&self, session_id: SessionId, remaining: Option<String>) {
        self.publish(ProviderEvent::PostDialWait {
            session_id,
            remaining,
        });
    }

    pub fn set_extras(&self, session_id: SessionId, extras: BTreeMap<String, String>) {
        self.publish(ProviderEvent::ExtrasChanged { session_id, extras });
    }

    pub fn conferenced(
        &self,
        conference_id: ConferenceId,
        account: AccountHandle,
        members: Vec<SessionId>,
        state: ConferenceState,
        capabilities: CallCapabilities,
    ) {
        self.publish(ProviderEvent::Conferenced {
            conference_id,
            account,
            members,
            state,
            capabilities,
        });
    }

    pub fn set_conferenced(&self, session_id: SessionId, conference_id: Option<ConferenceId>) {
        self.publish(ProviderEvent::SetConferenced {
            session_id,
            conference_id,
        });
    }

    pub fn set_conference_state(&self, conference_id: ConferenceId, state: ConferenceState) {
        self.publish(ProviderEvent::ConferenceStateChanged {
            conference_id,
            state,
        });
    }

    pub fn set_conference_capabilities(&self, conference_id: ConferenceId, capabilities: CallCapabilities) {
        self.publish(ProviderEvent::ConferenceCapabilitiesChanged {
            conference_id,
            capabilities,
        });
    }

    pub fn remove_conference(&self, conference_id: ConferenceId) {
        self.publish(ProviderEvent::RemoveConference { conference_id });
    }

    pub fn existing_connection_added(
        &self,
        session_id: SessionId,
        account: AccountHandle,
        address: Address,
        direction: CallDirection,
        state: CallState,
        capabilities: CallCapabilities,
    ) {
        self.publish(ProviderEvent::ExistingConnectionAdded {
            session_id,
            account,
            address,
            direction,
            state,
            capabilities,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
    use std::thread;

    #[derive(Default)]
    struct Counter {
        events: AtomicUsize,
        lost: AtomicUsize,
    }

    impl ProviderObserver for Counter {
        fn on_event(&self, _provider_id: &ProviderId, _event: ProviderEvent) {
            self.events.fetch_add(1, Ordering::SeqCst);
        }

        fn on_lost(&self, _provider_id: &ProviderId, _reason: &str) {
            self.lost.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_every_subscriber_sees_each_event() {
        let connection = ProviderConnection::new("pstn");
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());
        connection.subscribe(a.clone());
        let sub_b = connection.subscribe(b.clone());

        connection.set_dialing(SessionId::new());
        assert!(connection.unsubscribe(sub_b));
        assert!(!connection.unsubscribe(sub_b));
        connection.set_active(SessionId::new());

        assert_eq!(a.events.load(Ordering::SeqCst), 2);
        assert_eq!(b.events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lost_is_delivered_once() {
        let connection = ProviderConnection::new("pstn");
        let observer = Arc::new(Counter::default());
        connection.subscribe(observer.clone());

        connection.lost("socket closed");
        connection.lost("socket closed");
        connection.set_active(SessionId::new());

        assert!(connection.is_lost());
        assert_eq!(observer.lost.load(Ordering::SeqCst), 1);
        assert_eq!(observer.events.load(Ordering::SeqCst), 0);
    }

    /// Records the sequence number each published event carries
    #[derive(Default)]
    struct Sequence(Mutex<Vec<u64>>);

    impl ProviderObserver for Sequence {
        fn on_event(&self, _provider_id: &ProviderId, event: ProviderEvent) {
            if let ProviderEvent::PostDialWait {
                remaining: Some(seq),
                ..
            } = event
            {
                self.0.lock().push(seq.parse().unwrap());
            }
        }

        fn on_lost(&self, _provider_id: &ProviderId, _reason: &str) {}
    }

    fn wait_until(counter: &AtomicU64, target: u64) {
        while counter.load(Ordering::SeqCst) < target {
            thread::yield_now();
        }
    }

    #[test]
    fn test_subscription_races_delivery() {
        let connection = ProviderConnection::new("pstn");
        let session = SessionId::new();
        // `started` is bumped before an event is published, `done` after
        let started = Arc::new(AtomicU64::new(0));
        let done = Arc::new(AtomicU64::new(0));
        let stop = Arc::new(AtomicBool::new(false));

        let publisher = {
            let connection = connection.clone();
            let (started, done, stop) = (started.clone(), done.clone(), stop.clone());
            thread::spawn(move || {
                let mut seq = 0u64;
                while !stop.load(Ordering::SeqCst) {
                    started.store(seq + 1, Ordering::SeqCst);
                    connection.post_dial_wait(session, Some(seq.to_string()));
                    done.store(seq + 1, Ordering::SeqCst);
                    seq += 1;
                }
            })
        };

        for _ in 0..100 {
            let observer = Arc::new(Sequence::default());
            let id = connection.subscribe(observer.clone());
            // Every event numbered from here on began after subscribe returned
            let first_owed = started.load(Ordering::SeqCst);
            wait_until(&done, first_owed + 3);

            let published = done.load(Ordering::SeqCst);
            assert!(connection.unsubscribe(id));
            let at_unsubscribe = observer.0.lock().clone();
            wait_until(&done, done.load(Ordering::SeqCst) + 3);

            assert_eq!(*observer.0.lock(), at_unsubscribe, "delivery after unsubscribe");
            assert!(!at_unsubscribe.is_empty());
            assert!(
                at_unsubscribe.windows(2).all(|pair| pair[1] == pair[0] + 1),
                "gap or duplicate in {:?}",
                at_unsubscribe
            );
            assert!(at_unsubscribe[0] <= first_owed, "missed events after subscribe");
            assert!(*at_unsubscribe.last().unwrap() + 1 >= published);
        }

        stop.store(true, Ordering::SeqCst);
        publisher.join().unwrap();
        assert_eq!(connection.subscriber_count(), 0);
    }
}
