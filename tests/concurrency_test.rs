//! Many controllers and a live provider hammering the broker from
//! several worker threads at once.

mod common;

use callbroker::application::{
    BrokerSettings, ControllerCommand, IntentProcessor, ProviderConnection, SessionBroker,
};
use callbroker::domain::account::{Account, AccountRegistry};
use callbroker::domain::audio::AudioDirective;
use callbroker::domain::call::CallState;
use callbroker::domain::identity::CallerIdentity;
use callbroker::domain::shared::value_objects::AccountHandle;
use callbroker::infrastructure::audio::RecordingAudioCoordinator;
use callbroker::infrastructure::identity::DirectoryResolver;
use callbroker::infrastructure::provider::{LoopbackProvider, LoopbackSettings};
use common::Harness;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

const CALLERS: usize = 8;
const CALLS_PER_CALLER: usize = 10;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_no_deadlock_under_concurrent_load() {
    let audio = Arc::new(RecordingAudioCoordinator::new());
    let broker = SessionBroker::spawn(BrokerSettings::default(), audio.clone(), None);

    let connection = ProviderConnection::new("loop");
    let loopback = Arc::new(LoopbackProvider::new(
        connection.clone(),
        LoopbackSettings {
            auto_answer: Some(Duration::from_millis(1)),
            ..LoopbackSettings::default()
        },
    ));
    broker
        .bind_provider(connection, loopback.clone())
        .await
        .unwrap();

    let accounts = Arc::new(AccountRegistry::new());
    let line = AccountHandle::new("loop", "line1");
    accounts.register(Account::new(line.clone(), "Line 1").with_schemes(["tel"]));
    accounts.set_default_outgoing(&line).unwrap();
    let intents = IntentProcessor::new(accounts, broker.clone(), "tel");

    let work = async {
        // Observers that only read, attaching and detaching as they go
        let watchers = (0..4).map(|_| {
            let broker = broker.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    let mut controller = broker.attach_controller().await.unwrap();
                    while controller.try_next_event().is_some() {}
                    let _ = broker.snapshot();
                    tokio::task::yield_now().await;
                }
            })
        });

        let callers = (0..CALLERS).map(|n| {
            let broker = broker.clone();
            let intents = intents.clone();
            tokio::spawn(async move {
                let controller = broker.attach_controller().await.unwrap();
                for i in 0..CALLS_PER_CALLER {
                    let number = format!("650-555-{:02}{:02}", n, i);
                    let id = intents.place_call(&number, None).await.unwrap();
                    if i % 2 == 0 {
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        let _ = controller
                            .execute(ControllerCommand::Hold { call_id: id })
                            .await;
                    }
                    // The call may already be gone; only the broker's answer matters
                    let _ = controller.disconnect(id).await;
                }
            })
        });

        let watchers: Vec<_> = watchers.collect();
        let callers: Vec<_> = callers.collect();
        for result in join_all(callers).await {
            result.unwrap();
        }
        for result in join_all(watchers).await {
            result.unwrap();
        }

        while !broker.snapshot().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Effects of the last mutation are dispatched after the registry
        // lock is released; one more round trip waits them out.
        drop(broker.attach_controller().await.unwrap());
    };

    tokio::time::timeout(Duration::from_secs(20), work)
        .await
        .expect("broker stalled under concurrent load");

    assert_eq!(loopback.live_calls(), 0);
    let directives = audio.directives();
    let requested = directives
        .iter()
        .filter(|d| **d == AudioDirective::RequestFocus)
        .count();
    let abandoned = directives
        .iter()
        .filter(|d| **d == AudioDirective::AbandonFocus)
        .count();
    assert!(requested >= 1);
    assert_eq!(requested, abandoned);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_identity_completions_race_provider_activations() {
    const INCOMING: usize = 32;
    const OUTGOING: usize = 32;

    let directory = DirectoryResolver::new().with_latency(Duration::from_millis(1));
    for n in 0..INCOMING {
        directory
            .insert(format!("650-555-{:04}", n), CallerIdentity::named(format!("Caller {}", n)))
            .await;
    }
    let h = Harness::with_identity(Arc::new(directory)).await;

    let work = async {
        let mut incoming = Vec::new();
        for n in 0..INCOMING {
            let id = h
                .intents
                .process_incoming_call(&h.account, &format!("650-555-{:04}", n))
                .await
                .unwrap();
            incoming.push((id, n));
        }
        let mut outgoing = Vec::new();
        for n in 0..OUTGOING {
            outgoing.push(h.intents.place_call(&format!("650-556-{:04}", n), None).await.unwrap());
        }

        // Provider callbacks arrive from plain threads while lookups
        // complete on runtime workers.
        let acknowledge = {
            let connection = h.connection.clone();
            let ids: Vec<_> = incoming.iter().map(|(id, _)| *id).collect();
            std::thread::spawn(move || {
                for id in ids {
                    connection.connection_created(id, CallState::New, Default::default());
                }
            })
        };
        let mut threads: Vec<_> = outgoing
            .chunks(OUTGOING / 4)
            .map(|chunk| {
                let connection = h.connection.clone();
                let chunk = chunk.to_vec();
                std::thread::spawn(move || {
                    for id in chunk {
                        connection.connection_created(id, CallState::Dialing, Default::default());
                        connection.set_active(id);
                    }
                })
            })
            .collect();
        threads.push(acknowledge);
        for thread in threads {
            thread.join().unwrap();
        }

        loop {
            h.sync().await;
            let named = incoming.iter().all(|(id, n)| {
                h.broker.call(id).and_then(|call| call.caller_display_name)
                    == Some(format!("Caller {}", n))
            });
            let active = outgoing
                .iter()
                .all(|id| h.state(id) == Some(CallState::Active));
            if named && active {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };

    tokio::time::timeout(Duration::from_secs(20), work)
        .await
        .expect("identity lookups and activations did not settle");

    assert_eq!(h.broker.snapshot().len(), INCOMING + OUTGOING);
    assert_eq!(h.broker.count_in_state(CallState::New), INCOMING);
}
