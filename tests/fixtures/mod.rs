// Shared fixtures for the integration suites.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use clearwater_loop::storage::memory::DemoSeed;
use clearwater_loop::{
    Actor, InMemoryStore, NotificationSender, OutboundNotification, ReferralCoordinator,
};

/// Transport fake that records every outbound message.
pub struct RecordingSender {
    pub sent: Mutex<Vec<OutboundNotification>>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    async fn send(&self, outbound: &OutboundNotification) -> anyhow::Result<()> {
        self.sent.lock().unwrap().push(outbound.clone());
        Ok(())
    }
}

/// Transport fake that always fails delivery.
pub struct FailingSender;

#[async_trait]
impl NotificationSender for FailingSender {
    async fn send(&self, _outbound: &OutboundNotification) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("transport unreachable"))
    }
}

/// A coordinator wired over the demo-seeded in-memory store.
pub struct TestLoop {
    pub store: Arc<InMemoryStore>,
    pub sender: Arc<RecordingSender>,
    pub coordinator: ReferralCoordinator,
    pub seed: DemoSeed,
}

impl TestLoop {
    pub fn new() -> Self {
        let (store, seed) = InMemoryStore::with_demo_data();
        let store = Arc::new(store);
        let sender = Arc::new(RecordingSender::new());
        let coordinator = ReferralCoordinator::with_defaults(store.clone(), sender.clone());
        Self {
            store,
            sender,
            coordinator,
            seed,
        }
    }

    pub fn nurse(&self) -> Actor {
        Actor::nurse(self.seed.nurse_id)
    }

    pub fn specialist(&self) -> Actor {
        Actor::specialist(uuid::Uuid::new_v4())
    }

    pub fn maria(&self) -> Actor {
        Actor::patient(self.seed.maria)
    }
}
