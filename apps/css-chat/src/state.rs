use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::broadcaster::{BroadcastHandle, Broadcaster};
use crate::config::{ChatConfig, StalePolicy};
use crate::keyboard::Keyboard;
use crate::message_log::{self, SharedLog};
use crate::registry::ConnectionRegistry;

/// Handles shared by every request and session task.
#[derive(Clone)]
pub struct ChatState {
    registry: ConnectionRegistry,
    log: SharedLog,
    broadcaster: BroadcastHandle,
    keyboard: Arc<Keyboard>,
    config: Arc<ChatConfig>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl ChatState {
    /// Builds the engine without starting the broadcaster; the caller drives it.
    pub fn new(config: ChatConfig) -> (Self, Broadcaster) {
        let registry = ConnectionRegistry::new();
        let log = message_log::shared(config.message_limit);
        let (broadcaster, handle) = Broadcaster::new(log.clone(), registry.clone());
        let state = Self {
            registry,
            log,
            broadcaster: handle,
            keyboard: Arc::new(Keyboard::default()),
            config: Arc::new(config),
            shutdown: Arc::new(watch::channel(false).0),
        };
        (state, broadcaster)
    }

    /// Builds the engine and spawns its broadcaster on the current runtime.
    pub fn start(config: ChatConfig) -> (Self, JoinHandle<()>) {
        let (state, broadcaster) = Self::new(config);
        (state, tokio::spawn(broadcaster.run()))
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn log(&self) -> &SharedLog {
        &self.log
    }

    pub fn broadcaster(&self) -> &BroadcastHandle {
        &self.broadcaster
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn stale_policy(&self) -> StalePolicy {
        self.config.stale_policy
    }

    /// Asks every open session to finish its stream.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Resolves once [`ChatState::shutdown`] has been called.
    pub async fn shutdown_requested(&self) {
        let mut rx = self.shutdown.subscribe();
        let _ = rx.wait_for(|stopping| *stopping).await;
    }
}
