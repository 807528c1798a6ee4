use std::sync::Arc;

use crate::{
    config::BrokerConfig,
    events::Bus,
    external::{AudioBackend, DeviceModule, PermissionAuthority},
    sound::SoundPool,
    subscribers::{Subscribe, SubscriberSet},
};

use super::core::{Broker, LoadedModule};

/// Builder for constructing a [`Broker`] with its collaborators.
pub struct BrokerBuilder {
    cfg: BrokerConfig,
    permissions: Arc<dyn PermissionAuthority>,
    module: Option<Arc<dyn DeviceModule>>,
    audio: Option<Arc<dyn AudioBackend>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl BrokerBuilder {
    /// Creates a new builder; the permission authority is mandatory.
    pub fn new(cfg: BrokerConfig, permissions: Arc<dyn PermissionAuthority>) -> Self {
        Self {
            cfg,
            permissions,
            module: None,
            audio: None,
            subscribers: Vec::new(),
        }
    }

    /// Sets the loaded device module.
    ///
    /// Without one every device operation fails with `Uninitialized`.
    pub fn with_module(mut self, module: Arc<dyn DeviceModule>) -> Self {
        self.module = Some(module);
        self
    }

    /// Sets the audio backend used by the feedback sound pool.
    ///
    /// Without one, sounds are silently unavailable.
    pub fn with_audio(mut self, audio: Arc<dyn AudioBackend>) -> Self {
        self.audio = Some(audio);
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive broker events through dedicated workers with
    /// bounded queues. A non-empty list requires a tokio runtime at build time.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds and returns the broker.
    ///
    /// Loads the module identity, sizes the slot table and, if subscribers
    /// were given, starts the subscriber listener.
    pub fn build(self) -> Arc<Broker> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let runtime_token = tokio_util::sync::CancellationToken::new();

        let module = self.module.map(|handle| {
            let info = handle.module_info();
            tracing::info!(
                name = %info.name,
                author = %info.author,
                api = info.module_api_version.0,
                "device module loaded"
            );
            LoadedModule { handle, info }
        });
        if module.is_none() {
            tracing::error!("no device module, device access unavailable");
        }

        let audio = self
            .audio
            .unwrap_or_else(|| Arc::new(crate::sound::Silent) as Arc<dyn AudioBackend>);
        let sounds = SoundPool::new(self.cfg.sounds.clone(), audio, bus.clone());

        let subs = (!self.subscribers.is_empty())
            .then(|| Arc::new(SubscriberSet::new(self.subscribers, bus.clone())));

        let broker = Arc::new(Broker::new_internal(
            self.cfg,
            module,
            self.permissions,
            sounds,
            bus,
            subs,
            runtime_token,
        ));
        broker.subscriber_listener();
        broker
    }
}
