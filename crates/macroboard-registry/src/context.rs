//! Device context merging several sources.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::registry::MergedRegistry;
use crate::report::KnownDevice;
use crate::source::{DeviceStateObserver, DeviceStateSource, Subscription};

struct SourceEntry {
    source: Arc<dyn DeviceStateSource>,
    subscription: Subscription,
    dispose_with_context: bool,
}

/// A merged registry fed by any number of sources.
///
/// The context owns its subscriptions to the added sources and releases all
/// of them on [`close`](Self::close) or drop. Sources added with
/// `dispose_with_context` are shut down as well when the context is closed.
#[derive(Default)]
pub struct DeviceContext {
    registry: Arc<MergedRegistry>,
    sources: Mutex<Vec<SourceEntry>>,
}

impl DeviceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed reports from `source` into this context.
    pub fn add_source(&self, source: Arc<dyn DeviceStateSource>, dispose_with_context: bool) {
        let subscription = source.subscribe(self.registry.clone());
        self.sources
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SourceEntry {
                source,
                subscription,
                dispose_with_context,
            });
        debug!(dispose_with_context, "device source added");
    }

    /// Builder-style [`add_source`](Self::add_source).
    #[must_use]
    pub fn with_source(self, source: Arc<dyn DeviceStateSource>, dispose_with_context: bool) -> Self {
        self.add_source(source, dispose_with_context);
        self
    }

    pub fn registry(&self) -> &MergedRegistry {
        &self.registry
    }

    /// Unsubscribe from every source, shut down the owned ones and complete
    /// this context's own subscribers.
    pub async fn close(&self) {
        let entries = std::mem::take(&mut *self.sources.lock().unwrap_or_else(|e| e.into_inner()));
        let count = entries.len();
        for entry in entries {
            entry.subscription.unsubscribe();
            if entry.dispose_with_context {
                entry.source.shutdown().await;
            }
        }
        self.registry.registry().complete();
        info!(sources = count, "device context closed");
    }
}

#[async_trait]
impl DeviceStateSource for DeviceContext {
    fn subscribe(&self, observer: Arc<dyn DeviceStateObserver>) -> Subscription {
        self.registry.subscribe(observer)
    }

    fn known_devices(&self) -> Vec<KnownDevice> {
        self.registry.known_devices()
    }

    async fn shutdown(&self) {
        self.close().await;
    }
}
