//! The device registry and its merge adapter.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use macroboard_board::DeviceReference;
use tracing::debug;

use crate::report::{DeviceStateReport, KnownDevice};
use crate::source::{DeviceStateObserver, DeviceStateSource, Subscription};

/// Append-only list of devices with per-subscriber change tracking.
///
/// Every [`update`](Self::update) notifies every subscription; each
/// subscription compares the registry against what it already delivered and
/// reports only real transitions. A device keeps its index forever.
#[derive(Clone, Default)]
pub struct DeviceRegistry {
    inner: Arc<Mutex<RegistryState>>,
}

#[derive(Default)]
struct RegistryState {
    known: Vec<KnownDevice>,
    subscriptions: Vec<SubscriptionState>,
    next_id: u64,
}

struct SubscriptionState {
    id: u64,
    observer: Arc<dyn DeviceStateObserver>,
    /// Last delivered connection state, by registry index.
    seen: Vec<bool>,
}

impl SubscriptionState {
    fn notify(&mut self, known: &[KnownDevice]) {
        for (index, entry) in known.iter().enumerate() {
            match self.seen.get_mut(index) {
                Some(seen) if *seen == entry.connected => {}
                Some(seen) => {
                    *seen = entry.connected;
                    self.observer.on_report(&DeviceStateReport::new(
                        entry.device.clone(),
                        entry.connected,
                        false,
                    ));
                }
                None => {
                    self.seen.push(entry.connected);
                    self.observer.on_report(&DeviceStateReport::new(
                        entry.device.clone(),
                        entry.connected,
                        true,
                    ));
                }
            }
        }
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the connection state of `device`, appending it if unknown,
    /// then let every subscription report what changed.
    pub fn update(&self, device: Arc<dyn DeviceReference>, connected: bool) {
        let mut state = self.lock();
        let id = device.id();

        match state.known.iter_mut().find(|k| k.device.id() == id) {
            Some(entry) => entry.connected = connected,
            None => {
                debug!(device = %id, index = state.known.len(), connected, "new device");
                state.known.push(KnownDevice { device, connected });
            }
        }

        let RegistryState {
            known,
            subscriptions,
            ..
        } = &mut *state;
        for subscription in subscriptions.iter_mut() {
            subscription.notify(known);
        }
    }

    /// Snapshot of every device ever reported, in discovery order.
    pub fn known_devices(&self) -> Vec<KnownDevice> {
        self.lock().known.clone()
    }

    /// Register `observer`, replaying every known device as new first.
    pub fn subscribe(&self, observer: Arc<dyn DeviceStateObserver>) -> Subscription {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;

        let mut subscription = SubscriptionState {
            id,
            observer,
            seen: Vec::with_capacity(state.known.len()),
        };
        subscription.notify(&state.known);
        state.subscriptions.push(subscription);
        drop(state);

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .subscriptions
                    .retain(|s| s.id != id);
            }
        })
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Complete and drop every subscription.
    pub fn complete(&self) {
        let subscriptions = std::mem::take(&mut self.lock().subscriptions);
        for subscription in subscriptions {
            subscription.observer.on_completed();
        }
    }
}

#[async_trait]
impl DeviceStateSource for DeviceRegistry {
    fn subscribe(&self, observer: Arc<dyn DeviceStateObserver>) -> Subscription {
        DeviceRegistry::subscribe(self, observer)
    }

    fn known_devices(&self) -> Vec<KnownDevice> {
        DeviceRegistry::known_devices(self)
    }

    async fn shutdown(&self) {
        self.complete();
    }
}

/// A registry that is also an observer of other sources.
///
/// Every report received is forwarded to [`DeviceRegistry::update`], so any
/// number of sources can feed one registry.
#[derive(Clone, Default)]
pub struct MergedRegistry {
    registry: DeviceRegistry,
}

impl MergedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }
}

impl DeviceStateObserver for MergedRegistry {
    fn on_report(&self, report: &DeviceStateReport) {
        self.registry.update(report.device.clone(), report.connected);
    }
}

#[async_trait]
impl DeviceStateSource for MergedRegistry {
    fn subscribe(&self, observer: Arc<dyn DeviceStateObserver>) -> Subscription {
        self.registry.subscribe(observer)
    }

    fn known_devices(&self) -> Vec<KnownDevice> {
        self.registry.known_devices()
    }

    async fn shutdown(&self) {
        self.registry.complete();
    }
}
