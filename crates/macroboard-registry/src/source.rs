//! Device state source contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::report::{DeviceStateReport, KnownDevice};

/// Receives device state reports from a source.
///
/// Observers are called synchronously while the source holds its lock, so
/// they must not block and must not call back into the same source.
pub trait DeviceStateObserver: Send + Sync {
    fn on_report(&self, report: &DeviceStateReport);

    /// The source shut down; no further reports follow.
    fn on_completed(&self) {}
}

impl<F> DeviceStateObserver for F
where
    F: Fn(&DeviceStateReport) + Send + Sync,
{
    fn on_report(&self, report: &DeviceStateReport) {
        self(report);
    }
}

/// Anything that reports devices appearing, connecting and disconnecting.
#[async_trait]
pub trait DeviceStateSource: Send + Sync {
    /// Register `observer`. Devices the source already knows are reported
    /// before this returns.
    fn subscribe(&self, observer: Arc<dyn DeviceStateObserver>) -> Subscription;

    /// Snapshot of the devices the source currently knows.
    fn known_devices(&self) -> Vec<KnownDevice>;

    /// Stop the source and complete its subscriptions.
    async fn shutdown(&self) {}
}

/// Handle to an observer registration.
///
/// The observer is removed when the handle is dropped or
/// [`unsubscribe`](Self::unsubscribe) is called.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A subscription with nothing to release.
    pub fn empty() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
