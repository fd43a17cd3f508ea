//! Resolving a device from a source.

use std::sync::{Arc, Mutex};

use macroboard_board::{DeviceReference, MacroBoard};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::RegistryError;
use crate::report::DeviceStateReport;
use crate::source::{DeviceStateObserver, DeviceStateSource};

/// Resolves the first connected device matching a predicate, once.
struct WaitObserver<P> {
    predicate: P,
    found: Mutex<Option<oneshot::Sender<Arc<dyn DeviceReference>>>>,
}

impl<P> DeviceStateObserver for WaitObserver<P>
where
    P: Fn(&dyn DeviceReference) -> bool + Send + Sync,
{
    fn on_report(&self, report: &DeviceStateReport) {
        if !report.connected || !(self.predicate)(report.device.as_ref()) {
            return;
        }
        let sender = self.found.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(sender) = sender {
            let _ = sender.send(report.device.clone());
        }
    }

    fn on_completed(&self) {
        // Dropping the sender wakes the waiter
        self.found.lock().unwrap_or_else(|e| e.into_inner()).take();
    }
}

/// Wait until `source` reports a connected device matching `predicate`.
///
/// Already known devices are checked first. The subscription is released
/// before returning, also when `cancel` fires.
pub async fn wait_for_device<S, P>(
    source: &S,
    predicate: P,
    cancel: &CancellationToken,
) -> Result<Arc<dyn DeviceReference>, RegistryError>
where
    S: DeviceStateSource + ?Sized,
    P: Fn(&dyn DeviceReference) -> bool + Send + Sync + 'static,
{
    if let Some(known) = source
        .known_devices()
        .into_iter()
        .find(|k| k.connected && predicate(k.device.as_ref()))
    {
        return Ok(known.device);
    }

    let (tx, rx) = oneshot::channel();
    let observer = Arc::new(WaitObserver {
        predicate,
        found: Mutex::new(Some(tx)),
    });
    let subscription = source.subscribe(observer);

    let result = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(RegistryError::Cancelled),
        found = rx => found.map_err(|_| RegistryError::DeviceNotResolved),
    };
    subscription.unsubscribe();

    if let Ok(device) = &result {
        debug!(device = %device.id(), "device resolved");
    }
    result
}

/// Wait for a matching device and open it.
pub async fn open_device<S, P>(
    source: &S,
    predicate: P,
    cancel: &CancellationToken,
) -> Result<Arc<dyn MacroBoard>, RegistryError>
where
    S: DeviceStateSource + ?Sized,
    P: Fn(&dyn DeviceReference) -> bool + Send + Sync + 'static,
{
    let device = wait_for_device(source, predicate, cancel).await?;
    Ok(device.open().await?)
}
