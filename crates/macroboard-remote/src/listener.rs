//! Discovery-backed device source.
//!
//! [`BoardListener`] runs a [`Probe`] for board hosts and turns every
//! published beacon list into device state reports. Each subscription keeps
//! its own view of the hosts it has reported: a new address is reported as a
//! new connected device, a known address coming back as connected again, and
//! a known address missing from the latest list as disconnected.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use async_trait::async_trait;
use macroboard_board::DeviceReference;
use macroboard_discovery::{BeaconLocation, DiscoveryConfig, Probe};
use macroboard_registry::{
    DeviceStateObserver, DeviceStateReport, DeviceStateSource, KnownDevice, Subscription,
};
use macroboard_types::DeviceMetadata;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::ClientOptions;
use crate::error::RemoteError;
use crate::reference::SocketDeviceReference;
use crate::BEACON_TYPE;

/// A beacon whose payload decoded into usable metadata.
#[derive(Debug, Clone)]
struct DecodedBeacon {
    address: SocketAddr,
    metadata: DeviceMetadata,
}

/// Decode beacon payloads, skipping anything that is not valid metadata.
fn decode_beacons(beacons: &[BeaconLocation]) -> Vec<DecodedBeacon> {
    beacons
        .iter()
        .filter(|b| !b.data.is_empty())
        .filter_map(|b| match DeviceMetadata::from_json(&b.data) {
            Ok(metadata) if metadata.layout().is_ok() => Some(DecodedBeacon {
                address: b.address,
                metadata,
            }),
            Ok(_) => {
                debug!(addr = %b.address, "ignoring beacon with invalid key layout");
                None
            }
            Err(e) => {
                debug!(addr = %b.address, error = %e, "ignoring undecodable beacon payload");
                None
            }
        })
        .collect()
}

struct TrackedHost {
    address: SocketAddr,
    reference: Arc<dyn DeviceReference>,
    connected: bool,
}

struct ListenerSubscription {
    id: u64,
    observer: Arc<dyn DeviceStateObserver>,
    hosts: Vec<TrackedHost>,
}

impl ListenerSubscription {
    fn new(id: u64, observer: Arc<dyn DeviceStateObserver>) -> Self {
        Self {
            id,
            observer,
            hosts: Vec::new(),
        }
    }

    /// Report what changed between the hosts seen so far and `beacons`.
    fn update(&mut self, beacons: &[DecodedBeacon], options: &ClientOptions) {
        for beacon in beacons {
            if let Some(host) = self.hosts.iter_mut().find(|h| h.address == beacon.address) {
                if !host.connected {
                    host.connected = true;
                    self.observer.on_report(&DeviceStateReport::new(
                        host.reference.clone(),
                        true,
                        false,
                    ));
                }
                continue;
            }

            let reference = match SocketDeviceReference::from_metadata(
                &beacon.metadata,
                beacon.address,
                options.clone(),
            ) {
                Ok(reference) => Arc::new(reference) as Arc<dyn DeviceReference>,
                Err(e) => {
                    debug!(addr = %beacon.address, error = %e, "skipping host");
                    continue;
                }
            };
            self.hosts.push(TrackedHost {
                address: beacon.address,
                reference: reference.clone(),
                connected: true,
            });
            self.observer
                .on_report(&DeviceStateReport::new(reference, true, true));
        }

        for host in &mut self.hosts {
            if host.connected && !beacons.iter().any(|b| b.address == host.address) {
                host.connected = false;
                self.observer.on_report(&DeviceStateReport::new(
                    host.reference.clone(),
                    false,
                    false,
                ));
            }
        }
    }
}

#[derive(Default)]
struct ListenerState {
    beacons: Vec<DecodedBeacon>,
    /// Released subscriptions leave a `None` slot that is reused.
    subscriptions: Vec<Option<ListenerSubscription>>,
    next_id: u64,
    closed: bool,
}

impl ListenerState {
    fn insert(&mut self, subscription: ListenerSubscription) {
        match self.subscriptions.iter_mut().find(|s| s.is_none()) {
            Some(slot) => *slot = Some(subscription),
            None => self.subscriptions.push(Some(subscription)),
        }
    }

    fn remove(&mut self, id: u64) {
        for slot in &mut self.subscriptions {
            if slot.as_ref().is_some_and(|s| s.id == id) {
                *slot = None;
            }
        }
    }

    fn publish(&mut self, beacons: Vec<DecodedBeacon>, options: &ClientOptions) {
        self.beacons = beacons;
        let ListenerState {
            beacons,
            subscriptions,
            ..
        } = self;
        for subscription in subscriptions.iter_mut().flatten() {
            subscription.update(beacons, options);
        }
    }
}

/// Device source for board hosts announced via discovery.
pub struct BoardListener {
    probe: Probe,
    state: Arc<Mutex<ListenerState>>,
    options: ClientOptions,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BoardListener {
    /// Start probing for board hosts. Opened boards use `options`.
    pub fn start(config: &DiscoveryConfig, options: ClientOptions) -> Result<Self, RemoteError> {
        let probe = Probe::start(BEACON_TYPE, config)?;
        let state = Arc::new(Mutex::new(ListenerState::default()));
        let cancel = CancellationToken::new();

        let task = tokio::spawn(watch_loop(
            probe.subscribe(),
            Arc::downgrade(&state),
            options.clone(),
            cancel.clone(),
        ));
        info!(probe = %probe.local_addr(), "board listener started");

        Ok(Self {
            probe,
            state,
            options,
            cancel,
            task: Mutex::new(Some(task)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, ListenerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.lock().subscriptions.iter().flatten().count()
    }
}

#[async_trait]
impl DeviceStateSource for BoardListener {
    fn subscribe(&self, observer: Arc<dyn DeviceStateObserver>) -> Subscription {
        let mut state = self.lock();
        if state.closed {
            drop(state);
            debug!("subscribe on a stopped board listener");
            observer.on_completed();
            return Subscription::empty();
        }

        let id = state.next_id;
        state.next_id += 1;
        let mut subscription = ListenerSubscription::new(id, observer);
        subscription.update(&state.beacons, &self.options);
        state.insert(subscription);
        drop(state);

        let weak = Arc::downgrade(&self.state);
        Subscription::new(move || {
            if let Some(state) = weak.upgrade() {
                state.lock().unwrap_or_else(|e| e.into_inner()).remove(id);
            }
        })
    }

    fn known_devices(&self) -> Vec<KnownDevice> {
        self.lock()
            .beacons
            .iter()
            .filter_map(|b| {
                SocketDeviceReference::from_metadata(&b.metadata, b.address, self.options.clone())
                    .ok()
            })
            .map(|reference| KnownDevice {
                device: Arc::new(reference),
                connected: true,
            })
            .collect()
    }

    /// Complete every subscription, then stop the probe.
    async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "board listener task failed");
            }
        }

        let subscriptions = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.subscriptions)
        };
        for subscription in subscriptions.into_iter().flatten() {
            subscription.observer.on_completed();
        }

        self.probe.shutdown().await;
        info!("board listener stopped");
    }
}

impl Drop for BoardListener {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn watch_loop(
    mut beacons: watch::Receiver<Vec<BeaconLocation>>,
    state: Weak<Mutex<ListenerState>>,
    options: ClientOptions,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = beacons.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        let decoded = decode_beacons(&beacons.borrow_and_update());
        let Some(shared) = state.upgrade() else {
            break;
        };
        debug!(hosts = decoded.len(), "beacon list updated");
        shared
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .publish(decoded, &options);
    }
}
