//! Integration tests: finding and opening hosted boards through discovery.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use macroboard_board::mock::{BoardCommand, MockBoard};
use macroboard_board::MacroBoard;
use macroboard_discovery::DiscoveryConfig;
use macroboard_registry::{open_device, DeviceContext, DeviceStateReport, DeviceStateSource};
use macroboard_remote::{BoardHost, BoardListener, ClientOptions, HostIdentity};
use macroboard_types::GridKeyLayout;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

type Reports = Arc<Mutex<Vec<(String, bool, bool)>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

fn fast_options() -> ClientOptions {
    ClientOptions {
        reconnect_pause: Duration::from_millis(20),
        backoff_start: Duration::from_millis(20),
        backoff_max: Duration::from_millis(200),
    }
}

/// Discovery on loopback, probing the beacon bound to `port`.
fn loopback_discovery(port: u16) -> DiscoveryConfig {
    DiscoveryConfig {
        port,
        bind: LOCALHOST,
        broadcast: LOCALHOST,
        probe_interval: Duration::from_millis(100),
        beacon_timeout: Duration::from_millis(400),
    }
}

async fn start_host(name: &str) -> (BoardHost, macroboard_board::mock::MockBoardHandle) {
    let board = MockBoard::new(GridKeyLayout::new(4, 2, 96, 10).unwrap());
    let handle = board.handle();
    let identity = HostIdentity {
        device_name: name.to_string(),
        serial_number: "SN-1".to_string(),
        firmware_version: "1.2.3".to_string(),
    };
    let host = BoardHost::start(
        Arc::new(board),
        SocketAddr::new(LOCALHOST, 0),
        &loopback_discovery(0),
        &identity,
    )
    .await
    .unwrap();
    (host, handle)
}

fn record(reports: &Reports) -> impl Fn(&DeviceStateReport) + Send + Sync + 'static {
    let reports = reports.clone();
    move |report: &DeviceStateReport| {
        reports.lock().unwrap().push((
            report.device.name().to_string(),
            report.connected,
            report.is_new_device,
        ));
    }
}

async fn eventually<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let reached = tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "timed out waiting for {what}");
}

#[tokio::test]
async fn listener_reports_host_lifecycle() {
    init_tracing();
    let (host, _board) = start_host("desk").await;
    let listener = BoardListener::start(
        &loopback_discovery(host.beacon_addr().port()),
        fast_options(),
    )
    .unwrap();

    let reports = Reports::default();
    let subscription = listener.subscribe(Arc::new(record(&reports)));

    eventually("host discovered", || !reports.lock().unwrap().is_empty()).await;
    let known = listener.known_devices();
    assert_eq!(known.len(), 1);
    assert_eq!(
        known[0].device.id().to_string(),
        format!("tcp://{}", host.local_addr())
    );
    assert_eq!(known[0].device.keys().count(), 8);

    host.shutdown().await;
    eventually("host gone", || reports.lock().unwrap().len() == 2).await;
    assert_eq!(
        *reports.lock().unwrap(),
        vec![
            ("desk".to_string(), true, true),
            ("desk".to_string(), false, false),
        ]
    );

    subscription.unsubscribe();
    assert_eq!(listener.subscription_count(), 0);
    listener.shutdown().await;
}

#[tokio::test]
async fn late_subscriber_gets_current_hosts_replayed() {
    init_tracing();
    let (host, _board) = start_host("desk").await;
    let listener = BoardListener::start(
        &loopback_discovery(host.beacon_addr().port()),
        fast_options(),
    )
    .unwrap();

    eventually("host discovered", || !listener.known_devices().is_empty()).await;

    let reports = Reports::default();
    let _subscription = listener.subscribe(Arc::new(record(&reports)));
    assert_eq!(
        *reports.lock().unwrap(),
        vec![("desk".to_string(), true, true)]
    );

    listener.shutdown().await;
    host.shutdown().await;
}

#[tokio::test]
async fn shutdown_completes_subscriptions() {
    let listener = BoardListener::start(&loopback_discovery(1), fast_options()).unwrap();

    let completed = Arc::new(Mutex::new(false));
    struct CompletionFlag(Arc<Mutex<bool>>);
    impl macroboard_registry::DeviceStateObserver for CompletionFlag {
        fn on_report(&self, _: &DeviceStateReport) {}
        fn on_completed(&self) {
            *self.0.lock().unwrap() = true;
        }
    }

    let _subscription = listener.subscribe(Arc::new(CompletionFlag(completed.clone())));
    listener.shutdown().await;
    assert!(*completed.lock().unwrap());
    assert_eq!(listener.subscription_count(), 0);

    // Subscribing afterwards completes right away
    let late = Arc::new(Mutex::new(false));
    let _late_subscription = listener.subscribe(Arc::new(CompletionFlag(late.clone())));
    assert!(*late.lock().unwrap());
}

#[tokio::test]
async fn discovered_board_can_be_opened_and_driven() {
    init_tracing();
    let (host, board) = start_host("studio").await;
    let listener = Arc::new(
        BoardListener::start(
            &loopback_discovery(host.beacon_addr().port()),
            fast_options(),
        )
        .unwrap(),
    );
    let context = DeviceContext::new().with_source(listener, true);

    let cancel = CancellationToken::new();
    let remote = tokio::time::timeout(
        Duration::from_secs(5),
        open_device(&context, |d| d.name() == "studio", &cancel),
    )
    .await
    .expect("board was not discovered")
    .unwrap();
    assert_eq!(remote.keys().count(), 8);

    remote.set_brightness(55).await.unwrap();
    eventually("brightness applied", || {
        board.commands().contains(&BoardCommand::SetBrightness(55))
    })
    .await;

    remote.shutdown().await;
    context.close().await;
    host.shutdown().await;
}
