//! Integration tests: several sources feeding one device context.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use macroboard_board::mock::MockDeviceReference;
use macroboard_board::DeviceReference;
use macroboard_registry::{
    wait_for_device, DeviceContext, DeviceRegistry, DeviceStateReport, DeviceStateSource,
};
use macroboard_types::GridKeyLayout;
use tokio_util::sync::CancellationToken;

type Reports = Arc<Mutex<Vec<(String, bool, bool)>>>;

fn device(id: &str) -> Arc<dyn DeviceReference> {
    let layout = GridKeyLayout::new(3, 2, 72, 10).unwrap();
    Arc::new(MockDeviceReference::new(id, id, layout))
}

fn recorder() -> (Arc<dyn macroboard_registry::DeviceStateObserver>, Reports) {
    let reports = Reports::default();
    let sink = reports.clone();
    let observer = move |report: &DeviceStateReport| {
        sink.lock().unwrap().push((
            report.device.id().to_string(),
            report.connected,
            report.is_new_device,
        ));
    };
    (Arc::new(observer), reports)
}

fn entry(id: &str, connected: bool, is_new: bool) -> (String, bool, bool) {
    (id.to_string(), connected, is_new)
}

#[tokio::test]
async fn late_subscriber_sees_only_current_state() {
    let usb = Arc::new(DeviceRegistry::new());
    let network = Arc::new(DeviceRegistry::new());
    let context = DeviceContext::new()
        .with_source(usb.clone(), true)
        .with_source(network.clone(), true);

    usb.update(device("A"), true);
    network.update(device("B"), true);
    usb.update(device("A"), true);
    network.update(device("B"), false);

    let (observer, reports) = recorder();
    let _subscription = context.subscribe(observer);
    assert_eq!(
        *reports.lock().unwrap(),
        vec![entry("A", true, true), entry("B", false, true)]
    );

    // The same device reported by a second source is not a new device
    network.update(device("A"), false);
    network.update(device("B"), true);
    assert_eq!(
        *reports.lock().unwrap(),
        vec![
            entry("A", true, true),
            entry("B", false, true),
            entry("A", false, false),
            entry("B", true, false),
        ]
    );

    context.close().await;
}

#[tokio::test]
async fn early_and_late_subscribers_agree_on_final_state() {
    let source = Arc::new(DeviceRegistry::new());
    let context = DeviceContext::new().with_source(source.clone(), false);

    let (early, early_reports) = recorder();
    let _early = context.subscribe(early);

    source.update(device("A"), true);
    source.update(device("A"), false);
    source.update(device("B"), true);

    let (late, late_reports) = recorder();
    let _late = context.subscribe(late);

    let final_state = |reports: &Reports| {
        let mut state: Vec<(String, bool)> = Vec::new();
        for (id, connected, _) in reports.lock().unwrap().iter() {
            match state.iter_mut().find(|(known, _)| known == id) {
                Some(entry) => entry.1 = *connected,
                None => state.push((id.clone(), *connected)),
            }
        }
        state
    };
    assert_eq!(final_state(&early_reports), final_state(&late_reports));
    assert_eq!(early_reports.lock().unwrap().len(), 3);
    assert_eq!(late_reports.lock().unwrap().len(), 2);

    context.close().await;
}

#[tokio::test]
async fn wait_across_merged_sources() {
    let first = Arc::new(DeviceRegistry::new());
    let second = Arc::new(DeviceRegistry::new());
    let context = DeviceContext::new()
        .with_source(first.clone(), true)
        .with_source(second.clone(), true);
    first.update(device("keypad"), true);

    let updater = {
        let second = second.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            second.update(device("stream-deck"), true);
        })
    };

    let cancel = CancellationToken::new();
    let found = wait_for_device(&context, |d| d.name().starts_with("stream"), &cancel)
        .await
        .unwrap();
    assert_eq!(found.id().as_str(), "stream-deck");
    updater.await.unwrap();

    context.close().await;
    assert_eq!(first.subscription_count(), 0);
    assert_eq!(second.subscription_count(), 0);
}
