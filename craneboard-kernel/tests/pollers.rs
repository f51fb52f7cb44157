use axum::http::StatusCode;
use craneboard_devkit::fixtures::{crane_list, mqtt_status};
use craneboard_devkit::{CraneFixture, MockCraneApi};
use craneboard_kernel::api::{ApiClient, CranesApi};
use craneboard_kernel::config::ApiConf;
use craneboard_kernel::fleet::spawn_crane_refresh;
use craneboard_kernel::models::BrokerStatus;
use craneboard_kernel::notify::RecordingNotifier;
use craneboard_kernel::state::{new_state, CraneCache};
use craneboard_kernel::status::spawn_status_poller;
use std::sync::Arc;
use std::time::Duration;

fn api_for(mock: &MockCraneApi) -> (Arc<CranesApi>, RecordingNotifier) {
    let notifier = RecordingNotifier::new(10);
    let conf = ApiConf { base_url: mock.base_url(), ..ApiConf::default() };
    let client = ApiClient::new(&conf, Arc::new(notifier.clone())).unwrap();
    (Arc::new(CranesApi::new(Arc::new(client))), notifier)
}

#[tokio::test]
async fn test_status_poller_against_backend() {
    let mock = MockCraneApi::start().await.unwrap();
    mock.push_mqtt_failure(StatusCode::BAD_GATEWAY);
    mock.push_mqtt_status(mqtt_status(true, "mosquitto"));
    let (api, notifier) = api_for(&mock);

    let (mut rx, handle) = spawn_status_poller(api, Duration::from_millis(100));
    assert!(rx.borrow().loading);

    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), BrokerStatus::failed());

    rx.changed().await.unwrap();
    let status = rx.borrow_and_update().clone();
    assert_eq!(status, BrokerStatus { connected: true, broker: "mosquitto".into(), loading: false });

    handle.stop().await;
    let hits = mock.hits("mqtt");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(mock.hits("mqtt"), hits);
    // statut de fond : aucun toast
    assert!(notifier.messages().is_empty());
}

#[tokio::test]
async fn test_fleet_refresh_fills_cache() {
    let mock = MockCraneApi::start().await.unwrap();
    mock.set_cranes(crane_list(vec![
        CraneFixture::new("TC-1").build(),
        CraneFixture::new("TC-2").build(),
    ]));
    let (api, _) = api_for(&mock);
    let cache = new_state(CraneCache::new());

    let handle = spawn_crane_refresh(api, 7, cache.clone(), Duration::from_secs(60));
    for _ in 0..50 {
        if !cache.lock().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(cache.lock().len(), 2);
    assert_eq!(mock.last_limit(), Some(7));
    handle.stop().await;
}
