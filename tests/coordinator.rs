//! End-to-end coordinator scenarios

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use openkick::engine::{self, Event, HttpConnector, OptType, VTN_BASE_PATH, VenHooks};
use openkick::{Error, VenPhase, VenProps, VtnService};
use tokio::net::TcpListener;

mod common;
use common::{RefusingConnector, running_service, seeded_store, test_config, test_service, wait_for};

#[tokio::test]
async fn seeded_fleet_connects_and_receives_events() {
    let service = running_service(5).await;

    let started = service.ven_connect().await.unwrap();
    assert_eq!(started.len(), 5);

    let snapshot = service.ven_props_list().await.unwrap();
    assert_eq!(snapshot.len(), 5);
    assert!(snapshot.iter().all(|v| v.is_connected));
    assert_eq!(
        service.ven_ids().await,
        vec!["ID-0", "ID-1", "ID-2", "ID-3", "ID-4"]
    );
    assert_eq!(
        service.ven_names().await,
        vec!["ven-0", "ven-1", "ven-2", "ven-3", "ven-4"]
    );

    let event_id = service.send_event("ID-2", 7).await.unwrap();
    assert_eq!(service.submitted("ID-2").await.unwrap(), 1);
    assert_eq!(service.submitted("ID-3").await.unwrap(), 0);

    assert!(
        wait_for(|| {
            let service = Arc::clone(&service);
            let event_id = event_id.clone();
            async move { service.event_response(&event_id).await == Some(OptType::OptIn) }
        })
        .await,
        "device never answered the event"
    );

    assert!(matches!(
        service.send_event("ID-99", 7).await,
        Err(Error::UnknownDevice(id)) if id == "ID-99"
    ));

    service.shutdown().await;
}

#[tokio::test]
async fn devices_progress_to_event_capable() {
    let service = running_service(2).await;
    assert_eq!(service.ven_phase("ID-0").await, VenPhase::Unknown);

    service.ven_connect().await.unwrap();

    for id in ["ID-0", "ID-1"] {
        assert!(
            wait_for(|| {
                let service = Arc::clone(&service);
                async move { service.ven_phase(id).await == VenPhase::EventCapable }
            })
            .await,
            "{id} never became event capable"
        );
    }

    service.shutdown().await;
}

#[tokio::test]
async fn appended_device_is_not_connected_until_next_pass() {
    let service = running_service(3).await;
    assert_eq!(service.ven_connect().await.unwrap().len(), 3);

    service
        .registry()
        .write()
        .await
        .append(VenProps::generate(3))
        .unwrap();

    assert!(matches!(
        service.send_event("ID-3", 1).await,
        Err(Error::NotConnected(id)) if id == "ID-3"
    ));

    // Already-connected devices are never started again
    let started = service.ven_connect().await.unwrap();
    assert_eq!(started, vec!["ID-3"]);
    assert_eq!(service.ven_connected().await.unwrap().len(), 4);

    assert!(service.ven_connect().await.unwrap().is_empty());
    service.shutdown().await;
}

#[tokio::test]
async fn concurrent_connect_passes_start_each_device_once() {
    let service = running_service(5).await;

    let (a, b) = tokio::join!(service.ven_connect(), service.ven_connect());
    let mut started = a.unwrap();
    started.extend(b.unwrap());
    started.sort();

    assert_eq!(started, vec!["ID-0", "ID-1", "ID-2", "ID-3", "ID-4"]);
    service.shutdown().await;
}

#[tokio::test]
async fn spawn_failure_is_reported_and_others_continue() {
    let service = Arc::new(test_service().connector(Arc::new(RefusingConnector::new("ID-1"))));
    service.run(&seeded_store(3)).await.unwrap();

    match service.ven_connect().await {
        Err(Error::ConnectAll { started, failures }) => {
            assert_eq!(started, vec!["ID-0", "ID-2"]);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].ven_id, "ID-1");
        }
        other => panic!("expected partial failure, got {other:?}"),
    }

    let connected: Vec<String> = service
        .ven_connected()
        .await
        .unwrap()
        .into_iter()
        .map(|v| v.id)
        .collect();
    assert_eq!(connected, vec!["ID-0", "ID-2"]);

    service.shutdown().await;
}

#[tokio::test]
async fn fleet_runs_over_http_transport() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let vtn_url = format!("http://{addr}{VTN_BASE_PATH}");

    let service = Arc::new(
        VtnService::new(&test_config(), openkick::VenRegistry::new().into_shared())
            .connector(Arc::new(HttpConnector::new(vtn_url, Duration::from_secs(2)))),
    );
    service.run(&seeded_store(2)).await.unwrap();

    let router = Router::new().nest(VTN_BASE_PATH, engine::http::router(service.handle().unwrap()));
    let server = tokio::spawn(async move { axum::serve(listener, router).await });

    service.ven_connect().await.unwrap();
    assert!(
        wait_for(|| {
            let service = Arc::clone(&service);
            async move { service.ven_phase("ID-1").await == VenPhase::EventCapable }
        })
        .await,
        "device never completed the HTTP handshake"
    );

    let event_id = service.send_event("ID-1", 3).await.unwrap();
    assert!(
        wait_for(|| {
            let service = Arc::clone(&service);
            let event_id = event_id.clone();
            async move { service.event_response(&event_id).await.is_some() }
        })
        .await,
        "event response never arrived over HTTP"
    );

    service.shutdown().await;
    server.abort();
}

/// Device behavior whose sensor read panics for one device
struct FaultySensor {
    faulty: &'static str,
}

#[async_trait]
impl VenHooks for FaultySensor {
    async fn collect_report_value(&self, ven_id: &str) -> f64 {
        if ven_id == self.faulty {
            panic!("sensor read failed on {ven_id}");
        }
        1.0
    }

    async fn handle_event(&self, _event: &Event) -> OptType {
        OptType::OptIn
    }
}

#[tokio::test]
async fn panicking_device_leaves_others_running() {
    let service = Arc::new(test_service().hooks(Arc::new(FaultySensor { faulty: "ID-1" })));
    service.run(&seeded_store(3)).await.unwrap();
    assert_eq!(service.ven_connect().await.unwrap().len(), 3);

    assert!(
        wait_for(|| {
            let service = Arc::clone(&service);
            async move { !service.ven_agent_running("ID-1").await }
        })
        .await,
        "faulty device agent never stopped"
    );

    for id in ["ID-0", "ID-2"] {
        assert!(
            wait_for(|| {
                let service = Arc::clone(&service);
                async move { service.ven_phase(id).await == VenPhase::EventCapable }
            })
            .await,
            "{id} never became event capable"
        );
        assert!(service.ven_agent_running(id).await);
    }
    assert!(service.is_running());

    let event_id = service.send_event("ID-2", 4).await.unwrap();
    assert!(
        wait_for(|| {
            let service = Arc::clone(&service);
            let event_id = event_id.clone();
            async move { service.event_response(&event_id).await == Some(OptType::OptIn) }
        })
        .await,
        "healthy device stopped answering events"
    );

    service.shutdown().await;
}
