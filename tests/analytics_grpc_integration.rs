//! Analytics service integration tests
//!
//! A real tonic server on an ephemeral port, fed by the shortener's client,
//! with results read back through the analytics HTTP API.

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use linkpulse::analytics::{
    create_analytics_router, AnalyticsRepository, AnalyticsStore, SqliteAnalyticsStorage,
};
use linkpulse::config::AnalyticsClientConfig;
use linkpulse::models::ClickInfo;
use linkpulse::rpc::analytics_grpc_service;
use linkpulse::rpc::proto::analytics_service_client::AnalyticsServiceClient;
use linkpulse::rpc::proto::RecordClickRequest;
use linkpulse::rpc::{CircuitState, ClickRecorder, ResilientAnalyticsClient};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::Code;
use tower::ServiceExt;

async fn create_repo() -> Arc<AnalyticsRepository> {
    let storage = SqliteAnalyticsStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(AnalyticsRepository::new(Arc::new(storage)))
}

async fn start_server(repo: Arc<AnalyticsRepository>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(analytics_grpc_service(repo))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    addr
}

fn client_for(addr: SocketAddr) -> ResilientAnalyticsClient {
    let config = AnalyticsClientConfig {
        endpoint: format!("http://{addr}"),
        ..AnalyticsClientConfig::default()
    };
    ResilientAnalyticsClient::from_config(&config).unwrap()
}

#[tokio::test]
async fn test_click_flows_from_client_to_http_api() {
    let repo = create_repo().await;
    let addr = start_server(Arc::clone(&repo)).await;
    let client = client_for(addr);

    client
        .record_click("AbCd1234", ClickInfo::new("203.0.113.7", "Lisbon", "PT"))
        .await
        .unwrap();
    client
        .record_click("AbCd1234", ClickInfo::new("198.51.100.4", "Porto", "PT"))
        .await
        .unwrap();
    assert_eq!(client.circuit_state(), CircuitState::Closed);

    let app = create_analytics_router(repo);
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/AbCd1234/summary")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["data"]["total_clicks"], 2);
    assert_eq!(json["data"]["by_country"][0]["value"], "PT");
    assert_eq!(json["data"]["by_country"][0]["count"], 2);
}

#[tokio::test]
async fn test_empty_short_link_is_rejected_over_the_wire() {
    let repo = create_repo().await;
    let addr = start_server(Arc::clone(&repo)).await;

    let mut client = AnalyticsServiceClient::connect(format!("http://{addr}"))
        .await
        .unwrap();
    let status = client
        .record_click(RecordClickRequest {
            short_link: String::new(),
            click: None,
        })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
}

#[tokio::test]
async fn test_concurrent_clicks_are_not_lost() {
    let repo = create_repo().await;
    let addr = start_server(Arc::clone(&repo)).await;
    let client = Arc::new(client_for(addr));

    let handles: Vec<_> = (0..40)
        .map(|i| {
            let client = Arc::clone(&client);
            tokio::spawn(async move {
                let link = if i % 2 == 0 { "Even0000" } else { "Odd00000" };
                client
                    .record_click(link, ClickInfo::new(format!("198.51.100.{i}"), "Paris", "FR"))
                    .await
            })
        })
        .collect();

    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(repo.get("Even0000").await.unwrap().unwrap().clicks.len(), 20);
    assert_eq!(repo.get("Odd00000").await.unwrap().unwrap().clicks.len(), 20);
}
