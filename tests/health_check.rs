//! Integration tests for the gRPC health check service.
//!
//! Each test spins up a real tonic server with both the health service and
//! the Log service on an ephemeral port, then uses the tonic-health generated
//! client to verify health check responses.

use std::net::SocketAddr;
use std::sync::Arc;

use seglog_db::proto::log_server::LogServer;
use seglog_db::{CommitLog, Config, Log, SeglogService};
use tempfile::TempDir;
use tonic::transport::Channel;
use tonic_health::pb::HealthCheckRequest;
use tonic_health::pb::health_check_response::ServingStatus;
use tonic_health::pb::health_client::HealthClient;

/// Spin up an in-process gRPC server with the health service and the Log
/// service registered. Mirrors `main.rs`: both the empty service name and
/// the log service are set to SERVING after the listener is bound.
async fn start_health_test_server() -> (HealthClient<Channel>, SocketAddr, TempDir) {
    let dir = tempfile::tempdir().expect("failed to create tempdir");
    let log = Log::open(dir.path(), Config::default()).expect("open should succeed");
    let service = SeglogService::new(Arc::new(log) as Arc<dyn CommitLog>);
    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();

    let listener = tokio::net::TcpListener::bind("[::1]:0")
        .await
        .expect("bind should succeed");
    let addr = listener.local_addr().expect("should have local addr");
    let incoming = tokio_stream::wrappers::TcpListenerStream::new(listener);

    health_reporter
        .set_serving::<LogServer<SeglogService>>()
        .await;
    health_reporter
        .set_service_status("", tonic_health::ServingStatus::Serving)
        .await;

    tokio::spawn(async move {
        tonic::transport::Server::builder()
            .add_service(health_service)
            .add_service(LogServer::new(service))
            .serve_with_incoming(incoming)
            .await
            .expect("server should run");
    });

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let channel = Channel::from_shared(format!("http://[::1]:{}", addr.port()))
        .expect("valid URI")
        .connect()
        .await
        .expect("channel connect should succeed");
    let client = HealthClient::new(channel);

    (client, addr, dir)
}

#[tokio::test]
async fn health_check_empty_service_name_returns_serving() {
    let (mut client, _addr, _dir) = start_health_test_server().await;

    let resp = client
        .check(HealthCheckRequest {
            service: String::new(),
        })
        .await
        .expect("health check should succeed")
        .into_inner();
    assert_eq!(resp.status(), ServingStatus::Serving);
}

#[tokio::test]
async fn health_check_log_service_returns_serving() {
    let (mut client, _addr, _dir) = start_health_test_server().await;

    let resp = client
        .check(HealthCheckRequest {
            service: "seglog.Log".to_string(),
        })
        .await
        .expect("health check should succeed")
        .into_inner();
    assert_eq!(resp.status(), ServingStatus::Serving);
}

#[tokio::test]
async fn health_check_unknown_service_returns_not_found() {
    let (mut client, _addr, _dir) = start_health_test_server().await;

    let status = client
        .check(HealthCheckRequest {
            service: "no.such.Service".to_string(),
        })
        .await
        .expect_err("unknown service should fail");
    assert_eq!(status.code(), tonic::Code::NotFound);
}
