//! Prometheus metrics endpoint.
//!
//! The service layer reports through the `metrics` macros; this module owns
//! the other half: claiming the process-global recorder slot for a Prometheus
//! registry and exposing its rendered snapshot at `GET /metrics`.
//!
//! Installation is idempotent rather than fallible. [`recorder`] claims the
//! slot on first use and every later call hands back the same registry, so
//! the binary and any number of tests in one process can all go through the
//! same entry point without coordinating.

use std::sync::OnceLock;

use axum::Router;
use axum::extract::State;
use axum::routing::get;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// The registry this process reports into, installed on first use. `None`
/// when some other recorder claimed the global slot before we did.
static RECORDER: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Hand back the process-wide Prometheus registry, installing it first if
/// this is the earliest call.
///
/// Counters recorded before the first call are dropped on the floor, so the
/// binary asks for the recorder before it starts serving traffic. Returns
/// `None` if a foreign recorder already occupies the global slot; callers
/// then skip the endpoint and the `metrics` macros stay no-ops.
pub fn recorder() -> Option<PrometheusHandle> {
    RECORDER
        .get_or_init(|| PrometheusBuilder::new().install_recorder().ok())
        .clone()
}

/// Axum handler: render the current snapshot in Prometheus text format.
async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// Serve `GET /metrics` for the given registry on an already-bound listener.
///
/// Binding is the caller's job: the binary binds its configured address and
/// tests bind an ephemeral port they want to know up front. The endpoint
/// runs in a spawned task until the process exits; the returned handle is
/// only useful for observing that the task is still alive.
pub fn serve(handle: PrometheusHandle, listener: TcpListener) -> JoinHandle<()> {
    let app = Router::new()
        .route("/metrics", get(render))
        .with_state(handle);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "metrics endpoint failed");
        }
    })
}
