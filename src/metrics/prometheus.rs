//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_histogram_vec, CounterVec, Encoder,
    GaugeVec, HistogramVec, TextEncoder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Total number of reconciliation passes
    pub static ref RECONCILIATIONS: CounterVec = register_counter_vec!(
        "kafka_connect_operator_reconciliations_total",
        "Total number of reconciliation passes",
        &["kind", "trigger"]
    ).unwrap();

    /// Total number of passes that ended in a failure condition
    pub static ref RECONCILIATION_FAILURES: CounterVec = register_counter_vec!(
        "kafka_connect_operator_reconciliation_failures_total",
        "Total number of failed reconciliation passes",
        &["kind"]
    ).unwrap();

    /// Reconciliation duration histogram
    pub static ref RECONCILE_DURATION: HistogramVec = register_histogram_vec!(
        "kafka_connect_operator_reconcile_duration_seconds",
        "Duration of reconciliation passes in seconds",
        &["kind"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    /// Passes abandoned because the resource lock was not obtained in time
    pub static ref LOCK_TIMEOUTS: CounterVec = register_counter_vec!(
        "kafka_connect_operator_lock_timeouts_total",
        "Total number of passes abandoned on lock timeout",
        &["kind"]
    ).unwrap();

    /// Connector operations against the Kafka Connect REST API
    pub static ref CONNECTOR_OPERATIONS: CounterVec = register_counter_vec!(
        "kafka_connect_operator_connector_operations_total",
        "Connector operations by operation and outcome",
        &["operation", "outcome"]
    ).unwrap();

    /// Status reconciliations by kind and outcome
    pub static ref STATUS_UPDATES: CounterVec = register_counter_vec!(
        "kafka_connect_operator_status_updates_total",
        "Status reconciliations by kind and outcome",
        &["kind", "outcome"]
    ).unwrap();

    /// Connector resources marked orphaned after their cluster was deleted
    pub static ref ORPHANED_CONNECTORS: CounterVec = register_counter_vec!(
        "kafka_connect_operator_orphaned_connectors_total",
        "Connectors whose Connect cluster no longer exists",
        &["kind"]
    ).unwrap();

    /// Currently managed resources
    pub static ref MANAGED_RESOURCES: GaugeVec = register_gauge_vec!(
        "kafka_connect_operator_managed_resources",
        "Number of managed resources by kind",
        &["kind"]
    ).unwrap();

    /// Operator health (1 = healthy, 0 = unhealthy)
    pub static ref OPERATOR_HEALTH: prometheus::Gauge = prometheus::register_gauge!(
        "kafka_connect_operator_health",
        "Operator health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Serve `/metrics`, `/healthz` and `/readyz` until `shutdown` is cancelled
pub async fn serve(port: u16, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    OPERATOR_HEALTH.set(1.0);

    loop {
        let (stream, _) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = shutdown.cancelled() => {
                OPERATOR_HEALTH.set(0.0);
                return Ok(());
            }
        };
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" => text_response(StatusCode::OK, "ok"),
        "/readyz" | "/ready" if OPERATOR_HEALTH.get() >= 1.0 => text_response(StatusCode::OK, "ok"),
        "/readyz" | "/ready" => text_response(StatusCode::SERVICE_UNAVAILABLE, "not ready"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}
