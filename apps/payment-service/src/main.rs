//! Payment Service Binary
//!
//! Starts the payment service with its health and metrics endpoint, and a
//! consumer that charges newline-delimited JSON payment requests read from
//! stdin, logging one reply per request.
//!
//! # Usage
//!
//! ```bash
//! echo '{"order_id":"o-1","user_id":"u-1","amount":"25.00"}' | cargo run --bin payment-service
//! ```
//!
//! # Environment Variables
//!
//! - `SERVICE_NAME`: Service name (default: payment-service)
//! - `PAYMENT_SERVICE_HEALTH_PORT`: Health check HTTP port (default: 8085)
//! - `PAYMENT_SERVICE_METRICS_ENABLED`: Install the Prometheus recorder (default: true)
//! - `PAYMENT_SUCCESS_RATE`: Simulated gateway approval rate (default: 0.85)
//! - `PAYMENT_PROCESSING_TIME_MS`: Simulated gateway latency (default: 2000)
//! - `RESILIENCE_<PROFILE>_*`: Per-profile breaker and retry overrides
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: false)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use payment_service::application::ports::{
    EventPublisherPort, PaymentGatewayPort, PaymentRepositoryPort,
};
use payment_service::infrastructure::gateway::SimulatedGateway;
use payment_service::infrastructure::health::{HealthServer, HealthServerState};
use payment_service::infrastructure::messaging::{
    InMemoryEventPublisher, PaymentConsumer, PaymentDelivery, PaymentReply,
};
use payment_service::infrastructure::persistence::InMemoryPaymentRepository;
use payment_service::infrastructure::telemetry;
use payment_service::{PaymentService, ResilienceManager, ServiceConfig, init_metrics};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// User ID queried by the startup repository probe.
const STARTUP_PROBE_USER: &str = "startup-probe";

/// Capacity of the request and reply queues.
const QUEUE_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init()?;

    tracing::info!("Starting Payment Service");

    let config = ServiceConfig::from_env()?;
    log_config(&config);

    // Initialize Prometheus metrics
    if config.server.metrics_enabled {
        if let Err(e) = init_metrics() {
            tracing::warn!(error = %e, "Prometheus recorder not installed");
        }
    }

    let shutdown_token = CancellationToken::new();

    // Resilience registry shared by every dependency call
    let resilience = Arc::new(ResilienceManager::with_profiles(
        config.resilience.clone().into_profiles(),
    ));

    // Adapters
    let gateway: Arc<dyn PaymentGatewayPort> =
        Arc::new(SimulatedGateway::from_settings(&config.gateway));
    let repository: Arc<dyn PaymentRepositoryPort> = Arc::new(InMemoryPaymentRepository::new());
    let publisher: Arc<dyn EventPublisherPort> = Arc::new(InMemoryEventPublisher::new());

    let payment_service = Arc::new(PaymentService::new(
        gateway,
        repository,
        publisher,
        Arc::clone(&resilience),
    ));

    // Probe the store once so the database breaker shows up in health output
    if let Err(e) = payment_service.get_user_payments(STARTUP_PROBE_USER).await {
        tracing::warn!(error = %e, "Startup repository probe failed");
    }

    // Initialize health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&resilience),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );

    // Spawn health server
    let health_task = tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    // Request consumer fed from stdin, replies logged
    let (request_tx, request_rx) = mpsc::channel(QUEUE_CAPACITY);
    let (reply_tx, reply_rx) = mpsc::channel(QUEUE_CAPACITY);
    let consumer = PaymentConsumer::new(
        Arc::clone(&payment_service),
        request_rx,
        reply_tx,
        shutdown_token.clone(),
    );
    let consumer_task = tokio::spawn(consumer.run());
    tokio::spawn(forward_stdin(request_tx, shutdown_token.clone()));
    tokio::spawn(log_replies(reply_rx));

    tracing::info!(service = %config.service_name, "Payment service ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, consumer_task)
        .await
        .is_err()
    {
        tracing::warn!("Payment consumer did not stop before the shutdown timeout");
    }
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, health_task)
        .await
        .is_err()
    {
        tracing::warn!("Health server did not stop before the shutdown timeout");
    }

    tracing::info!("Payment service stopped");
    Ok(())
}

/// Forward each non-blank stdin line to the consumer as a delivery.
async fn forward_stdin(requests: mpsc::Sender<PaymentDelivery>, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut sequence: u64 = 0;

    loop {
        let line = tokio::select! {
            () = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => {
                sequence += 1;
                let delivery =
                    PaymentDelivery::new(line).with_correlation_id(format!("stdin-{sequence}"));
                if requests.send(delivery).await.is_err() {
                    break;
                }
            }
            Ok(None) => {
                tracing::debug!("Stdin closed, no further payment requests");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read payment request from stdin");
                break;
            }
        }
    }
}

/// Log every reply the consumer sends.
async fn log_replies(mut replies: mpsc::Receiver<PaymentReply>) {
    while let Some(reply) = replies.recv().await {
        tracing::info!(
            order_id = %reply.order_id,
            payment_id = %reply.payment_id,
            status = %reply.status,
            correlation_id = ?reply.correlation_id,
            "Payment reply"
        );
    }
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    tracing::info!(
        service = %config.service_name,
        health_port = config.server.health_port,
        metrics_enabled = config.server.metrics_enabled,
        gateway_success_rate = config.gateway.success_rate,
        "Configuration loaded"
    );
    for (profile, settings) in config.resilience.clone().into_profiles() {
        tracing::debug!(
            profile = %profile,
            failure_threshold = settings.circuit_breaker.failure_threshold,
            recovery_timeout_secs = settings.circuit_breaker.recovery_timeout.as_secs(),
            max_attempts = settings.retry.max_attempts,
            "Resilience profile"
        );
    }
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv_from_ancestors() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
