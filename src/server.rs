mod handlers;
mod responses;

use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::infrastructure::correlation_tracker::{CorrelationTracker, TrackerPolicy};
use crate::infrastructure::expiry_sweeper::ExpirySweeper;
use crate::infrastructure::idempotency::IdempotencyGuard;
use crate::infrastructure::outcome_listener::OutcomeListener;
use crate::outbound::mpesa::{
    Credentials, GatewayHttpClient, PaymentInitiator, RequestDefaults, RetryStrategy,
    TokenManager, TokenPolicy,
};
use crate::server::handlers::health::health_check;
use crate::server::handlers::payments::{stk_callback, stk_push, transaction};
use crate::server::handlers::root::home;
use axum::http::Method;
use axum::{
    Router,
    routing::{get, post},
};
use color_eyre::eyre::{Context, Result, eyre};
use time::UtcOffset;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Clone)]
/// The global application state shared between all request handlers.
pub(crate) struct AppState {
    pub(crate) initiator: Arc<PaymentInitiator>,
    pub(crate) tracker: CorrelationTracker,
    pub(crate) gateway_offset: UtcOffset,
}

pub struct Server {
    router: Router,
    listener: TcpListener,
}

impl Server {
    /// Creates a new HTTP server and starts its background tasks.
    pub async fn new(config: &Config) -> Result<Self> {
        let trace_layer =
            TraceLayer::new_for_http().make_span_with(|request: &'_ axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                tracing::info_span!("request", method = %request.method(), uri)
            });

        let cors_layer = CorsLayer::new()
            .allow_origin(Any)
            .allow_headers(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS]);

        let state = Self::build_state(config)?;

        ExpirySweeper::new(state.tracker.clone(), config.payments.sweep_interval()).start();
        OutcomeListener::new(state.tracker.subscribe()).start();

        let router = Router::new()
            .route("/", get(home))
            .route("/health", get(health_check))
            .route("/api/mpesa/stkpush", post(stk_push))
            .route("/api/mpesa/callback", post(stk_callback))
            .route(
                "/api/mpesa/transactions/{checkout_request_id}",
                get(transaction),
            )
            .layer(cors_layer)
            .layer(trace_layer)
            .with_state(state);

        let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await
            .wrap_err_with(|| format!("Failed to bind to port {}", config.server.port))?;

        Ok(Self { router, listener })
    }

    fn build_state(config: &Config) -> Result<AppState> {
        let payments = &config.payments;

        let gateway_offset = UtcOffset::from_hms(payments.gateway_utc_offset_hours, 0, 0)
            .wrap_err("Invalid gateway UTC offset")?;

        let credentials = Arc::new(Credentials::from_config(&config.mpesa));
        let http_client = GatewayHttpClient::with_timeout(payments.request_timeout())
            .wrap_err("Failed to build gateway HTTP client")?;

        let tokens = Arc::new(TokenManager::new(
            credentials.clone(),
            http_client.clone(),
            TokenPolicy {
                fallback_lifetime: payments.token_fallback_lifetime(),
                expiry_margin: payments.token_expiry_margin(),
                retry: RetryStrategy::new(
                    payments.token_retry_attempts,
                    payments.token_retry_base_delay_ms,
                ),
            },
        ));

        let tracker = CorrelationTracker::new(TrackerPolicy {
            ttl: payments.correlation_ttl(),
            retention: payments.archive_retention(),
        });

        let initiator = PaymentInitiator::new(
            credentials,
            tokens,
            http_client,
            tracker.clone(),
            IdempotencyGuard::new(payments.idempotency_window()),
            gateway_offset,
        )
        .with_defaults(RequestDefaults {
            account_reference: payments.account_reference.clone(),
            transaction_desc: payments.transaction_desc.clone(),
        });

        Ok(AppState {
            initiator: Arc::new(initiator),
            tracker,
            gateway_offset,
        })
    }

    pub fn port(&self) -> Result<u16> {
        self.listener
            .local_addr()
            .map(|addr| addr.port())
            .map_err(|e| eyre!("Listener has no local address: {e}"))
    }

    /// Runs the HTTP server.
    pub async fn run(self) -> Result<()> {
        tracing::info!("Server listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router).await?;
        Ok(())
    }
}
