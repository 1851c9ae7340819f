//! GraphQL HTTP and websocket server.
//!
//! `/graphql` answers queries over `POST` and subscriptions over a websocket
//! upgrade on `GET` (`graphql-transport-ws` and the legacy `graphql-ws`).
//! A plain `GET` serves GraphiQL.

use std::future::Future;
use std::time::Duration;

use async_graphql::http::{ALL_WEBSOCKET_PROTOCOLS, GraphiQLSource};
use async_graphql_axum::{GraphQLProtocol, GraphQLRequest, GraphQLResponse, GraphQLWebSocket};
use axum::{
    Router,
    extract::{State, WebSocketUpgrade, ws::rejection::WebSocketUpgradeRejection},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::types::PulseSchema;

const GRAPHQL_PATH: &str = "/graphql";

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_playground: bool,
    /// Close a websocket that sends no message (not even a ping) for this long.
    pub ws_keepalive: Duration,
    /// Upper bound on one HTTP request.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4000,
            enable_playground: true,
            ws_keepalive: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Absolute websocket URL of the GraphQL endpoint, as a browser reaches it.
    pub fn ws_endpoint(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" | "::" | "[::]" => "localhost",
            host => host,
        };
        format!("ws://{}:{}{}", host, self.port, GRAPHQL_PATH)
    }
}

#[derive(Clone)]
struct AppState {
    schema: PulseSchema,
    enable_playground: bool,
    ws_keepalive: Duration,
    ws_endpoint: String,
}

/// Build the HTTP router for `schema`.
pub fn router(schema: PulseSchema, config: &ServerConfig) -> Router {
    let state = AppState {
        schema,
        enable_playground: config.enable_playground,
        ws_keepalive: config.ws_keepalive,
        ws_endpoint: config.ws_endpoint(),
    };

    let mut app = Router::new()
        .route(GRAPHQL_PATH, get(graphql_get).post(graphql_handler))
        .route("/health", get(health_check));

    if config.enable_playground {
        app = app.route("/", get(graphql_playground));
    }

    app.with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(config.request_timeout))
        .layer(CorsLayer::permissive())
}

/// Start the GraphQL server with graceful shutdown support.
pub async fn serve_with_shutdown<F>(
    schema: PulseSchema,
    config: ServerConfig,
    shutdown_signal: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("⚡ GraphQL server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(schema, &config))
        .with_graceful_shutdown(shutdown_signal)
        .await
}

/// GraphQL query handler.
async fn graphql_handler(State(state): State<AppState>, req: GraphQLRequest) -> GraphQLResponse {
    state.schema.execute(req.into_inner()).await.into()
}

/// Websocket subscriptions, or GraphiQL for a plain `GET`.
async fn graphql_get(
    State(state): State<AppState>,
    protocol: Result<GraphQLProtocol, StatusCode>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    match (upgrade.ok(), protocol.ok()) {
        (Some(upgrade), Some(protocol)) => {
            let AppState {
                schema,
                ws_keepalive,
                ..
            } = state;

            upgrade
                .protocols(ALL_WEBSOCKET_PROTOCOLS)
                .on_upgrade(move |socket| async move {
                    debug!("Websocket connected");
                    GraphQLWebSocket::new(socket, schema, protocol)
                        .keepalive_timeout(ws_keepalive)
                        .serve()
                        .await;
                    debug!("Websocket closed");
                })
        }
        (Some(_), None) => {
            (StatusCode::BAD_REQUEST, "unsupported websocket subprotocol").into_response()
        }
        (None, _) if state.enable_playground => {
            graphql_playground(State(state)).await.into_response()
        }
        (None, _) => StatusCode::METHOD_NOT_ALLOWED.into_response(),
    }
}

/// GraphQL Playground UI.
async fn graphql_playground(State(state): State<AppState>) -> impl IntoResponse {
    Html(
        GraphiQLSource::build()
            .endpoint(GRAPHQL_PATH)
            .subscription_endpoint(&state.ws_endpoint)
            .finish(),
    )
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
