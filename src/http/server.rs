//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the interception handler
//! - Wire up middleware (request ID, tracing, timeout, early domain redirects)
//! - Resolve the tenant for each request and run its pipeline
//! - Turn decisions into redirects or upstream forwards
//! - Swap shared state atomically on config reload

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{uri::Scheme, Request, Response, Uri},
    middleware::{self, Next},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::RouterConfig;
use crate::http::request::{self, request_context, MakeRequestUuidV4, X_REQUEST_ID};
use crate::http::response;
use crate::routing::{Decision, EarlyDomainRedirect};
use crate::settings::SettingsCache;
use crate::tenancy::{TenancyError, TenantRegistry};

/// Everything that is rebuilt when the configuration changes.
pub struct Inner {
    pub config: RouterConfig,
    pub registry: TenantRegistry,
    pub early: Option<EarlyDomainRedirect>,
}

impl Inner {
    async fn build(config: RouterConfig, pool: SqlitePool, cache: SettingsCache) -> Result<Self, TenancyError> {
        let registry = TenantRegistry::from_config(pool.clone(), &config.network, cache)?;
        registry.install_all().await?;

        let early = config
            .network
            .early_domain_redirects
            .then(|| EarlyDomainRedirect::new(pool, registry.primary().tables.clone()));

        Ok(Self { config, registry, early })
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<ArcSwap<Inner>>,
    pub client: Client<HttpConnector, Body>,
    pub cache: SettingsCache,
    pool: SqlitePool,
}

impl AppState {
    pub async fn new(config: RouterConfig, pool: SqlitePool) -> Result<Self, TenancyError> {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        let cache = SettingsCache::new();
        let inner = Inner::build(config, pool.clone(), cache.clone()).await?;

        Ok(Self {
            inner: Arc::new(ArcSwap::from_pointee(inner)),
            client,
            cache,
            pool,
        })
    }

    /// Rebuild tenants from `config` and publish them atomically.
    pub async fn reload(&self, config: RouterConfig) -> Result<(), TenancyError> {
        let inner = Inner::build(config, self.pool.clone(), self.cache.clone()).await?;
        let tenants = inner.registry.tenants().count();
        self.inner.store(Arc::new(inner));
        self.cache.clear();
        tracing::info!(tenants, "Configuration reloaded");
        Ok(())
    }
}

#[derive(Debug, Error)]
enum ForwardError {
    #[error("invalid upstream URI: {0}")]
    Uri(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

/// Public HTTP server.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create the server and install every tenant's tables.
    pub async fn new(config: RouterConfig, pool: SqlitePool) -> Result<Self, TenancyError> {
        let request_timeout = Duration::from_secs(config.timeouts.request_secs);
        let state = AppState::new(config, pool).await?;
        let router = Self::build_router(request_timeout, state.clone());
        Ok(Self { router, state })
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// Outermost first: request id, trace, timeout, early redirect, handler.
    #[allow(deprecated)]
    fn build_router(request_timeout: Duration, state: AppState) -> Router {
        Router::new()
            .route("/", any(intercept_handler))
            .route("/{*path}", any(intercept_handler))
            .layer(middleware::from_fn_with_state(state.clone(), early_redirect_middleware))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuidV4))
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, applying config updates as they arrive.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: Option<mpsc::UnboundedReceiver<RouterConfig>>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        if let Some(mut updates) = config_updates {
            let state = self.state.clone();
            tokio::spawn(async move {
                while let Some(config) = updates.recv().await {
                    if let Err(e) = state.reload(config).await {
                        tracing::error!(error = %e, "Failed to apply new configuration. Keeping current state.");
                    }
                }
            });
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Whole-domain redirects for the primary tenant, ahead of tenant resolution.
async fn early_redirect_middleware(State(state): State<AppState>, request: Request<Body>, next: Next) -> Response<Body> {
    let inner = state.inner.load_full();
    if let Some(early) = &inner.early {
        let ctx = request_context(&request, inner.config.network.trust_forwarded_for);
        if let Some(decision) = early.check(&ctx).await {
            return response::redirect(&decision);
        }
    }
    next.run(request).await
}

/// Resolve tenant, decide, then redirect or forward.
async fn intercept_handler(State(state): State<AppState>, request: Request<Body>) -> Response<Body> {
    let inner = state.inner.load_full();
    let request_id = request::request_id(&request);
    let ctx = request_context(&request, inner.config.network.trust_forwarded_for);
    let tenant = inner.registry.resolve_host(&ctx.host);

    tracing::debug!(
        request_id = %request_id,
        tenant = tenant.id(),
        host = %ctx.host,
        path = %ctx.path,
        "Intercepting request"
    );

    let (path_override, canonical) = match tenant.intercept(&ctx).await {
        Decision::Redirect(decision) => return response::redirect(&decision),
        Decision::PassThrough => (None, None),
        Decision::Serve(serve) => (Some(serve.path), Some(serve.canonical_url)),
    };

    match forward(&state.client, &tenant.tenant.upstream, request, path_override.as_deref()).await {
        Ok(upstream) => match canonical {
            Some(url) => response::with_canonical(upstream, &url),
            None => upstream,
        },
        Err(e) => {
            tracing::error!(request_id = %request_id, upstream = %tenant.tenant.upstream, error = %e, "Upstream error");
            response::bad_gateway()
        }
    }
}

/// Send `request` to `upstream`, optionally replacing its path (query kept).
async fn forward(
    client: &Client<HttpConnector, Body>,
    upstream: &str,
    request: Request<Body>,
    path_override: Option<&str>,
) -> Result<Response<Body>, ForwardError> {
    let (mut parts, body) = request.into_parts();

    let path_and_query = match (path_override, parts.uri.query()) {
        (Some(path), Some(query)) => format!("{path}?{query}"),
        (Some(path), None) => path.to_string(),
        (None, _) => parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
    };

    parts.uri = Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(upstream)
        .path_and_query(path_and_query)
        .build()?;

    let response = client.request(Request::from_parts(parts, body)).await?;
    let (parts, body) = response.into_parts();
    Ok(Response::from_parts(parts, Body::new(body)))
}
