//! HTTP API over the AccessiList session store.

mod error;
mod handlers;
pub mod settings;

use std::sync::Arc;

use accessilist_core::csrf::CsrfGuard;
use accessilist_core::rate_limit::RateLimiter;
use accessilist_core::store::SessionStore;
use anyhow::{Context, Result};
use axum::routing::{delete, get, post};
use axum::Router;

pub use error::{ApiError, Envelope};
pub use settings::{ServiceArgs, ServiceSettings};

#[derive(Debug, Clone)]
pub struct AppState {
    pub store: SessionStore,
    pub limiter: RateLimiter,
    pub csrf: Arc<CsrfGuard>,
    pub trust_proxy: bool,
}

impl AppState {
    pub fn new(store: SessionStore, limiter: RateLimiter, csrf: CsrfGuard) -> Self {
        Self {
            store,
            limiter,
            csrf: Arc::new(csrf),
            trust_proxy: false,
        }
    }

    pub fn with_trusted_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    pub fn from_settings(settings: &ServiceSettings) -> Result<Self> {
        let store = SessionStore::open(&settings.sessions_dir).with_context(|| {
            format!(
                "opening sessions directory {}",
                settings.sessions_dir.display()
            )
        })?;
        let limiter = RateLimiter::new(&settings.rate_limit_dir, settings.environment);
        let csrf = match settings.csrf_secret.as_deref() {
            Some(secret) => CsrfGuard::new(secret),
            None => {
                tracing::warn!("no CSRF secret configured; tokens will not survive a restart");
                CsrfGuard::ephemeral()
            }
        };
        Ok(Self::new(store, limiter, csrf).with_trusted_proxy(settings.trust_proxy))
    }
}

pub fn build_router(state: AppState) -> Router {
    let not_allowed = handlers::method_not_allowed;
    Router::new()
        .route(
            "/api/generate-key",
            get(handlers::generate_key).fallback(not_allowed),
        )
        .route(
            "/api/instantiate",
            post(handlers::instantiate).fallback(not_allowed),
        )
        .route("/api/save", post(handlers::save).fallback(not_allowed))
        .route("/api/restore", get(handlers::restore).fallback(not_allowed))
        .route("/api/delete", delete(handlers::delete).fallback(not_allowed))
        .route("/api/list", get(handlers::list).fallback(not_allowed))
        .route(
            "/api/list-detailed",
            get(handlers::list_detailed).fallback(not_allowed),
        )
        .route("/api/report", get(handlers::report).fallback(not_allowed))
        .route("/api/csrf", get(handlers::csrf_token).fallback(not_allowed))
        .route("/health", get(handlers::health).fallback(not_allowed))
        .fallback(handlers::not_found)
        .with_state(state)
}
