pub mod consent;
pub mod cookie;
pub mod csrf;
pub mod errors;
pub mod extract;
pub mod ratelimit;
pub mod views;

use crate::api::csrf::CsrfGuard;
use crate::api::errors::AppError;
use crate::api::ratelimit::RateLimits;
use crate::config::Config;
use crate::query::builder::Tables;
use crate::warehouse::Warehouse;
use axum::extract::{FromRequest, Request};
use axum::Form;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// `Form` whose rejections render the HTML error page instead of axum's
/// plain-text 415/422 responses.
pub struct AppForm<T>(pub T);

impl<T, S> FromRequest<S> for AppForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Form(value) = Form::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Shared application state passed to all handlers.
pub struct AppState {
    pub warehouse: Arc<dyn Warehouse>,
    pub tables: Tables,
    pub cost_per_tib_usd: f64,
    pub csrf: CsrfGuard,
    pub rate_limits: RateLimits,
    /// Accepted `Host` header values. Empty accepts any host.
    pub allowed_hosts: Vec<String>,
    pub trust_forwarded_for: bool,
    pub secure_cookies: bool,
}

impl AppState {
    pub fn new(config: &Config, warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            warehouse,
            tables: config.tables(),
            cost_per_tib_usd: config.cost_per_tib_usd,
            csrf: CsrfGuard::new(&config.secret_key),
            rate_limits: RateLimits::new(
                config.rate_limit_per_second,
                config.rate_limit_per_minute,
            ),
            allowed_hosts: config.allowed_hosts.clone(),
            trust_forwarded_for: config.trust_forwarded_for,
            secure_cookies: config.secure_cookies,
        }
    }
}
