use crate::api::cookie::{read_cookie, set_cookie};
use crate::api::errors::AppError;
use crate::api::views::{render_page, CookiesPage};
use crate::api::{AppForm, AppState};
use crate::forms::cookies::{choice, ConsentPreferences, CookiesForm, CONSENT_COOKIE};
use crate::forms::FieldErrors;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use std::sync::Arc;

/// Consent is remembered for one year.
const CONSENT_MAX_AGE_SECS: u64 = 365 * 24 * 60 * 60;

/// GET /cookies — Consent form preset from any stored choices.
pub async fn show_cookies(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let prefs = read_cookie(&headers, CONSENT_COOKIE)
        .and_then(|value| ConsentPreferences::from_cookie_value(&value))
        .unwrap_or_default();
    let session = state.csrf.session(&headers, state.secure_cookies)?;
    render_page(
        &CookiesPage {
            functional: choice(prefs.functional),
            analytics: choice(prefs.analytics),
            errors: &FieldErrors::default(),
            csrf_token: &session.token,
            saved: false,
        },
        session.cookies(),
    )
}

/// POST /cookies — Store the visitor's choices.
pub async fn save_cookies(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppForm(form): AppForm<CookiesForm>,
) -> Result<Response, AppError> {
    let session = state.csrf.check(&headers, &form.csrf_token)?;
    let prefs = match form.validate() {
        Ok(prefs) => prefs,
        Err(errors) => {
            return render_page(
                &CookiesPage {
                    functional: form.functional.as_deref().unwrap_or_default(),
                    analytics: form.analytics.as_deref().unwrap_or_default(),
                    errors: &errors,
                    csrf_token: &session.token,
                    saved: false,
                },
                session.cookies(),
            );
        }
    };

    let value = prefs
        .to_cookie_value()
        .map_err(|e| AppError::Internal(format!("encode consent cookie: {e}")))?;
    // Read by client-side scripts, so not HttpOnly.
    let cookie = set_cookie(
        CONSENT_COOKIE,
        &value,
        Some(CONSENT_MAX_AGE_SECS),
        false,
        state.secure_cookies,
    )?;
    tracing::debug!(
        functional = prefs.functional,
        analytics = prefs.analytics,
        "Cookie preferences saved"
    );

    render_page(
        &CookiesPage {
            functional: choice(prefs.functional),
            analytics: choice(prefs.analytics),
            errors: &FieldErrors::default(),
            csrf_token: &session.token,
            saved: true,
        },
        std::iter::once(cookie),
    )
}
