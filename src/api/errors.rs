use crate::api::views::ErrorPage;
use crate::warehouse::WarehouseError;
use askama::Template;
use axum::extract::rejection::FormRejection;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

/// Web-layer error type with HTTP status code mapping.
///
/// Every variant renders the generic HTML error page; upstream detail is
/// logged, never shown.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    /// CSRF token missing, malformed or not matching the session cookie.
    CsrfFailed,
    NotFound,
    TooManyRequests,
    Warehouse(WarehouseError),
    Template(askama::Error),
    Internal(String),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            Self::CsrfFailed => write!(f, "CSRF validation failed"),
            Self::NotFound => write!(f, "Not found"),
            Self::TooManyRequests => write!(f, "Too many requests"),
            Self::Warehouse(e) => write!(f, "Warehouse error: {e}"),
            Self::Template(e) => write!(f, "Template error: {e}"),
            Self::Internal(msg) => write!(f, "Internal error: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::CsrfFailed => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            Self::Warehouse(_) | Self::Template(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn page(&self) -> (&'static str, &str) {
        match self {
            Self::BadRequest(msg) => ("Sorry, there is a problem with your request", msg),
            Self::CsrfFailed => (
                "The form has expired",
                "Go back to the previous page, refresh it and submit the form again.",
            ),
            Self::NotFound => (
                "Page not found",
                "If you typed the web address, check it is correct.",
            ),
            Self::TooManyRequests => (
                "Too many requests",
                "You have made too many requests. Wait a minute and try again.",
            ),
            Self::Warehouse(_) | Self::Template(_) | Self::Internal(_) => (
                "Sorry, there is a problem with the service",
                "Try again later.",
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            Self::Warehouse(e) => tracing::error!(error = %e, "Warehouse request failed"),
            Self::Template(e) => tracing::error!(error = %e, "Template rendering failed"),
            Self::Internal(msg) => tracing::error!(error = %msg, "Internal error"),
            Self::CsrfFailed => tracing::warn!("Rejected submission with invalid CSRF token"),
            _ => {}
        }

        let status = self.status();
        let (title, message) = self.page();
        let page = ErrorPage { title, message };
        match page.render() {
            Ok(html) => (status, Html(html)).into_response(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to render error page");
                (status, title.to_string()).into_response()
            }
        }
    }
}

impl From<WarehouseError> for AppError {
    fn from(e: WarehouseError) -> Self {
        Self::Warehouse(e)
    }
}

impl From<askama::Error> for AppError {
    fn from(e: askama::Error) -> Self {
        Self::Template(e)
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        tracing::warn!(
            status = %rejection.status(),
            error = %rejection.body_text(),
            "Rejected unreadable form submission"
        );
        Self::BadRequest("The form could not be read. Go back and try again.".to_string())
    }
}
