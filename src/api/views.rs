use crate::api::errors::AppError;
use crate::forms::extract::ExtractForm;
use crate::forms::FieldErrors;
use crate::query::cost::CostEstimate;
use crate::query::request::ExtractRequest;
use askama::Template;
use axum::http::{header, HeaderValue};
use axum::response::{Html, IntoResponse, Response};

/// Extract request form (`GET /`, and `POST /` when validation fails).
#[derive(Template)]
#[template(path = "extract.html")]
pub struct ExtractPage<'a> {
    pub form: &'a ExtractForm,
    pub errors: &'a FieldErrors,
    pub csrf_token: &'a str,
}

/// Dry-run result with a confirm button that re-posts the request to
/// `/download`.
#[derive(Template)]
#[template(path = "estimate.html")]
pub struct EstimatePage<'a> {
    pub form: &'a ExtractForm,
    pub request: &'a ExtractRequest,
    pub estimate: &'a CostEstimate,
    pub csrf_token: &'a str,
}

impl EstimatePage<'_> {
    fn start_date(&self) -> String {
        self.request.start_date.format("%-d %B %Y").to_string()
    }

    fn end_date(&self) -> String {
        self.request.end_date.format("%-d %B %Y").to_string()
    }
}

#[derive(Template)]
#[template(path = "cookies.html")]
pub struct CookiesPage<'a> {
    pub functional: &'a str,
    pub analytics: &'a str,
    pub errors: &'a FieldErrors,
    pub csrf_token: &'a str,
    pub saved: bool,
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorPage<'a> {
    pub title: &'a str,
    pub message: &'a str,
}

/// Render `page` as HTML, appending any `Set-Cookie` values.
pub fn render_page<T: Template>(
    page: &T,
    cookies: impl IntoIterator<Item = HeaderValue>,
) -> Result<Response, AppError> {
    let mut response = Html(page.render()?).into_response();
    for cookie in cookies {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }
    Ok(response)
}
