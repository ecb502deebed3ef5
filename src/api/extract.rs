use crate::api::errors::AppError;
use crate::api::views::{render_page, EstimatePage, ExtractPage};
use crate::api::{AppForm, AppState};
use crate::export::render_csv;
use crate::forms::extract::ExtractForm;
use crate::forms::FieldErrors;
use crate::query::builder::{build_query, QueryKind};
use crate::query::cost::CostEstimate;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// GET / — Empty extract form.
pub async fn show_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let session = state.csrf.session(&headers, state.secure_cookies)?;
    render_page(
        &ExtractPage {
            form: &ExtractForm::default(),
            errors: &FieldErrors::default(),
            csrf_token: &session.token,
        },
        session.cookies(),
    )
}

/// POST / — Validate the form and dry-run the estimate query.
///
/// Invalid input re-renders the form with 200 and the messages inline.
pub async fn submit_form(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppForm(form): AppForm<ExtractForm>,
) -> Result<Response, AppError> {
    let session = state.csrf.check(&headers, &form.csrf_token)?;
    let request = match form.validate() {
        Ok(request) => request,
        Err(errors) => {
            return render_page(
                &ExtractPage {
                    form: &form,
                    errors: &errors,
                    csrf_token: &session.token,
                },
                session.cookies(),
            );
        }
    };

    let query = build_query(QueryKind::Estimate, &request, &state.tables);
    let bytes = state.warehouse.dry_run(&query).await?;
    let estimate = CostEstimate::from_bytes(bytes, state.cost_per_tib_usd);

    tracing::debug!(url_pattern = %request.desired_url, "Estimate requested");
    tracing::info!(
        schema = %request.schema_version,
        start = %request.start_date,
        end = %request.end_date,
        bytes_processed = bytes,
        gb_processed = estimate.gb_processed,
        cost_usd = estimate.cost_usd,
        "Estimated extract cost"
    );

    render_page(
        &EstimatePage {
            form: &form,
            request: &request,
            estimate: &estimate,
            csrf_token: &session.token,
        },
        session.cookies(),
    )
}

/// POST /download — Run the extract query and return it as a CSV attachment.
pub async fn download(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AppForm(form): AppForm<ExtractForm>,
) -> Result<Response, AppError> {
    let session = state.csrf.check(&headers, &form.csrf_token)?;
    let request = match form.validate() {
        Ok(request) => request,
        Err(errors) => {
            return render_page(
                &ExtractPage {
                    form: &form,
                    errors: &errors,
                    csrf_token: &session.token,
                },
                session.cookies(),
            );
        }
    };

    let query = build_query(QueryKind::Extract, &request, &state.tables);
    let table = state.warehouse.query(&query).await?;
    let csv = render_csv(&table);

    tracing::debug!(url_pattern = %request.desired_url, "Extract requested");
    tracing::info!(
        schema = %request.schema_version,
        start = %request.start_date,
        end = %request.end_date,
        rows = table.row_count(),
        "Extract downloaded"
    );

    let disposition =
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", request.file_name()))
            .map_err(|e| AppError::Internal(format!("invalid file name: {e}")))?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/csv; charset=utf-8"),
            ),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        csv,
    )
        .into_response())
}
