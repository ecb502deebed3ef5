use crate::query::builder::QueryText;
use crate::warehouse::auth::Credentials;
use crate::warehouse::{Result, Table, Warehouse, WarehouseError};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";

/// Server-side wait per request while a job is still running.
const POLL_TIMEOUT_MS: u32 = 10_000;

/// BigQuery client speaking the v2 REST API (`jobs.query` and
/// `jobs.getQueryResults`).
pub struct BigQueryClient {
    http: reqwest::Client,
    credentials: Credentials,
    project_id: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    query: &'a str,
    use_legacy_sql: bool,
    dry_run: bool,
    use_query_cache: bool,
    parameter_mode: &'static str,
    query_parameters: Vec<ApiParameter<'a>>,
    timeout_ms: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiParameter<'a> {
    name: &'a str,
    parameter_type: ParameterType,
    parameter_value: ParameterValue<'a>,
}

#[derive(Debug, Serialize)]
struct ParameterType {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ParameterValue<'a> {
    value: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_reference: Option<JobReference>,
    #[serde(default)]
    job_complete: Option<bool>,
    #[serde(default)]
    total_bytes_processed: Option<String>,
    #[serde(default)]
    schema: Option<TableSchema>,
    #[serde(default)]
    rows: Vec<ApiRow>,
    #[serde(default)]
    page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    #[serde(default)]
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TableSchema {
    #[serde(default)]
    fields: Vec<FieldSchema>,
}

#[derive(Debug, Deserialize)]
struct FieldSchema {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiRow {
    #[serde(default)]
    f: Vec<ApiCell>,
}

#[derive(Debug, Deserialize)]
struct ApiCell {
    #[serde(default)]
    v: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

impl<'a> QueryRequest<'a> {
    /// Dry runs bypass the query cache so the plan reports real bytes.
    fn new(query: &'a QueryText, dry_run: bool) -> Self {
        Self {
            query: &query.sql,
            use_legacy_sql: false,
            dry_run,
            use_query_cache: !dry_run,
            parameter_mode: "NAMED",
            query_parameters: query
                .parameters
                .iter()
                .map(|p| ApiParameter {
                    name: p.name,
                    parameter_type: ParameterType { kind: "STRING" },
                    parameter_value: ParameterValue { value: &p.value },
                })
                .collect(),
            timeout_ms: POLL_TIMEOUT_MS,
        }
    }
}

impl BigQueryClient {
    pub fn new(credentials: Credentials, project_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            project_id,
            base_url: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API root, e.g. a local emulator.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    async fn start_query(&self, query: &QueryText, dry_run: bool) -> Result<QueryResponse> {
        let body = QueryRequest::new(query, dry_run);
        let url = format!("{}/projects/{}/queries", self.base_url, self.project_id);
        self.send(self.http.post(url).json(&body)).await
    }

    async fn query_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
    ) -> Result<QueryResponse> {
        let url = format!(
            "{}/projects/{}/queries/{}",
            self.base_url, self.project_id, job.job_id
        );
        let mut params = vec![("timeoutMs", POLL_TIMEOUT_MS.to_string())];
        if let Some(location) = &job.location {
            params.push(("location", location.clone()));
        }
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        self.send(self.http.get(url).query(&params)).await
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let token = self.credentials.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }
        response
            .json::<T>()
            .await
            .map_err(|e| WarehouseError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Warehouse for BigQueryClient {
    async fn dry_run(&self, query: &QueryText) -> Result<u64> {
        let response = self.start_query(query, true).await?;
        bytes_processed(&response)
    }

    async fn query(&self, query: &QueryText) -> Result<Table> {
        let mut response = self.start_query(query, false).await?;
        let job = response
            .job_reference
            .clone()
            .ok_or_else(|| WarehouseError::Decode("missing jobReference".to_string()))?;

        while !response.job_complete.unwrap_or(true) {
            tracing::debug!(job_id = %job.job_id, "Waiting for query job to complete");
            response = self.query_results(&job, None).await?;
        }

        let mut table = Table {
            columns: column_names(&response)?,
            rows: Vec::new(),
        };
        append_rows(&mut table, response.rows);

        let mut page_token = response.page_token;
        while let Some(token) = page_token {
            let page = self.query_results(&job, Some(&token)).await?;
            append_rows(&mut table, page.rows);
            page_token = page.page_token;
        }

        Ok(table)
    }
}

fn bytes_processed(response: &QueryResponse) -> Result<u64> {
    response
        .total_bytes_processed
        .as_deref()
        .ok_or_else(|| WarehouseError::Decode("missing totalBytesProcessed".to_string()))?
        .parse()
        .map_err(|e| WarehouseError::Decode(format!("totalBytesProcessed: {e}")))
}

fn column_names(response: &QueryResponse) -> Result<Vec<String>> {
    let schema = response
        .schema
        .as_ref()
        .ok_or_else(|| WarehouseError::Decode("missing schema".to_string()))?;
    Ok(schema.fields.iter().map(|f| f.name.clone()).collect())
}

fn append_rows(table: &mut Table, rows: Vec<ApiRow>) {
    table.rows.extend(
        rows.into_iter()
            .map(|row| row.f.into_iter().map(|cell| cell_text(cell.v)).collect()),
    );
}

/// Scalars arrive as JSON strings; nested records and arrays are kept as
/// their JSON text.
fn cell_text(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body)
        .map_or_else(|_| body.trim().to_string(), |e| e.error.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::builder::QueryParameter;

    fn parse(json: serde_json::Value) -> QueryResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_bytes_processed_from_dry_run() {
        let response = parse(serde_json::json!({
            "kind": "bigquery#queryResponse",
            "jobReference": {"projectId": "p", "location": "EU"},
            "totalBytesProcessed": "1099511627776",
            "jobComplete": true,
            "cacheHit": false
        }));
        assert_eq!(bytes_processed(&response).unwrap(), 1_099_511_627_776);
    }

    #[test]
    fn test_bytes_processed_missing() {
        let response = parse(serde_json::json!({"jobComplete": true}));
        assert!(matches!(
            bytes_processed(&response),
            Err(WarehouseError::Decode(_))
        ));
    }

    #[test]
    fn test_rows_follow_schema_order() {
        let response = parse(serde_json::json!({
            "jobReference": {"projectId": "p", "jobId": "job_1"},
            "jobComplete": true,
            "schema": {"fields": [
                {"name": "datetime", "type": "STRING"},
                {"name": "pagePath", "type": "STRING"},
                {"name": "hitNumber", "type": "INTEGER"}
            ]},
            "rows": [
                {"f": [{"v": "2024-01-01 10:00:00"}, {"v": "/apply"}, {"v": "1"}]},
                {"f": [{"v": "2024-01-01 10:01:00"}, {"v": null}, {"v": "2"}]}
            ],
            "totalRows": "2"
        }));
        let mut table = Table {
            columns: column_names(&response).unwrap(),
            rows: Vec::new(),
        };
        append_rows(&mut table, response.rows);

        assert_eq!(table.columns, vec!["datetime", "pagePath", "hitNumber"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0][1].as_deref(), Some("/apply"));
        assert_eq!(table.rows[1][1], None);
    }

    #[test]
    fn test_nested_cell_kept_as_json() {
        let value = serde_json::json!([{"v": "a"}]);
        assert_eq!(cell_text(value).unwrap(), r#"[{"v":"a"}]"#);
        assert_eq!(cell_text(serde_json::json!(true)).unwrap(), "true");
    }

    #[test]
    fn test_api_error_message() {
        let body = r#"{"error": {"code": 400, "message": "Syntax error: Unexpected keyword", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(api_error_message(body), "Syntax error: Unexpected keyword");
        assert_eq!(api_error_message("Bad Gateway\n"), "Bad Gateway");
    }

    #[test]
    fn test_request_body_binds_named_parameters() {
        let query = QueryText {
            sql: "SELECT @first_date".to_string(),
            parameters: vec![QueryParameter {
                name: "first_date",
                value: "20240101".to_string(),
            }],
        };
        let json = serde_json::to_value(QueryRequest::new(&query, true)).unwrap();
        assert_eq!(json["dryRun"], true);
        assert_eq!(json["useQueryCache"], false);
        assert_eq!(json["useLegacySql"], false);
        assert_eq!(json["parameterMode"], "NAMED");
        assert_eq!(json["queryParameters"][0]["name"], "first_date");
        assert_eq!(json["queryParameters"][0]["parameterType"]["type"], "STRING");
        assert_eq!(json["queryParameters"][0]["parameterValue"]["value"], "20240101");

        let json = serde_json::to_value(QueryRequest::new(&query, false)).unwrap();
        assert_eq!(json["dryRun"], false);
        assert_eq!(json["useQueryCache"], true);
    }
}
