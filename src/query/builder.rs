use crate::query::request::{ExtractRequest, SchemaVersion};
use chrono::NaiveDate;

/// Which of the two queries to build for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Minimal projection, only ever submitted as a dry run.
    Estimate,
    /// Full column set for the downloadable CSV.
    Extract,
}

/// Named STRING parameter bound alongside the SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryParameter {
    pub name: &'static str,
    pub value: String,
}

/// SQL text plus its bound parameters. User input only ever appears in
/// `parameters`, never in `sql`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryText {
    pub sql: String,
    pub parameters: Vec<QueryParameter>,
}

impl QueryText {
    /// Look up a bound parameter value by name.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.value.as_str())
    }
}

/// Wildcard tables the templates read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    pub ua: String,
    pub ga4: String,
}

pub const DEFAULT_UA_TABLE: &str = "govuk-bigquery-analytics.87773428.ga_sessions_*";
pub const DEFAULT_GA4_TABLE: &str =
    "ga4-analytics-352613.flattened_dataset.flattened_daily_ga_data_*";

impl Default for Tables {
    fn default() -> Self {
        Self {
            ua: DEFAULT_UA_TABLE.to_string(),
            ga4: DEFAULT_GA4_TABLE.to_string(),
        }
    }
}

/// Table names are spliced into the SQL text, so they are restricted to the
/// characters a `project.dataset.table_*` reference can contain.
pub fn is_valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').count() == 3
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '*'))
}

pub const PARAM_FIRST_DATE: &str = "first_date";
pub const PARAM_FINAL_DATE: &str = "final_date";
pub const PARAM_URL_PATTERN: &str = "filtered_urls_for";

const TABLE_TOKEN: &str = "__TABLE__";

const UA_SESSIONS_CTE: &str = r"
WITH
  sessions AS (
    SELECT DISTINCT fullVisitorId, visitId
    FROM `__TABLE__`, UNNEST(hits) AS hits
    WHERE _TABLE_SUFFIX BETWEEN @first_date AND @final_date
    AND REGEXP_CONTAINS(hits.page.pagePath, @filtered_urls_for)
  )
";

const UA_ESTIMATE_SELECT: &str = r"
SELECT
  CAST(TIMESTAMP_MILLIS(CAST(hits.time + (visitStartTime * 1000) AS INT64)) AS STRING) AS datetime,
  hits.page.pagePath,
  hits.eventInfo.eventCategory,
  hits.eventInfo.eventAction,
  hits.eventInfo.eventLabel
FROM `__TABLE__`, UNNEST(hits) AS hits
INNER JOIN sessions USING (fullVisitorId, visitId)
WHERE _TABLE_SUFFIX BETWEEN @first_date AND @final_date
AND hits.page.pagePath NOT LIKE '/print%'
";

// The `_copy` columns duplicate earlier columns; downstream spreadsheets
// expect them, so they stay.
const UA_EXTRACT_SELECT: &str = r"
SELECT
  'DataLabs' AS tablesource,
  _TABLE_SUFFIX AS tabledate,
  fullVisitorId,
  visitId,
  CAST(TIMESTAMP_MILLIS(CAST(hits.time + (visitStartTime * 1000) AS INT64)) AS STRING) AS datetime,
  hits.hitNumber,
  hits.page.pagePath,
  hits.type,
  hits.eventInfo.eventCategory,
  hits.eventInfo.eventAction,
  hits.eventInfo.eventLabel,
  (SELECT value FROM hits.customDimensions WHERE index = 4) AS content_id,
  (SELECT value FROM hits.customDimensions WHERE index = 2) AS document_type,
  device.isMobile,
  CONCAT(fullVisitorId, '-', visitId) AS SessionId,
  hits.page.pagePath AS page_path_copy,
  hits.eventInfo.eventCategory AS event_category_copy,
  hits.eventInfo.eventAction AS event_action_copy,
  hits.eventInfo.eventLabel AS event_label_copy
FROM `__TABLE__`, UNNEST(hits) AS hits
INNER JOIN sessions USING (fullVisitorId, visitId)
WHERE _TABLE_SUFFIX BETWEEN @first_date AND @final_date
AND hits.page.pagePath NOT LIKE '/print%'
";

const GA4_SESSIONS_CTE: &str = r"
WITH
  sessions AS (
    SELECT DISTINCT unique_session_id
    FROM `__TABLE__`
    WHERE _TABLE_SUFFIX BETWEEN @first_date AND @final_date
    AND event_name = 'session_start'
    AND REGEXP_CONTAINS(cleaned_page_location, @filtered_urls_for)
  )
";

const GA4_ESTIMATE_SELECT: &str = r"
SELECT
  FORMAT_TIMESTAMP('%Y-%m-%d %H:%M:%S', TIMESTAMP_MILLIS(CAST(event_timestamp / 1000 AS INT64))) AS datetime,
  cleaned_page_location,
  event_name
FROM `__TABLE__`
INNER JOIN sessions USING (unique_session_id)
WHERE _TABLE_SUFFIX BETWEEN @first_date AND @final_date
AND cleaned_page_location NOT LIKE '/print%'
AND category = 'mobile'
GROUP BY ALL
";

// TODO: confirm with the analytics team whether the page_view filter should
// be reinstated; it has been disabled since the GA4 export was added.
const GA4_EXTRACT_SELECT: &str = r"
SELECT
  'DataLabs' AS tablesource,
  _TABLE_SUFFIX AS tabledate,
  cleaned_page_location,
  unique_session_id,
  event_name,
  type,
  FORMAT_TIMESTAMP('%Y-%m-%d %H:%M:%S', TIMESTAMP_MILLIS(CAST(event_timestamp / 1000 AS INT64))) AS datetime,
  category
FROM `__TABLE__`
INNER JOIN sessions USING (unique_session_id)
WHERE _TABLE_SUFFIX BETWEEN @first_date AND @final_date
AND cleaned_page_location NOT LIKE '/print%'
AND category = 'mobile'
--AND event_name = 'page_view'
GROUP BY ALL
";

/// Render a date as the `YYYYMMDD` suffix used by the daily export tables.
pub fn format_partition_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Build the SQL for `kind` against the schema selected by the request.
///
/// The date range and URL pattern are bound as named parameters
/// (`@first_date`, `@final_date`, `@filtered_urls_for`).
pub fn build_query(kind: QueryKind, req: &ExtractRequest, tables: &Tables) -> QueryText {
    let (table, cte, select) = match (req.schema_version, kind) {
        (SchemaVersion::Ua, QueryKind::Estimate) => (&tables.ua, UA_SESSIONS_CTE, UA_ESTIMATE_SELECT),
        (SchemaVersion::Ua, QueryKind::Extract) => (&tables.ua, UA_SESSIONS_CTE, UA_EXTRACT_SELECT),
        (SchemaVersion::Ga4, QueryKind::Estimate) => {
            (&tables.ga4, GA4_SESSIONS_CTE, GA4_ESTIMATE_SELECT)
        }
        (SchemaVersion::Ga4, QueryKind::Extract) => {
            (&tables.ga4, GA4_SESSIONS_CTE, GA4_EXTRACT_SELECT)
        }
    };

    let mut sql = String::with_capacity(cte.len() + select.len());
    sql.push_str(cte.trim_start());
    sql.push_str(select);
    let sql = sql.replace(TABLE_TOKEN, table);

    QueryText {
        sql,
        parameters: vec![
            QueryParameter {
                name: PARAM_FIRST_DATE,
                value: format_partition_date(req.start_date),
            },
            QueryParameter {
                name: PARAM_FINAL_DATE,
                value: format_partition_date(req.end_date),
            },
            QueryParameter {
                name: PARAM_URL_PATTERN,
                value: req.desired_url.clone(),
            },
        ],
    }
}
