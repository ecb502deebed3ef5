use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

/// Analytics schema an extract is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaVersion {
    /// Legacy Universal Analytics session/hit export.
    #[default]
    Ua,
    /// Flattened GA4 event export.
    Ga4,
}

impl SchemaVersion {
    /// Form value used by the schema selector.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ua => "ua",
            Self::Ga4 => "ga4",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Ua => "Universal Analytics",
            Self::Ga4 => "Google Analytics 4",
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ua" => Ok(Self::Ua),
            "ga4" => Ok(Self::Ga4),
            other => Err(format!("unknown schema version: {other}")),
        }
    }
}

/// A validated extract request. Built by the extract form once every field
/// has passed validation; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractRequest {
    /// Regular expression matched against page paths. Starts with `/`.
    pub desired_url: String,
    pub start_date: NaiveDate,
    /// Always on or after `start_date`.
    pub end_date: NaiveDate,
    pub schema_version: SchemaVersion,
}

impl ExtractRequest {
    /// Suggested download file name, e.g. `ga4_20240101_20240107.csv`.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.csv",
            self.schema_version,
            self.start_date.format("%Y%m%d"),
            self.end_date.format("%Y%m%d")
        )
    }
}
