use crate::query::builder::{is_valid_table_name, Tables, DEFAULT_GA4_TABLE, DEFAULT_UA_TABLE};
use crate::query::cost::DEFAULT_COST_PER_TIB_USD;
use crate::warehouse::auth::CredentialSource;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration loaded from environment variables or TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Key used to sign CSRF tokens. Empty means a random key is generated
    /// at startup, which invalidates open forms on every restart.
    #[serde(default)]
    pub secret_key: String,
    /// Host names the service answers to. Empty allows any `Host` header.
    #[serde(default)]
    pub allowed_hosts: Vec<String>,
    /// Service-account key file. If not set, application default
    /// credentials are used.
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    /// Project billed for queries. Defaults to the credentials' project.
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default = "default_ua_table")]
    pub ua_table: String,
    #[serde(default = "default_ga4_table")]
    pub ga4_table: String,
    /// Requests per second per client address. 0 = no limit.
    #[serde(default = "default_rate_limit_per_second")]
    pub rate_limit_per_second: u32,
    /// Requests per minute per client address. 0 = no limit.
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
    /// Read the client address from `X-Forwarded-For` / `X-Real-IP`. Only
    /// enable behind a proxy that sets these headers.
    #[serde(default)]
    pub trust_forwarded_for: bool,
    /// Mark cookies `Secure` (default: true). Disable for plain-HTTP local runs.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
    #[serde(default = "default_cost_per_tib_usd")]
    pub cost_per_tib_usd: f64,
    /// BigQuery REST root override, e.g. a local emulator.
    #[serde(default)]
    pub bigquery_api_url: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

const fn default_port() -> u16 {
    8000
}

fn default_ua_table() -> String {
    DEFAULT_UA_TABLE.to_string()
}

fn default_ga4_table() -> String {
    DEFAULT_GA4_TABLE.to_string()
}

const fn default_rate_limit_per_second() -> u32 {
    2
}

const fn default_rate_limit_per_minute() -> u32 {
    60
}

const fn default_secure_cookies() -> bool {
    true
}

const fn default_cost_per_tib_usd() -> f64 {
    DEFAULT_COST_PER_TIB_USD
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            secret_key: String::new(),
            allowed_hosts: Vec::new(),
            credentials_path: None,
            project_id: None,
            ua_table: default_ua_table(),
            ga4_table: default_ga4_table(),
            rate_limit_per_second: default_rate_limit_per_second(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
            trust_forwarded_for: false,
            secure_cookies: default_secure_cookies(),
            cost_per_tib_usd: default_cost_per_tib_usd(),
            bigquery_api_url: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Environment variables override file values:
    /// - `DISCO_HOST` → host
    /// - `DISCO_PORT` → port
    /// - `DISCO_SECRET_KEY` → secret_key
    /// - `DISCO_ALLOWED_HOSTS` → allowed_hosts (comma separated)
    /// - `DISCO_CREDENTIALS_PATH` → credentials_path
    /// - `DISCO_PROJECT_ID` → project_id
    /// - `DISCO_UA_TABLE` → ua_table
    /// - `DISCO_GA4_TABLE` → ga4_table
    /// - `DISCO_RATE_LIMIT_SECOND` → rate_limit_per_second
    /// - `DISCO_RATE_LIMIT_MINUTE` → rate_limit_per_minute
    /// - `DISCO_TRUST_FORWARDED_FOR` → trust_forwarded_for
    /// - `DISCO_SECURE_COOKIES` → secure_cookies
    /// - `DISCO_COST_PER_TIB` → cost_per_tib_usd
    /// - `DISCO_BIGQUERY_API_URL` → bigquery_api_url
    pub fn load(config_path: Option<&Path>) -> Self {
        let mut config =
            config_path.map_or_else(Self::default, |path| match std::fs::read_to_string(path) {
                Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                    tracing::warn!("Failed to parse config file: {e}, using defaults");
                    Self::default()
                }),
                Err(e) => {
                    tracing::warn!("Failed to read config file: {e}, using defaults");
                    Self::default()
                }
            });

        // Environment variable overrides
        if let Ok(host) = std::env::var("DISCO_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("DISCO_PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }
        if let Ok(secret) = std::env::var("DISCO_SECRET_KEY") {
            config.secret_key = secret;
        }
        if let Ok(hosts) = std::env::var("DISCO_ALLOWED_HOSTS") {
            config.allowed_hosts = hosts
                .split(',')
                .map(str::trim)
                .filter(|h| !h.is_empty())
                .map(String::from)
                .collect();
        }
        if let Ok(path) = std::env::var("DISCO_CREDENTIALS_PATH") {
            config.credentials_path = Some(PathBuf::from(path));
        }
        if let Ok(project) = std::env::var("DISCO_PROJECT_ID") {
            config.project_id = Some(project);
        }
        if let Ok(table) = std::env::var("DISCO_UA_TABLE") {
            config.ua_table = table;
        }
        if let Ok(table) = std::env::var("DISCO_GA4_TABLE") {
            config.ga4_table = table;
        }
        if let Ok(val) = std::env::var("DISCO_RATE_LIMIT_SECOND") {
            if let Ok(r) = val.parse() {
                config.rate_limit_per_second = r;
            }
        }
        if let Ok(val) = std::env::var("DISCO_RATE_LIMIT_MINUTE") {
            if let Ok(r) = val.parse() {
                config.rate_limit_per_minute = r;
            }
        }
        if let Ok(val) = std::env::var("DISCO_TRUST_FORWARDED_FOR") {
            config.trust_forwarded_for = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(val) = std::env::var("DISCO_SECURE_COOKIES") {
            config.secure_cookies = val != "0" && !val.eq_ignore_ascii_case("false");
        }
        if let Ok(val) = std::env::var("DISCO_COST_PER_TIB") {
            if let Ok(c) = val.parse() {
                config.cost_per_tib_usd = c;
            }
        }

        if let Ok(url) = std::env::var("DISCO_BIGQUERY_API_URL") {
            config.bigquery_api_url = Some(url);
        }

        config.sanitize_tables();
        config
    }

    /// Table names end up in SQL text; reject anything that is not a plain
    /// `project.dataset.table` reference.
    fn sanitize_tables(&mut self) {
        if !is_valid_table_name(&self.ua_table) {
            tracing::warn!(table = %self.ua_table, "Invalid UA table name, using default");
            self.ua_table = default_ua_table();
        }
        if !is_valid_table_name(&self.ga4_table) {
            tracing::warn!(table = %self.ga4_table, "Invalid GA4 table name, using default");
            self.ga4_table = default_ga4_table();
        }
    }

    pub fn tables(&self) -> Tables {
        Tables {
            ua: self.ua_table.clone(),
            ga4: self.ga4_table.clone(),
        }
    }

    pub fn credential_source(&self) -> CredentialSource {
        self.credentials_path.as_ref().map_or(
            CredentialSource::ApplicationDefault,
            |path| CredentialSource::ServiceAccountFile(path.clone()),
        )
    }
}
