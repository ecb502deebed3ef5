use crate::warehouse::{Result, WarehouseError};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const METADATA_HOST: &str = "http://metadata.google.internal";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Tokens are refreshed this long before they actually expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where warehouse credentials come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialSource {
    /// An explicit service-account key file.
    ServiceAccountFile(PathBuf),
    /// `GOOGLE_APPLICATION_CREDENTIALS`, then the gcloud well-known file,
    /// then the GCE metadata server.
    ApplicationDefault,
}

#[derive(Debug, Clone, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default)]
    private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    token_uri: String,
    #[serde(default)]
    project_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AuthorizedUser {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default)]
    quota_project_id: Option<String>,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CredentialFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
}

enum Provider {
    ServiceAccount {
        key: ServiceAccountKey,
        signing_key: EncodingKey,
    },
    AuthorizedUser(AuthorizedUser),
    Metadata,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

const fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// OAuth2 credentials for the BigQuery API.
///
/// Loaded once at startup. Access tokens are fetched lazily and reused
/// until shortly before they expire.
pub struct Credentials {
    provider: Provider,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl Credentials {
    /// Resolve credentials from `source`. A missing or malformed key file is
    /// an error; callers treat it as fatal.
    pub fn load(source: &CredentialSource) -> Result<Self> {
        match source {
            CredentialSource::ServiceAccountFile(path) => {
                let creds = Self::from_file(path)?;
                if matches!(creds.provider, Provider::ServiceAccount { .. }) {
                    Ok(creds)
                } else {
                    Err(WarehouseError::Credentials(format!(
                        "{} is not a service account key",
                        path.display()
                    )))
                }
            }
            CredentialSource::ApplicationDefault => {
                if let Ok(path) = std::env::var("GOOGLE_APPLICATION_CREDENTIALS") {
                    return Self::from_file(Path::new(&path));
                }
                if let Some(path) = well_known_file().filter(|p| p.exists()) {
                    return Self::from_file(&path);
                }
                tracing::info!("No credentials file found, using the metadata server");
                Ok(Self::with_provider(Provider::Metadata))
            }
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| WarehouseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&contents)
    }

    /// Parse a service-account or authorized-user credentials document.
    pub fn from_json(contents: &str) -> Result<Self> {
        let file: CredentialFile = serde_json::from_str(contents)
            .map_err(|e| WarehouseError::Credentials(e.to_string()))?;
        let provider = match file {
            CredentialFile::ServiceAccount(key) => {
                let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
                    .map_err(|e| WarehouseError::Credentials(format!("private_key: {e}")))?;
                Provider::ServiceAccount { key, signing_key }
            }
            CredentialFile::AuthorizedUser(user) => Provider::AuthorizedUser(user),
        };
        Ok(Self::with_provider(provider))
    }

    fn with_provider(provider: Provider) -> Self {
        Self {
            provider,
            http: reqwest::Client::new(),
            token: Mutex::new(None),
        }
    }

    /// Short description for startup logging.
    pub const fn kind(&self) -> &'static str {
        match self.provider {
            Provider::ServiceAccount { .. } => "service_account",
            Provider::AuthorizedUser(_) => "authorized_user",
            Provider::Metadata => "metadata_server",
        }
    }

    /// Project named by the credentials themselves, if any.
    pub fn project_id(&self) -> Option<&str> {
        match &self.provider {
            Provider::ServiceAccount { key, .. } => key.project_id.as_deref(),
            Provider::AuthorizedUser(user) => user.quota_project_id.as_deref(),
            Provider::Metadata => None,
        }
    }

    /// Ask the metadata server which project this instance runs in.
    pub async fn metadata_project_id(&self) -> Result<String> {
        let response = self
            .http
            .get(format!("{METADATA_HOST}/computeMetadata/v1/project/project-id"))
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(WarehouseError::Credentials(format!(
                "metadata server returned {}",
                response.status()
            )));
        }
        Ok(response.text().await?.trim().to_string())
    }

    /// A bearer token for the BigQuery API.
    pub async fn access_token(&self) -> Result<String> {
        let cached = self
            .token
            .lock()
            .as_ref()
            .filter(|t| Instant::now() < t.refresh_at)
            .map(|t| t.value.clone());
        if let Some(token) = cached {
            return Ok(token);
        }

        let fresh = self.fetch_token().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_MARGIN);
        *self.token.lock() = Some(CachedToken {
            value: fresh.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(fresh.access_token)
    }

    async fn fetch_token(&self) -> Result<TokenResponse> {
        let request = match &self.provider {
            Provider::ServiceAccount { key, signing_key } => {
                let assertion = sign_assertion(key, signing_key, chrono::Utc::now().timestamp())?;
                self.http.post(&key.token_uri).form(&[
                    ("grant_type", JWT_BEARER_GRANT),
                    ("assertion", assertion.as_str()),
                ])
            }
            Provider::AuthorizedUser(user) => self.http.post(DEFAULT_TOKEN_URI).form(&[
                ("grant_type", "refresh_token"),
                ("client_id", user.client_id.as_str()),
                ("client_secret", user.client_secret.as_str()),
                ("refresh_token", user.refresh_token.as_str()),
            ]),
            Provider::Metadata => self
                .http
                .get(format!(
                    "{METADATA_HOST}/computeMetadata/v1/instance/service-accounts/default/token"
                ))
                .query(&[("scopes", BIGQUERY_SCOPE)])
                .header("Metadata-Flavor", "Google"),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WarehouseError::Token(format!("{status}: {body}")));
        }
        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| WarehouseError::Token(e.to_string()))
    }
}

/// Build the signed JWT a service account trades for an access token.
fn sign_assertion(key: &ServiceAccountKey, signing_key: &EncodingKey, now: i64) -> Result<String> {
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: BIGQUERY_SCOPE,
        aud: &key.token_uri,
        iat: now,
        exp: now + 3600,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid.clone_from(&key.private_key_id);
    jsonwebtoken::encode(&header, &claims, signing_key)
        .map_err(|e| WarehouseError::Credentials(format!("signing assertion: {e}")))
}

/// gcloud's application-default credentials file.
fn well_known_file() -> Option<PathBuf> {
    if cfg!(windows) {
        std::env::var_os("APPDATA")
            .map(|dir| PathBuf::from(dir).join("gcloud/application_default_credentials.json"))
    } else {
        std::env::var_os("HOME").map(|home| {
            PathBuf::from(home).join(".config/gcloud/application_default_credentials.json")
        })
    }
}
