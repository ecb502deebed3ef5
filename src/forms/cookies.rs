use crate::forms::FieldErrors;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// Name of the cookie holding the visitor's consent choices.
pub const CONSENT_COOKIE: &str = "cookies_policy";

const FUNCTIONAL_REQUIRED: &str = "Select yes if you want to accept functional cookies";
const ANALYTICS_REQUIRED: &str = "Select yes if you want to accept analytics cookies";
const INVALID_CHOICE: &str = "Not a valid choice";

/// Cookie categories the visitor has opted into. Essential cookies cannot be
/// refused and are always recorded as accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentPreferences {
    #[serde(default = "always")]
    pub essential: bool,
    #[serde(default)]
    pub functional: bool,
    #[serde(default)]
    pub analytics: bool,
}

const fn always() -> bool {
    true
}

impl Default for ConsentPreferences {
    fn default() -> Self {
        Self {
            essential: true,
            functional: false,
            analytics: false,
        }
    }
}

impl ConsentPreferences {
    /// Encode as a cookie-safe value (base64 of the JSON document).
    pub fn to_cookie_value(self) -> Result<String, serde_json::Error> {
        let prefs = Self {
            essential: true,
            ..self
        };
        let json = serde_json::to_vec(&prefs)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode a value written by [`Self::to_cookie_value`]. Anything else is
    /// treated as no consent recorded.
    pub fn from_cookie_value(value: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(value.trim()).ok()?;
        let mut prefs: Self = serde_json::from_slice(&bytes).ok()?;
        prefs.essential = true;
        Some(prefs)
    }
}

/// Submitted cookie-consent form.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CookiesForm {
    #[serde(default)]
    pub functional: Option<String>,
    #[serde(default)]
    pub analytics: Option<String>,
    #[serde(default)]
    pub csrf_token: String,
}

impl CookiesForm {
    /// Both radios must be answered with `yes` or `no`.
    pub fn validate(&self) -> Result<ConsentPreferences, FieldErrors> {
        let mut errors = FieldErrors::default();
        let functional = yes_no(self.functional.as_deref(), FUNCTIONAL_REQUIRED)
            .map_err(|m| errors.add("functional", m))
            .ok();
        let analytics = yes_no(self.analytics.as_deref(), ANALYTICS_REQUIRED)
            .map_err(|m| errors.add("analytics", m))
            .ok();

        match (functional, analytics) {
            (Some(functional), Some(analytics)) => Ok(ConsentPreferences {
                essential: true,
                functional,
                analytics,
            }),
            _ => Err(errors),
        }
    }
}

fn yes_no(value: Option<&str>, required: &'static str) -> Result<bool, &'static str> {
    match value.map(str::trim) {
        None | Some("") => Err(required),
        Some("yes") => Ok(true),
        Some("no") => Ok(false),
        Some(_) => Err(INVALID_CHOICE),
    }
}

/// Radio value for a stored choice.
pub const fn choice(accepted: bool) -> &'static str {
    if accepted {
        "yes"
    } else {
        "no"
    }
}
