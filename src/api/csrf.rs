//! Signed double-submit CSRF protection.
//!
//! Each browser holds a random nonce in an HttpOnly cookie. Forms carry
//! `hex(HMAC-SHA256(secret_key, nonce))` in a hidden field, and a
//! submission is accepted only when that field matches the signature of the
//! cookie it arrived with.

use crate::api::cookie::{read_cookie, set_cookie};
use crate::api::errors::AppError;
use axum::http::{HeaderMap, HeaderValue};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const CSRF_COOKIE: &str = "disco_csrf";

const MAX_NONCE_LEN: usize = 64;

#[derive(Clone)]
pub struct CsrfGuard {
    secret: Vec<u8>,
}

/// Token to embed in the page, and the cookie to set when the browser did
/// not already have a usable nonce.
#[derive(Debug)]
pub struct CsrfSession {
    pub token: String,
    pub set_cookie: Option<HeaderValue>,
}

impl CsrfSession {
    pub fn cookies(&self) -> impl Iterator<Item = HeaderValue> {
        self.set_cookie.clone().into_iter()
    }
}

impl CsrfGuard {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self, nonce: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts any key length");
        mac.update(b"csrf|");
        mac.update(nonce.as_bytes());
        mac
    }

    pub fn token_for(&self, nonce: &str) -> String {
        hex::encode(self.mac(nonce).finalize().into_bytes())
    }

    /// Constant-time comparison of `token` against the nonce's signature.
    pub fn verify(&self, nonce: &str, token: &str) -> bool {
        let Ok(submitted) = hex::decode(token.trim()) else {
            return false;
        };
        self.mac(nonce).verify_slice(&submitted).is_ok()
    }

    /// Token for rendering a form, minting a nonce cookie if needed.
    pub fn session(&self, headers: &HeaderMap, secure: bool) -> Result<CsrfSession, AppError> {
        if let Some(nonce) = read_cookie(headers, CSRF_COOKIE).filter(|n| is_valid_nonce(n)) {
            return Ok(CsrfSession {
                token: self.token_for(&nonce),
                set_cookie: None,
            });
        }
        let nonce = uuid::Uuid::new_v4().to_string();
        Ok(CsrfSession {
            token: self.token_for(&nonce),
            set_cookie: Some(set_cookie(CSRF_COOKIE, &nonce, None, true, secure)?),
        })
    }

    /// Validate a submitted token. On success the returned session carries
    /// the token for the next form on the same nonce.
    pub fn check(&self, headers: &HeaderMap, token: &str) -> Result<CsrfSession, AppError> {
        let nonce = read_cookie(headers, CSRF_COOKIE)
            .filter(|n| is_valid_nonce(n))
            .ok_or(AppError::CsrfFailed)?;
        if !self.verify(&nonce, token) {
            return Err(AppError::CsrfFailed);
        }
        Ok(CsrfSession {
            token: token.trim().to_string(),
            set_cookie: None,
        })
    }
}

fn is_valid_nonce(nonce: &str) -> bool {
    !nonce.is_empty()
        && nonce.len() <= MAX_NONCE_LEN
        && nonce.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}
