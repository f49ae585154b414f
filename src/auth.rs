use std::collections::HashMap;

use axum::http::{header::AUTHORIZATION, HeaderMap};

use crate::errors::{GatewayError, Result};
use crate::traits::TokenVerifier;

const BEARER_SCHEME: &str = "Bearer";
const DEFAULT_PRINCIPAL: &str = "client";

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| GatewayError::auth("Missing Authorization header"))?;

    // The scheme name is case-insensitive.
    let token = value
        .to_str()
        .ok()
        .and_then(|v| v.trim_start().split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case(BEARER_SCHEME))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| GatewayError::auth("Invalid Authorization header"))?;

    Ok(token)
}

/// Verifier backed by a fixed token table loaded at startup.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    /// Accepts `principal:token` entries; a bare token maps to a generic principal.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens = entries
            .into_iter()
            .filter_map(|entry| {
                let entry = entry.as_ref().trim();
                if entry.is_empty() {
                    return None;
                }
                let (principal, token) = entry
                    .split_once(':')
                    .unwrap_or((DEFAULT_PRINCIPAL, entry));
                Some((token.to_string(), principal.to_string()))
            })
            .collect();
        Self { tokens }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl TokenVerifier for StaticTokenVerifier {
    fn verify(&self, token: &str) -> Result<String> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| GatewayError::auth("Invalid or expired token"))
    }
}
