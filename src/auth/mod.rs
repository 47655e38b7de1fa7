//! Caller context for the admission controller.
//!
//! Decodes a bearer JWT, when one is configured, and attaches the caller's
//! user id and plan to the request as an [`AuthenticatedCaller`] extension.
//! Requests are never rejected here: a missing or invalid token simply
//! leaves the caller unset.

use crate::config::JwtConfig;
use crate::error::{AdmissionError, Result};
use crate::rate_limit::identity::AuthenticatedCaller;
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Additional custom claims
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Decodes bearer tokens into callers
pub struct CallerDecoder {
    decoding_key: DecodingKey,
    validation: Validation,
    plan_claim: String,
}

impl CallerDecoder {
    /// Create a new decoder from configuration
    pub fn new(config: &JwtConfig) -> Result<Self> {
        let algorithm = parse_algorithm(&config.algorithm)?;

        let decoding_key = match algorithm {
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => {
                let secret = config.secret.as_ref().ok_or_else(|| {
                    AdmissionError::Config(
                        "JWT secret is required for HS256/HS384/HS512 algorithms".to_string(),
                    )
                })?;
                DecodingKey::from_secret(secret.as_bytes())
            }
            _ => {
                let public_key = config.public_key.as_ref().ok_or_else(|| {
                    AdmissionError::Config(
                        "JWT public key is required for RS256/RS384/RS512 algorithms".to_string(),
                    )
                })?;
                DecodingKey::from_rsa_pem(public_key.as_bytes()).map_err(|e| {
                    AdmissionError::Config(format!("Invalid RSA public key: {}", e))
                })?
            }
        };

        let mut validation = Validation::new(algorithm);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &config.audience {
            validation.set_audience(&[audience]);
        }

        Ok(Self {
            decoding_key,
            validation,
            plan_claim: config.plan_claim.clone(),
        })
    }

    /// Decode the caller from the `Authorization: Bearer` header, if valid
    pub fn caller(&self, headers: &HeaderMap) -> Option<AuthenticatedCaller> {
        let (scheme, token) = headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }
        let token = token.trim();

        let claims = match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(error = %e, "Ignoring undecodable bearer token");
                return None;
            }
        };

        let plan = claims
            .extra
            .get(&self.plan_claim)
            .and_then(|value| value.as_str())
            .map(str::to_string);

        Some(AuthenticatedCaller {
            user_id: claims.sub,
            plan,
        })
    }
}

fn parse_algorithm(algorithm: &str) -> Result<Algorithm> {
    match algorithm.to_uppercase().as_str() {
        "HS256" => Ok(Algorithm::HS256),
        "HS384" => Ok(Algorithm::HS384),
        "HS512" => Ok(Algorithm::HS512),
        "RS256" => Ok(Algorithm::RS256),
        "RS384" => Ok(Algorithm::RS384),
        "RS512" => Ok(Algorithm::RS512),
        _ => Err(AdmissionError::Config(format!(
            "Unsupported JWT algorithm: {}",
            algorithm
        ))),
    }
}

/// Attach an [`AuthenticatedCaller`] to requests carrying a valid bearer token
pub async fn caller_context_middleware(
    State(decoder): State<Arc<CallerDecoder>>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<AuthenticatedCaller>().is_none() {
        if let Some(caller) = decoder.caller(request.headers()) {
            debug!(user_id = %caller.user_id, plan = ?caller.plan, "Caller identified");
            request.extensions_mut().insert(caller);
        }
    }

    next.run(request).await
}
