use std::collections::HashMap;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{config::JwtSettings, error::ApiError};

/// A claim that may be a single string or a list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

/// Claims
///
/// Payload carried by a bearer token. Registered claims are typed; roles may
/// arrive under `role` or `roles`; everything else lands in `extra` and is
/// exposed to policies as string-valued claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the caller's identity.
    pub sub: String,
    /// Expiration time, seconds since the epoch. Always validated.
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<OneOrMany>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<OneOrMany>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Claims for `subject`, issued now and valid for `ttl`.
    ///
    /// An expiry past the representable range saturates instead of panicking.
    pub fn new(subject: impl Into<String>, ttl: Duration) -> Self {
        let now = Utc::now();
        let expires = now.checked_add_signed(ttl).unwrap_or(if ttl < Duration::zero() {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
        Self {
            sub: subject.into(),
            exp: expires.timestamp(),
            iat: Some(now.timestamp()),
            iss: None,
            aud: None,
            role: None,
            roles: None,
            extra: Map::new(),
        }
    }

    /// Adds a role, keeping any already present.
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        let mut roles = self.role.take().map(OneOrMany::into_vec).unwrap_or_default();
        roles.push(role.into());
        self.role = Some(match roles.len() {
            1 => OneOrMany::One(roles.remove(0)),
            _ => OneOrMany::Many(roles),
        });
        self
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(name.into(), value.into());
        self
    }
}

/// Principal
///
/// The authenticated caller, as seen by authorization policies and handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub roles: Vec<String>,
    /// Non-registered claims, each rendered as one or more string values.
    pub claims: HashMap<String, Vec<String>>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn has_claim(&self, name: &str, accepted: &[String]) -> bool {
        self.claims.get(name).is_some_and(|values| {
            accepted.is_empty() || values.iter().any(|value| accepted.contains(value))
        })
    }
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        let roles = claims
            .role
            .into_iter()
            .chain(claims.roles)
            .flat_map(OneOrMany::into_vec)
            .collect();

        let claims_by_name = claims
            .extra
            .into_iter()
            .filter_map(|(name, value)| {
                let values = claim_values(value);
                (!values.is_empty()).then_some((name, values))
            })
            .collect();

        Principal {
            subject: claims.sub,
            roles,
            claims: claims_by_name,
        }
    }
}

/// Renders a JSON claim the way policies compare it: `true` becomes
/// `"true"`, arrays contribute one value per element, nulls vanish.
fn claim_values(value: Value) -> Vec<String> {
    match value {
        Value::Null => vec![],
        Value::String(s) => vec![s],
        Value::Bool(b) => vec![b.to_string()],
        Value::Number(n) => vec![n.to_string()],
        Value::Array(items) => items.into_iter().flat_map(claim_values).collect(),
        object @ Value::Object(_) => vec![object.to_string()],
    }
}

/// TokenVerifier
///
/// Validates HS256 bearer tokens against the configured secret, issuer and
/// audience. Cheap to clone; one copy lives in the application state and one
/// in every route guard.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(settings: &JwtSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        // jsonwebtoken only compares iss/aud when the token carries them;
        // listing them as required makes a token without them fail too.
        let mut required = vec!["exp"];
        if let Some(issuer) = &settings.issuer {
            validation.set_issuer(&[issuer]);
            required.push("iss");
        }
        match &settings.audience {
            Some(audience) => {
                validation.set_audience(&[audience]);
                required.push("aud");
            }
            None => validation.validate_aud = false,
        }
        validation.set_required_spec_claims(&required);

        Self {
            key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
        }
    }

    /// Decodes and validates a raw token.
    pub fn verify(&self, token: &str) -> Result<Principal, ApiError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            let reason = match e.kind() {
                ErrorKind::ExpiredSignature => "token expired",
                ErrorKind::InvalidSignature => "invalid signature",
                ErrorKind::InvalidIssuer => "invalid issuer",
                ErrorKind::InvalidAudience => "invalid audience",
                _ => "invalid token",
            };
            tracing::debug!(error = %e, "bearer token rejected");
            ApiError::Unauthenticated(reason.to_string())
        })?;

        Ok(Principal::from(data.claims))
    }

    /// Pulls the bearer token out of the `Authorization` header and verifies it.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, ApiError> {
        let token = bearer_token(headers)?;
        self.verify(token)
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| ApiError::Unauthenticated("missing authorization header".into()))?
        .to_str()
        .map_err(|_| ApiError::Unauthenticated("malformed authorization header".into()))?;

    match value.trim().split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(ApiError::Unauthenticated("expected a bearer token".into())),
    }
}

/// Signs `claims` with the configured secret, stamping the configured issuer
/// and audience when the claims do not carry their own.
pub fn issue_token(settings: &JwtSettings, mut claims: Claims) -> Result<String, jsonwebtoken::errors::Error> {
    if claims.iss.is_none() {
        claims.iss = settings.issuer.clone();
    }
    if claims.aud.is_none() {
        claims.aud = settings.audience.clone().map(OneOrMany::One);
    }
    let key = EncodingKey::from_secret(settings.secret.as_bytes());
    encode(&Header::new(Algorithm::HS256), &claims, &key)
}

/// Principal extractor
///
/// Route guards insert the principal into the request extensions once they
/// have checked it; handlers behind a guard get that copy. On routes without
/// a guard the token is verified here. Rejects with 401 on any failure.
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
    TokenVerifier: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(principal.clone());
        }

        let principal = TokenVerifier::from_ref(state).authenticate(&parts.headers)?;
        parts.extensions.insert(principal.clone());
        Ok(principal)
    }
}
