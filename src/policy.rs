use std::collections::HashMap;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use thiserror::Error;

use crate::{
    auth::{Principal, TokenVerifier},
    error::ApiError,
};

/// Any authenticated caller.
pub const AUTHENTICATED: &str = "Authenticated";
/// Callers carrying the `Admin` role.
pub const ADMIN: &str = "Admin";
/// Callers carrying `can_delete_user = "true"`.
pub const DELETE_USER: &str = "DeleteUser";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("no authorization policy named `{0}`")]
    Unknown(String),
}

/// Requirement
///
/// What a principal must carry to pass a policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Authenticated,
    Role(String),
    /// The claim must be present; if `values` is non-empty, one of its
    /// values must match one of them exactly.
    Claim { name: String, values: Vec<String> },
}

impl Requirement {
    pub fn role(role: impl Into<String>) -> Self {
        Requirement::Role(role.into())
    }

    pub fn claim(name: impl Into<String>, value: impl Into<String>) -> Self {
        Requirement::Claim {
            name: name.into(),
            values: vec![value.into()],
        }
    }

    pub fn is_satisfied_by(&self, principal: &Principal) -> bool {
        match self {
            Requirement::Authenticated => true,
            Requirement::Role(role) => principal.has_role(role),
            Requirement::Claim { name, values } => principal.has_claim(name, values),
        }
    }
}

/// PolicyTable
///
/// Named authorization rules, consulted by the route guards. Routes refer to
/// policies by name; a route naming a policy that is not registered fails at
/// router construction, never at request time.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<String, Requirement>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The three policies the customer routes use.
    pub fn standard() -> Self {
        Self::new()
            .with_policy(AUTHENTICATED, Requirement::Authenticated)
            .with_policy(ADMIN, Requirement::role("Admin"))
            .with_policy(DELETE_USER, Requirement::claim("can_delete_user", "true"))
    }

    pub fn with_policy(mut self, name: impl Into<String>, requirement: Requirement) -> Self {
        self.policies.insert(name.into(), requirement);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Requirement> {
        self.policies.get(name)
    }

    /// Builds the guard enforcing `name` with `verifier`.
    pub fn guard(&self, name: &str, verifier: &TokenVerifier) -> Result<RouteGuard, PolicyError> {
        let requirement = self
            .get(name)
            .cloned()
            .ok_or_else(|| PolicyError::Unknown(name.to_string()))?;

        Ok(RouteGuard {
            policy: name.to_string(),
            requirement,
            verifier: verifier.clone(),
        })
    }
}

/// RouteGuard
///
/// State of the per-route authorization middleware: which policy the route
/// carries and how to authenticate the caller.
#[derive(Clone)]
pub struct RouteGuard {
    policy: String,
    requirement: Requirement,
    verifier: TokenVerifier,
}

impl RouteGuard {
    pub fn policy(&self) -> &str {
        &self.policy
    }

    /// Authenticates the request, then checks the policy.
    pub fn check(&self, request: &Request) -> Result<Principal, ApiError> {
        let principal = self.verifier.authenticate(request.headers())?;

        if !self.requirement.is_satisfied_by(&principal) {
            tracing::info!(
                subject = %principal.subject,
                policy = %self.policy,
                "authorization denied"
            );
            return Err(ApiError::Forbidden(self.policy.clone()));
        }

        Ok(principal)
    }
}

/// enforce
///
/// Middleware attached with `route_layer` to each protected route. Unknown
/// or invalid tokens end in 401, policy failures in 403; on success the
/// principal is handed to the handler through the request extensions.
pub async fn enforce(
    State(guard): State<RouteGuard>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = guard.check(&request)?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
