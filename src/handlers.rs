use crate::{
    auth::Principal,
    error::ApiError,
    models::Customer,
    repository::RepositoryState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::IntoResponse,
};

// --- Handlers ---
//
// Authentication and policy checks happen in the route guards (see
// `policy::enforce`); a handler only runs once its route's policy passed.

/// list_customers
///
/// [Authenticated Route] Every customer in the store's natural order.
///
/// *Note*: The caller is resolved by the `Principal` extractor, which reuses the
/// identity the route guard already verified.
#[utoipa::path(
    get,
    path = "/customers",
    tag = "customers",
    security(("Bearer" = [])),
    responses(
        (status = 200, description = "All customers", body = [Customer]),
        (status = 401, description = "Missing or invalid bearer token")
    )
)]
pub async fn list_customers(
    principal: Principal,
    State(repo): State<RepositoryState>,
) -> Result<Json<Vec<Customer>>, ApiError> {
    tracing::info!(subject = %principal.subject, "Getting customers...");
    let customers = repo.list_customers().await?;
    tracing::info!(count = customers.len(), "Retrieved {} customers", customers.len());
    Ok(Json(customers))
}

/// get_customer
///
/// [Authenticated Route] A single customer by id.
#[utoipa::path(
    get,
    path = "/customers/{id}",
    tag = "customers",
    security(("Bearer" = [])),
    params(("id" = String, Path, description = "Customer identifier")),
    responses(
        (status = 200, description = "Found", body = Customer),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 404, description = "No customer with this id")
    )
)]
pub async fn get_customer(
    State(repo): State<RepositoryState>,
    Path(id): Path<String>,
) -> Result<Json<Customer>, ApiError> {
    match repo.find_customer(&id).await? {
        Some(customer) => Ok(Json(customer)),
        None => Err(ApiError::NotFound(id)),
    }
}

/// create_customer
///
/// [Admin Route] Stores a new customer. An empty or blank id is replaced by a
/// generated UUID; an id already in use fails in the store and surfaces as 500.
///
/// *Location*: The id is percent-encoded into a single path segment, so the
/// returned header always leads back to this record. `.` and `..` cannot be
/// expressed that way and are refused with 400 before anything is stored.
#[utoipa::path(
    post,
    path = "/customers",
    tag = "customers",
    security(("Bearer" = [])),
    request_body = Customer,
    responses(
        (status = 201, description = "Created", body = Customer,
            headers(("Location" = String, description = "Path of the new customer"))),
        (status = 400, description = "Id not usable in a URL"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller lacks the Admin role")
    )
)]
pub async fn create_customer(
    principal: Principal,
    State(repo): State<RepositoryState>,
    Json(payload): Json<Customer>,
) -> Result<impl IntoResponse, ApiError> {
    let customer = payload.with_assigned_id();
    let location = customer
        .location()
        .and_then(|path| HeaderValue::try_from(path).ok())
        .ok_or_else(|| {
            ApiError::BadRequest(format!(
                "id `{}` cannot be used in a location",
                customer.id.escape_debug()
            ))
        })?;

    let stored = repo.insert_customer(customer).await?;
    tracing::info!(subject = %principal.subject, id = %stored.id, "customer created");

    Ok((StatusCode::CREATED, [(header::LOCATION, location)], Json(stored)))
}

/// update_customer
///
/// [Open Route by default] Replaces every field of an existing customer with
/// the request body; omitted contact fields are cleared.
///
/// *Key handling*: The path id is authoritative. A body id that is missing,
/// blank or equal to it is accepted; any other id is a 400. Setting
/// `PROTECT_UPDATES=true` puts this route behind authentication.
#[utoipa::path(
    put,
    path = "/customers/{id}",
    tag = "customers",
    params(("id" = String, Path, description = "Customer identifier")),
    request_body = Customer,
    responses(
        (status = 204, description = "Replaced"),
        (status = 400, description = "Body id differs from the path id"),
        (status = 404, description = "No customer with this id")
    )
)]
pub async fn update_customer(
    State(repo): State<RepositoryState>,
    Path(id): Path<String>,
    Json(payload): Json<Customer>,
) -> Result<StatusCode, ApiError> {
    // Same blank-id rule as create: whitespace means "no id in the body".
    if payload.has_id() && payload.id != id {
        return Err(ApiError::BadRequest(format!(
            "body id `{}` does not match path id `{}`",
            payload.id, id
        )));
    }

    let replacement = Customer { id, ..payload };
    let id = replacement.id.clone();
    if repo.replace_customer(replacement).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(id))
    }
}

/// delete_customer
///
/// [DeleteUser Route] Removes a customer. Requires the `can_delete_user`
/// claim; the Admin role alone is not enough.
#[utoipa::path(
    delete,
    path = "/customers/{id}",
    tag = "customers",
    security(("Bearer" = [])),
    params(("id" = String, Path, description = "Customer identifier")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 401, description = "Missing or invalid bearer token"),
        (status = 403, description = "Caller lacks can_delete_user"),
        (status = 404, description = "No customer with this id")
    )
)]
pub async fn delete_customer(
    principal: Principal,
    State(repo): State<RepositoryState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if repo.delete_customer(&id).await? {
        tracing::info!(subject = %principal.subject, id = %id, "customer deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(id))
    }
}

/// health
///
/// Liveness probe for load balancers.
#[utoipa::path(
    get,
    path = "/health",
    tag = "ops",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "ok"
}
