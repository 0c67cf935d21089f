use crate::{
    AppState, handlers,
    policy::{self, ADMIN, AUTHENTICATED, DELETE_USER, PolicyError},
};
use axum::{
    Router, middleware,
    routing::{MethodRouter, delete, get, post, put},
};

/// Customer Router Module
///
/// | route                    | policy                                        |
/// |--------------------------|-----------------------------------------------|
/// | `GET /customers`         | `Authenticated`                               |
/// | `POST /customers`        | `Admin`                                       |
/// | `GET /customers/{id}`    | `Authenticated`                               |
/// | `PUT /customers/{id}`    | none, or `Authenticated` with `protect_updates` |
/// | `DELETE /customers/{id}` | `DeleteUser`                                  |
///
/// Each method gets its own guard, so methods sharing a path can carry
/// different policies.
pub fn customer_routes(state: &AppState) -> Result<Router<AppState>, PolicyError> {
    let update_policy = state.config.protect_updates.then_some(AUTHENTICATED);

    let collection = guarded(get(handlers::list_customers), Some(AUTHENTICATED), state)?
        .merge(guarded(post(handlers::create_customer), Some(ADMIN), state)?);

    let item = guarded(get(handlers::get_customer), Some(AUTHENTICATED), state)?
        .merge(guarded(put(handlers::update_customer), update_policy, state)?)
        .merge(guarded(delete(handlers::delete_customer), Some(DELETE_USER), state)?);

    Ok(Router::new()
        .route("/customers", collection)
        .route("/customers/{id}", item))
}

/// Wraps `route` in the guard for `policy`; `None` leaves it open.
fn guarded(
    route: MethodRouter<AppState>,
    policy: Option<&str>,
    state: &AppState,
) -> Result<MethodRouter<AppState>, PolicyError> {
    let Some(name) = policy else {
        return Ok(route);
    };

    let guard = state.policies.guard(name, &state.verifier)?;
    Ok(route.route_layer(middleware::from_fn_with_state(guard, policy::enforce)))
}
