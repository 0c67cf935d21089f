//! Router Module Index
//!
//! Routing is split by who may reach a route. Protection is attached per
//! route from the policy table, so a route never depends on a layer applied
//! somewhere above it.

/// Routes open to every caller (health probe).
pub mod public;

/// The customer resource, each method guarded by its own policy.
pub mod customers;
