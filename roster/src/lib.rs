//! Student roster client core
//!
//! Gateways over a hosted identity provider and a hosted document store, the local session
//! cache and the view state machines built on top of them.

pub mod auth;
pub mod cache;
pub mod model;
pub mod presentation;
pub mod provider;
pub mod storage;
pub mod students;
pub mod subscription;

#[cfg(test)]
mod testing;

pub use auth::AuthGateway;
pub use cache::SessionCache;
pub use students::RosterGateway;
