#[allow(clippy::module_inception)]
pub mod auth;

pub use auth::*;
