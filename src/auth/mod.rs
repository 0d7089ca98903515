#[allow(clippy::module_inception)]
pub mod auth;
pub mod identity;

pub use identity::Identity;
