pub mod actor;
pub mod error;
pub mod gate;
pub mod persistence;
pub mod registry;

pub use actor::{ConnectionActor, ConnectionState, DisconnectReason};
pub use error::SessionError;
pub use registry::{GroupRegistry, MemberHandle, Membership, SessionEvent};
