//! Browse/register session lifecycle and the registry of discovered services.

pub mod manager;
pub mod registry;

pub use manager::{Delivery, SessionChannels, SessionKind, SessionManager, SessionNotice, SessionStatus};
