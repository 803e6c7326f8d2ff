//! Domain types and ambient plumbing shared by every postdate crate.

pub mod email;
pub mod logging;

pub use email::{Email, EmailId, EmailStatus, StatusUpdate};
pub use tracing;

/// Control signal broadcast to all long-running components.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}
