//! Guest sessions: message history and apartment links.

mod locks;
mod store;
mod types;

pub use locks::{GuestGuard, GuestLocks};
pub use store::SessionStore;
pub use types::{ChatHistory, ChatMessage, ChatRole, GuestApartmentLink};
