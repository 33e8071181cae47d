//! Session identity, persistence and the last-session pointer

pub mod cache;
pub mod lifecycle;
pub mod store;

pub use cache::{FileLastSessionCache, InMemoryLastSessionCache, LastSessionCache};
pub use lifecycle::{ensure_active, SessionHandle, SessionLifecycle};
pub use store::{InMemorySessionStore, JsonFileSessionStore, SessionStore, StoreError};
