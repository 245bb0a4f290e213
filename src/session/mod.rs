pub mod lifecycle;
pub mod state;
pub mod storage;
pub mod store;

#[cfg(test)]
mod tests;

pub use lifecycle::SessionLifecycle;
pub use state::{AuthRecord, Preferences, Session, SessionPhase, UserProfile};
pub use storage::SessionStorage;
pub use store::SessionStore;
