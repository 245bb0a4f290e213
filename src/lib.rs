pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod session;

// Re-export core components
pub use crate::api::{ApiClient, AuthResponse, Credentials, RegisterRequest, TokenSource};
pub use crate::config::{Config, ConfigManager};
pub use crate::error::{ErrorCategory, ErrorCode, ErrorSeverity, SessionError, SessionResult};
pub use crate::events::{SessionEvent, SessionEvents};
pub use crate::session::{Session, SessionLifecycle, SessionPhase, SessionStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
