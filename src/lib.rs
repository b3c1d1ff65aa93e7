pub mod api;
pub mod browser;
pub mod core;
pub mod session;
pub mod sites;
pub mod workflows;

pub use core::config::Settings;
pub use core::types;
pub use core::AppState;
pub use session::{SessionError, SessionManager};
