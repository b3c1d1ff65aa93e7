//! Session engine: the state model and the components that drive it.

pub mod controller;
pub mod error;
pub mod manager;
pub mod model;
pub mod poller;
pub mod registry;
pub mod retry;
pub mod window;

pub use error::SessionError;
pub use manager::{ActiveCounts, SessionManager, SessionServices};
pub use model::{
    FailureCode, MessagingIntent, OrderIntent, SessionId, SessionIntent, SessionKind,
    SessionSnapshot, SessionStatus,
};
