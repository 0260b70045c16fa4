//! API routes.

pub mod health;
pub mod session;

pub use health::{HealthResponse, health_routes};
pub use session::{
    SessionView, delete_value_handler, destroy_session_handler, get_session_handler,
    purge_session_handler, set_value_handler,
};
