pub mod app;
pub mod auth;
pub mod error;
pub mod routes;
pub mod worker;

pub use app::{create_app, AppState};
pub use auth::{auth_mode_from_config, AuthContext, AuthMode, JwtConfig};
