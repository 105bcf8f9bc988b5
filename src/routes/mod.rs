mod auth;
mod health_check;

pub use auth::{current_user, login, logout, renew};
pub use health_check::health_check;
