mod auth;
mod health_check;

pub use auth::{client_ip, generate_token, get_current_user, login, register};
pub use health_check::health_check;
