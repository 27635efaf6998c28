//! Request/response DTOs

mod auth;
mod common;
mod oauth;
mod session;

pub use auth::*;
pub use common::*;
pub use oauth::*;
pub use session::*;
