// Bayes token cache - library root

pub mod auth;
pub mod config;
pub mod error;

pub use auth::{Credential, Token, TokenManager, TokenStore};
pub use error::AuthError;
