// Authentication module
// Caches the portal access token on disk and logs in again when it goes stale

mod clock;
mod login;
mod manager;
mod store;
mod types;

pub use clock::{Clock, SystemClock};
pub use login::{Authenticator, HttpAuthenticator, DEFAULT_LOGIN_URL};
pub use manager::{TokenManager, TokenStatus, DEFAULT_LOGIN_TIMEOUT};
pub use store::{TokenStore, DEFAULT_TOKEN_FILE};
pub use types::{Credential, LoginResponse, Token};
