//! API credentials: loading at startup and checking on requests.

pub mod credentials;
pub mod middleware;

pub use credentials::{load_credentials, parse_inline_keys, CredentialError, CredentialSet};
pub use middleware::api_auth_middleware;
