pub mod helpers;
mod middleware;
pub mod oauth;
mod token;

pub use middleware::{RequireAdmin, RequireAuth};
pub use oauth::{GitHubOAuth, LoginRequest};
pub use token::{Claims, TOKEN_ISSUER, TokenManager};
