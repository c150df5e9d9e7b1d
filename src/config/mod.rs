mod server;

pub use server::{CookieConfig, OAuthConfig, RateLimitConfig, ServerConfig};
