//! Stateless bearer-token authentication.
//!
//! Tokens are HS256 JWTs issued by the identity service; this crate only
//! verifies them. [`jwt_auth_middleware`] stores the decoded [`JwtClaims`]
//! in the request extensions and [`CurrentUser`] reads them back in handlers.
//!
//! ```ignore
//! use axum_helpers::auth::{JwtAuth, JwtConfig, jwt_auth_middleware};
//! use core_config::FromEnv;
//!
//! let auth = JwtAuth::new(&JwtConfig::from_env()?);
//! let protected = Router::new()
//!     .route("/campaigns", get(list))
//!     .layer(axum::middleware::from_fn_with_state(auth, jwt_auth_middleware));
//! ```

pub mod config;
pub mod current_user;
pub mod jwt;
pub mod middleware;

pub use config::JwtConfig;
pub use current_user::CurrentUser;
pub use jwt::{ACCESS_TOKEN_TTL, JwtAuth, JwtClaims};
pub use middleware::jwt_auth_middleware;
