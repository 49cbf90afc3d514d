mod jwt;
mod middleware;

pub use jwt::{ACCESS_TOKEN_AUDIENCE, AccessTokenDetails, JwtError, JwtService};
pub use middleware::{RequestContext, require_admin, require_manager, require_session};
