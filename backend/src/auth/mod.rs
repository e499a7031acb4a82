pub mod jwt;
pub mod middleware;
pub mod models;

pub use jwt::{JwtError, JwtService};
pub use middleware::{AuthMiddleware, MaybeIdentity};
pub use models::{Claims, Identity};
