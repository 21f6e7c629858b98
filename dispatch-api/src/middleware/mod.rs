pub mod auth;
pub mod resiliency;

pub use auth::{admin_auth_middleware, driver_auth_middleware, Claims};
pub use resiliency::CircuitBreaker;
