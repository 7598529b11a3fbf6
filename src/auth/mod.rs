//! Handshake authentication: JWT validation for the connect upgrade.

mod jwt;

pub use jwt::{Claims, JwtSecret};
