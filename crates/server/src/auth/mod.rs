//! Password-based registration/login and stateless JWT lifecycle.
//!
//! - `password` - Argon2id hashing on the blocking pool
//! - `token` - HS256 access/refresh token signer and verifier
//! - `service` - the [`AuthService`] orchestrator

pub mod password;
pub mod service;
pub mod token;

pub use password::PasswordHasher;
pub use service::{AuthResponse, AuthService, ProfileUpdate, RegisterRequest, UserSummary};
pub use token::{Claims, TokenPair, TokenSigner, TokenType};
