//! Authentication and authorization for Krishi Desk
//!
//! Provides:
//! - JWT token generation and validation
//! - Roles and the operations each role may perform
//! - Per-request `Actor` sessions derived from verified tokens
//! - Password hashing with Argon2
//! - Account registration and login

pub mod accounts;
pub mod jwt;
pub mod password;
pub mod roles;
pub mod session;

pub use accounts::{
    AccountService, AccountView, AuthGrant, MemoryUserStore, MongoUserStore, RegisterInput,
    UserStore,
};
pub use jwt::{extract_token_from_header, Claims, JwtValidator, TokenInput, TokenValidationResult};
pub use password::{check_password_strength, hash_password, verify_password, MIN_PASSWORD_LEN};
pub use roles::{is_operation_allowed, required_role, Operation, Role};
pub use session::{verify_header, Actor};
