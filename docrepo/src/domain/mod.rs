//! Domain repositories built on the generic layer
//!
//! A specialization is a value: a full repository plus injected hooks and a
//! handful of named queries.

pub mod user;

pub use user::{NewUser, User, UserRepository, UserRole, UserStatus};
