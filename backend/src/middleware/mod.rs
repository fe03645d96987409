//! HTTP middleware for the Cannabis Cultivation Compliance Platform

pub mod auth;

pub use auth::{auth_middleware, check_permission, AuthUser, CurrentUser, TenantScope};
