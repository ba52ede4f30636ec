pub mod auth;
pub mod persistence;
