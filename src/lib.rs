//! Contact-form relay: validates submissions and forwards them by email.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
