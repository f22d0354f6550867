//! Application services: composing outbound mail and relaying it.

pub mod contact;
pub mod error;
pub mod mailer;
