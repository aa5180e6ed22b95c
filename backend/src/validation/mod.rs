//! Request payload validation: field rules plus the `Validate` derive used
//! by the account and password reset payloads.

pub mod rules;

pub use validator::Validate;
