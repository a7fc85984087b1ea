//! Onboard Flow — role-driven onboarding stages with durable, resumable progress.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
