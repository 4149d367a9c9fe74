// Paths, file and environment configuration
pub mod config;

// Error taxonomy
pub mod error;

// Token persistence
pub mod credentials;

// Authorization code flow and loopback callback listener
pub mod oauth;

// Daily job scheduling
pub mod scheduler;

// Check-in client
pub mod checkin;

// Run history
pub mod history;

// Token check, check-in and history in one step
pub mod runner;

// Optional browser launch for the authorization URL
pub mod browser;

pub use error::{Error, Result};
