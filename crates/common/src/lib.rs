//! Common utilities and types shared across the admin-check crates.

#![warn(clippy::pedantic)]

/// Module for shared configuration types
pub mod config;

/// Module for secret types that prevent accidental logging
pub mod secret;

/// Module for JWT utilities (size limits, structural checks, unverified decoding)
pub mod jwt;
