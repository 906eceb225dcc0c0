//! StorePulse Core - Shared types library.
//!
//! This crate provides the types shared by every StorePulse component:
//! - `storepulse-sync` - Tenant data-synchronization pipeline
//! - `storepulse-cli` - Command-line tools for migrations and manual syncs
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP clients. This keeps it lightweight and allows it to be used
//! anywhere, including from webhook handlers that only need normalization.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, remote ids, canonical records, sync summaries
//! - [`normalize`] - Raw GraphQL/REST JSON to canonical records

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod normalize;
pub mod types;

pub use types::*;
