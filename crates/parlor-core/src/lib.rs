//! # parlor-core
//!
//! Core types for the parlor chat relay:
//! - Wire events exchanged with clients (`chat message`, `user list`, ...)
//! - Slash-command parsing (`/w`, `/ban`, `/unban`, `/help`)
//! - The connection registry of joined participants
//! - The administrator predicate used to gate moderation
//!
//! This crate has no network code and no storage code.

pub mod auth;
pub mod command;
pub mod error;
pub mod event;
pub mod registry;

pub use error::{Error, Result};
