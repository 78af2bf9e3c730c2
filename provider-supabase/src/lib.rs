//! # Supabase Provider
//!
//! Implements the sync engine's `RemoteService` and the session grants on top
//! of a Supabase project (PostgREST tables plus GoTrue auth).
//!
//! ## Overview
//!
//! This module provides:
//! - Per-user sources, library and reading history tables with merge-on-conflict upserts
//! - Canonical identity resolution through the `get_or_create` RPC
//! - Password sign-in and refresh-token grants
//! - Rate limiting and exponential backoff
//!
//! HTTP goes through the injected `HttpClient`; nothing here opens sockets.

pub mod auth;
pub mod connector;
pub mod error;
pub mod types;

pub use auth::SupabaseAuthClient;
pub use connector::SupabaseRemoteService;
pub use error::{Result, SupabaseError};
