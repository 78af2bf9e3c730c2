//! # Authentication Module
//!
//! Session types and the authentication gate used by the sync engine.
//!
//! ## Overview
//!
//! - [`AuthSession`] is what the remote service issues on sign-in or refresh.
//! - [`AuthContext`] is the narrow interface the engine depends on: validity
//!   and user id.
//! - [`SessionAuthContext`] is the explicitly constructed holder that replaces
//!   any process-wide session state. It emits auth events on changes.

pub mod context;
pub mod error;
pub mod types;

pub use context::{AuthContext, SessionAuthContext};
pub use error::{AuthError, Result};
pub use types::{AuthSession, SessionUser, UserId};
