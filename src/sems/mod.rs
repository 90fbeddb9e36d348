//! SEMS portal integration.
//!
//! The portal exposes a session-token JSON API with unreliable failure
//! signaling: some expired sessions come back as HTTP 401, others as HTTP 200
//! with an apology in the body. Everything that talks to the portal goes
//! through [`pipeline::RequestPipeline`], which owns the re-login-and-retry
//! protocol, backed by [`auth::TokenStore`] for the token lifecycle.

pub mod auth;
pub mod client;
pub mod pipeline;
