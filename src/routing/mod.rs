//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (host, path, query, visitor headers)
//!     → context.rs (immutable RequestContext)
//!     → early.rs (optional, primary tenant's domain rules only)
//!     → pipeline.rs
//!         → domain.rs (whole-domain rules)
//!         → host.rs (subdomain label)
//!         → mapping lookup / content resolver
//!     → Decision { PassThrough | Redirect | Serve }
//! ```
//!
//! # Design Decisions
//! - No regex in the hot path; host parsing is plain string work
//! - Deterministic: the same request and settings yield the same decision
//! - First match wins at every tier (rule order, domain order)

pub mod context;
pub mod domain;
pub mod early;
pub mod host;
pub mod pipeline;

pub use context::RequestContext;
pub use early::EarlyDomainRedirect;
pub use pipeline::{Decision, Outcome, Pipeline, Recorder, RedirectDecision, ServeDecision, SiteInfo};
