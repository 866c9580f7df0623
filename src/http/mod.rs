//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, RequestContext extraction)
//!     → [early domain redirect, tenant resolution, routing pipeline]
//!     → response.rs (redirect, canonical link, gateway errors)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{request_context, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
