//! Process lifetime: signals, background maintenance and orderly exit.
//!
//! ```text
//! SIGINT / SIGTERM ──▶ signals.rs ──▶ Shutdown::trigger
//!                                         │
//!            ┌────────────────────────────┼──────────────────────┐
//!            ▼                            ▼                      ▼
//!      public server                admin server        retention sweeper
//!            └─────────────── Shutdown::drain (grace) ───────────┘
//! ```
//!
//! Config reloads come from the file watcher, not from SIGHUP.

pub mod retention;
pub mod shutdown;
pub mod signals;

pub use retention::RetentionSweeper;
pub use shutdown::Shutdown;
