//! HTTP producer surface for relayq.
//!
//! A thin adapter over the queue engine: it accepts task submissions and
//! cron registrations, and exposes results, queue depths, and head-of-queue
//! inspection. All queue semantics live in `relayq-engine`.

pub mod controllers;
pub mod middleware;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
