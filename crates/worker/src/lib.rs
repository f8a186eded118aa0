//! Offline caching and request-interception layer.
//!
//! - [`classify`]: bypass / navigation / asset routing
//! - [`strategy`]: network-only, network-first and stale-while-revalidate
//! - [`generations`]: versioned cache partitions, install and activate
//! - [`control`]: control tokens posted by the application shell
//! - [`lifecycle`]: registration state machine and host signals
//! - [`worker`]: lifecycle event handlers
//! - [`host`]: JSON-lines protocol driving the worker over stdio

pub mod classify;
pub mod control;
pub mod error;
pub mod generations;
pub mod host;
pub mod lifecycle;
pub mod strategy;
pub mod worker;

#[cfg(test)]
mod testing;

pub use classify::{Classifier, RequestClass};
pub use control::ControlMessage;
pub use error::HostError;
pub use generations::{GenerationManager, GenerationNames, StoreSurvey};
pub use host::{Host, HostEvent, HostReply};
pub use lifecycle::{HostSignal, Registration, WorkerState};
pub use strategy::{Resolved, ResponseSource, StrategyEngine};
pub use worker::ServiceWorker;
