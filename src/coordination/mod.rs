//! Coordination primitives shared across concurrent workers.
//!
//! The only mutable state shared between the controller, the crawler and the
//! mining workers is the run-wide [`StopSignal`].

mod signals;

pub use signals::{StopReason, StopSignal};
