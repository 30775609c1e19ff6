//! Event-driven invocation.
//!
//! An inbound [`Event`] is reduced to an [`EventEnvelope`] (type, branch,
//! changed paths, tag) and evaluated against every enabled [`Trigger`] of the
//! active definitions. Each matching trigger spawns one execution.
//!
//! [`Trigger`]: crate::definition::Trigger

mod event;
mod matcher;

pub use event::{Event, EventEnvelope};
pub use matcher::{params_from_event, trigger_matches};
