//! Progress event distribution.
//!
//! The [`EventBus`] fans events out to live subscribers of each job and
//! mirrors them into an [`EventSink`] for logging.

mod bus;
mod sink;

pub use bus::{EventBus, DEFAULT_CHANNEL_CAPACITY};
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
