//! Utility functions.

mod validation;

pub use validation::{validate_topic, MAX_TOPIC_CHARS, MIN_TOPIC_CHARS};
