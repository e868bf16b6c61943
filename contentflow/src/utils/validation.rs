//! Validation of submitted requests.

use crate::errors::SubmitError;

/// Minimum topic length in characters, after trimming.
pub const MIN_TOPIC_CHARS: usize = 3;

/// Maximum topic length in characters, after trimming.
pub const MAX_TOPIC_CHARS: usize = 200;

/// Longest run of one repeated character a topic may contain.
const MAX_REPEAT_RUN: usize = 4;

/// Validates a topic and returns it trimmed.
///
/// A topic must be 3 to 200 characters long, contain at least one letter and
/// not repeat any character five or more times in a row.
pub fn validate_topic(topic: &str) -> Result<String, SubmitError> {
    let trimmed = topic.trim();
    let chars = trimmed.chars().count();

    if chars < MIN_TOPIC_CHARS {
        return Err(SubmitError::InvalidTopic(format!(
            "topic must be at least {MIN_TOPIC_CHARS} characters"
        )));
    }
    if chars > MAX_TOPIC_CHARS {
        return Err(SubmitError::InvalidTopic(format!(
            "topic must be at most {MAX_TOPIC_CHARS} characters"
        )));
    }
    if !trimmed.chars().any(char::is_alphabetic) {
        return Err(SubmitError::InvalidTopic(
            "topic must contain at least one letter".to_string(),
        ));
    }
    if longest_run(trimmed) > MAX_REPEAT_RUN {
        return Err(SubmitError::InvalidTopic(
            "topic must not repeat a character 5 or more times in a row".to_string(),
        ));
    }

    Ok(trimmed.to_string())
}

/// Length of the longest run of one repeated character.
fn longest_run(text: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    let mut previous = None;
    for c in text.chars() {
        if previous == Some(c) {
            current += 1;
        } else {
            current = 1;
            previous = Some(c);
        }
        longest = longest.max(current);
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_topic_is_trimmed() {
        assert_eq!(validate_topic("  Quantum Computing \n").unwrap(), "Quantum Computing");
        assert_eq!(validate_topic("AI!").unwrap(), "AI!");
    }

    #[test]
    fn test_length_bounds() {
        assert!(validate_topic("ab").is_err());
        assert!(validate_topic("   ab   ").is_err());
        assert!(validate_topic(&"a b".repeat(67)).is_err());
        assert!(validate_topic(&"ab ".repeat(66)).is_ok());
    }

    #[test]
    fn test_requires_letter() {
        let err = validate_topic("12345").unwrap_err();
        assert!(err.to_string().contains("at least one letter"));
    }

    #[test]
    fn test_rejects_repeated_characters() {
        assert!(validate_topic("Rust aaaaa").is_err());
        assert!(validate_topic("Rust!!!!!").is_err());
        assert!(validate_topic("Rust aaaa").is_ok());
    }

    #[test]
    fn test_longest_run() {
        assert_eq!(longest_run(""), 0);
        assert_eq!(longest_run("abba"), 2);
        assert_eq!(longest_run("zzz"), 3);
    }
}
