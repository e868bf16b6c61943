//! The immutable job request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Writing tone requested for the content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
    /// Formal business register.
    Professional,
    /// Friendly, second-person register.
    Conversational,
    /// Precise and jargon-tolerant.
    Technical,
    /// Relaxed.
    Casual,
    /// Citation-heavy.
    Academic,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Professional => write!(f, "professional"),
            Self::Conversational => write!(f, "conversational"),
            Self::Technical => write!(f, "technical"),
            Self::Casual => write!(f, "casual"),
            Self::Academic => write!(f, "academic"),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Per-job generation switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Pass the interrupt point without waiting for approval.
    #[serde(default = "default_true")]
    pub auto_approve: bool,

    /// Run the image stages.
    #[serde(default = "default_true")]
    pub include_images: bool,

    /// Run the audio stage.
    #[serde(default = "default_true")]
    pub include_audio: bool,

    /// Requested tone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<Tone>,

    /// Target audience.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            auto_approve: true,
            include_images: true,
            include_audio: true,
            tone: None,
            audience: None,
        }
    }
}

/// The snapshot of a submission, fixed for the life of the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// The content topic.
    pub topic: String,

    /// Generation switches.
    #[serde(flatten)]
    pub options: GenerationOptions,
}

impl JobRequest {
    /// Creates a request with default options.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            options: GenerationOptions::default(),
        }
    }

    /// Sets the auto-approve switch.
    #[must_use]
    pub fn with_auto_approve(mut self, auto_approve: bool) -> Self {
        self.options.auto_approve = auto_approve;
        self
    }

    /// Sets the image switch.
    #[must_use]
    pub fn with_images(mut self, include_images: bool) -> Self {
        self.options.include_images = include_images;
        self
    }

    /// Sets the audio switch.
    #[must_use]
    pub fn with_audio(mut self, include_audio: bool) -> Self {
        self.options.include_audio = include_audio;
        self
    }

    /// Sets the tone.
    #[must_use]
    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.options.tone = Some(tone);
        self
    }
}
