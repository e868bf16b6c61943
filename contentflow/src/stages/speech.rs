//! Speech synthesis seam for the audio stage.

use crate::errors::StageError;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Audio produced from a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    /// Raw audio bytes.
    pub bytes: Vec<u8>,
    /// Container format (e.g., "wav").
    pub format: String,
}

impl SynthesizedAudio {
    /// Hex SHA-256 of the audio bytes.
    #[must_use]
    pub fn sha256(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

/// A text-to-speech backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Returns true if the backend can be used at all.
    fn is_available(&self) -> bool;

    /// Renders a script to audio.
    async fn synthesize(&self, script: &str) -> Result<SynthesizedAudio, StageError>;
}

/// Pipes the script into an external TTS command and reads audio from its
/// stdout.
#[derive(Debug, Clone)]
pub struct CommandSynthesizer {
    program: Option<String>,
    args: Vec<String>,
    format: String,
}

impl CommandSynthesizer {
    /// Creates a synthesizer for a command; `None` means no backend.
    #[must_use]
    pub fn new(program: Option<String>, args: Vec<String>) -> Self {
        Self {
            program: program.filter(|p| !p.trim().is_empty()),
            args,
            format: "wav".to_string(),
        }
    }

    /// Sets the reported audio format.
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }
}

fn resolve_program(program: &str) -> bool {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file();
    }
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| dir.join(program).is_file())
    })
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    fn is_available(&self) -> bool {
        self.program.as_deref().is_some_and(resolve_program)
    }

    async fn synthesize(&self, script: &str) -> Result<SynthesizedAudio, StageError> {
        let program = self
            .program
            .as_deref()
            .ok_or_else(|| StageError::fatal("no speech command configured"))?;

        let mut child = Command::new(program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StageError::fatal(format!("failed to start '{program}': {e}")))?;

        // Feed stdin while output is drained; a streaming command stalls once
        // its stdout pipe fills if nobody reads it.
        let stdin = child.stdin.take();
        let feed = async move {
            match stdin {
                Some(mut stdin) => stdin.write_all(script.as_bytes()).await,
                None => Ok(()),
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output =
            output.map_err(|e| StageError::transient(format!("speech command failed: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StageError::transient(format!(
                "speech command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if let Err(e) = fed {
            return Err(StageError::transient(format!("failed to write script: {e}")));
        }
        if output.stdout.is_empty() {
            return Err(StageError::fatal("speech command produced no audio"));
        }

        debug!(program, bytes = output.stdout.len(), "Synthesized audio");
        Ok(SynthesizedAudio {
            bytes: output.stdout,
            format: self.format.clone(),
        })
    }
}
