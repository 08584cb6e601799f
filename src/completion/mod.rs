//! Streaming text-completion collaborator.
//!
//! Completion services answer with a lazily produced, finite sequence of
//! text fragments. [`FragmentStream`] is that sequence; dropping it at any
//! point releases the underlying connection. Nothing here retries: a
//! failed stream surfaces its error and the caller decides what to do.

mod ollama;
pub mod prompt;

use std::io::BufRead;

use serde::Deserialize;
use thiserror::Error;

pub use ollama::OllamaClient;
pub use prompt::{body_message_prompt, question_prompt};

use crate::error::IndexError;

/// Errors raised while requesting or reading a completion
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Completion request failed: {0}\nSuggestion: Check that the completion endpoint is running and reachable")]
    Http(String),

    #[error("Completion service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Completion service reported an error: {0}")]
    Service(String),

    #[error("Malformed stream line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    #[error("Failed to read completion stream: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CompletionError> for IndexError {
    fn from(err: CompletionError) -> Self {
        IndexError::ExternalProvider {
            provider: "completion service".to_string(),
            operation: "generate".to_string(),
            reason: err.to_string(),
        }
    }
}

/// Lazily produced completion fragments.
pub type FragmentStream = Box<dyn Iterator<Item = Result<String, CompletionError>> + Send>;

/// A text-completion service.
pub trait CompletionProvider: Send + Sync {
    /// Starts a completion for `prompt`.
    fn generate(&self, prompt: &str) -> Result<FragmentStream, CompletionError>;

    fn name(&self) -> &str;
}

/// Concatenates a stream, failing on the first error.
pub fn collect_completion(stream: FragmentStream) -> Result<String, CompletionError> {
    stream.collect()
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Fragments from a line-delimited JSON body (`{"response": .., "done": ..}`).
///
/// Blank keep-alive lines are skipped. The stream ends after a chunk with
/// `done: true`, at end of input, or right after yielding an error. The
/// reader is dropped as soon as the stream ends.
pub struct NdjsonFragments<R> {
    reader: Option<R>,
    line: usize,
    buf: String,
}

impl<R: BufRead> NdjsonFragments<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            line: 0,
            buf: String::new(),
        }
    }

    fn finish(&mut self) {
        self.reader = None;
    }
}

impl<R: BufRead> Iterator for NdjsonFragments<R> {
    type Item = Result<String, CompletionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reader = self.reader.as_mut()?;
            self.buf.clear();

            match reader.read_line(&mut self.buf) {
                Ok(0) => {
                    self.finish();
                    return None;
                }
                Ok(_) => {
                    self.line += 1;
                    let line = self.buf.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let chunk = match serde_json::from_str::<StreamChunk>(line) {
                        Ok(chunk) => chunk,
                        Err(e) => {
                            let line = self.line;
                            self.finish();
                            return Some(Err(CompletionError::Malformed {
                                line,
                                reason: e.to_string(),
                            }));
                        }
                    };

                    if let Some(error) = chunk.error {
                        self.finish();
                        return Some(Err(CompletionError::Service(error)));
                    }
                    if chunk.done {
                        self.finish();
                        if chunk.response.is_empty() {
                            return None;
                        }
                    }
                    return Some(Ok(chunk.response));
                }
                Err(e) => {
                    self.finish();
                    return Some(Err(CompletionError::Io(e)));
                }
            }
        }
    }
}

impl<R: BufRead> std::iter::FusedIterator for NdjsonFragments<R> {}
