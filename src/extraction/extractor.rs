//! The extraction collaborator contract.

use tracing::debug;

use crate::error::ExtractionError;

use super::coerce::{coerce_payload, strip_code_fences};
use super::{Chunk, ExtractionResult};

/// Turns one chunk of narrative text into candidate story entities.
pub trait Extractor: Send + Sync {
    /// Extract candidates from `chunk`.
    ///
    /// # Errors
    /// A failure only affects this chunk; the caller skips it.
    fn extract(&self, chunk: &Chunk) -> Result<ExtractionResult, ExtractionError>;
}

/// A raw text-completion service.
pub trait ExtractionBackend: Send + Sync {
    /// Complete `prompt`, returning the model's raw text.
    fn complete(&self, prompt: &str) -> Result<String, ExtractionError>;
}

/// Builds the prompt sent to a completion backend for one chunk.
#[must_use]
pub fn build_extraction_prompt(chunk_text: &str) -> String {
    format!(
        r#"Extract story entities from the following passage of fiction.

INSTRUCTIONS:
1. Identify named characters and named locations
2. Identify notable events and relationships between characters
3. Output ONLY valid JSON, nothing else
4. Use the exact schema below

SCHEMA:
{{
  "characters": [
    {{"name": "Name", "description": "...", "personality": "...", "appearance": "...", "traits": ["..."]}}
  ],
  "locations": [
    {{"name": "Name", "description": "...", "atmosphere": "...", "features": ["..."]}}
  ],
  "events": [
    {{"title": "Short title", "description": "...", "location": "Location name", "participants": ["Name"]}}
  ],
  "relationships": [
    {{"character_1": "Name", "character_2": "Name", "type": "relationship_type", "description": "..."}}
  ],
  "summary": "One paragraph summary of the passage"
}}

RULES:
- Use names exactly as they appear in the text
- Relationship endpoints must be character names from the "characters" list
- Omit fields the passage says nothing about
- Output ONLY the JSON object, no markdown, no explanations

TEXT:
{chunk_text}

JSON OUTPUT:"#
    )
}

/// An [`Extractor`] over a completion backend that answers in JSON.
pub struct JsonExtractor<B> {
    backend: B,
}

impl<B: ExtractionBackend> JsonExtractor<B> {
    /// Wraps a completion backend.
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Parses a raw completion into a strict result.
    ///
    /// # Errors
    /// [`ExtractionError::Malformed`] if the text is not a JSON object.
    pub fn parse_response(raw: &str) -> Result<ExtractionResult, ExtractionError> {
        let body = strip_code_fences(raw);
        let value: serde_json::Value =
            serde_json::from_str(body).map_err(|e| ExtractionError::Malformed(e.to_string()))?;
        coerce_payload(&value)
    }
}

impl<B: ExtractionBackend> Extractor for JsonExtractor<B> {
    fn extract(&self, chunk: &Chunk) -> Result<ExtractionResult, ExtractionError> {
        let prompt = build_extraction_prompt(&chunk.text);
        debug!(chunk = chunk.index, prompt_len = prompt.len(), "requesting extraction");

        let raw = self.backend.complete(&prompt)?;
        Self::parse_response(&raw)
    }
}
