//! Generation request and cache key types.
//!
//! A `GenerationRequest` is built fresh per call by the prompt builder and never
//! mutated. Its `CacheKey` is a SHA-256 digest over everything that affects the
//! provider's output; TTL and fallback message are excluded.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::llm_client::CompletionRequest;

const TEXT_KEY_PREFIX: &str = "ai:text";
const FALLBACK_SUFFIX: &str = ":fallback";

/// The six text tasks the generation layer serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    FitSummary,
    CoverLetter,
    ResumeBullets,
    JobDescription,
    CandidateRanking,
    ScreeningQuestions,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::FitSummary => "fit_summary",
            TaskKind::CoverLetter => "cover_letter",
            TaskKind::ResumeBullets => "resume_bullets",
            TaskKind::JobDescription => "job_description",
            TaskKind::CandidateRanking => "candidate_ranking",
            TaskKind::ScreeningQuestions => "screening_questions",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub task: TaskKind,
    pub system_prompt: String,
    pub user_prompt: String,
    pub params: GenerationParams,
    pub cache_ttl: Duration,
    /// Shown to the user when neither a live nor a previously generated result exists.
    pub fallback_message: Option<String>,
}

impl GenerationRequest {
    pub fn cache_key(&self) -> CacheKey {
        let mut hasher = Sha256::new();
        // Length-prefix every field so adjacent fields cannot bleed into each other.
        let fields: [&[u8]; 6] = [
            self.task.as_str().as_bytes(),
            self.params.model.as_bytes(),
            &self.params.temperature.to_bits().to_be_bytes(),
            &self.params.seed.to_be_bytes(),
            self.system_prompt.as_bytes(),
            self.user_prompt.as_bytes(),
        ];
        for field in fields {
            hasher.update((field.len() as u64).to_be_bytes());
            hasher.update(field);
        }
        CacheKey(format!("{TEXT_KEY_PREFIX}:{}", hex::encode(hasher.finalize())))
    }

    pub fn completion(&self) -> CompletionRequest<'_> {
        CompletionRequest {
            model: &self.params.model,
            temperature: self.params.temperature,
            seed: self.params.seed,
            system: &self.system_prompt,
            user: &self.user_prompt,
        }
    }
}

/// Cache address of one generation. The fallback slot lives under a derived key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wraps an already-derived key. Used by the image path, which hashes its own inputs.
    pub fn from_raw(key: String) -> Self {
        CacheKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn fallback(&self) -> String {
        format!("{}{FALLBACK_SUFFIX}", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
