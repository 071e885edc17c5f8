//! Generation Service: one method per task, called by the HTTP handlers.
//!
//! Validates input, builds the request, runs it through the `ResilientCaller`, and turns
//! a `GenerationUnavailable` that carries a fallback into a successful but degraded result.

use serde::Serialize;
use tracing::warn;

use crate::errors::AppError;
use crate::generation::circuit_breaker::CircuitBreaker;
use crate::generation::image::{ImageGenerator, ImageOptions};
use crate::generation::prompt_builder::{PromptBuilder, TaskInput};
use crate::generation::ranking::{parse_ranking, ParseMode, RankingResult};
use crate::generation::resilient::{GenerationUnavailable, ResilientCaller};
use crate::generation::validation::{
    validate_applications, validate_bullets, validate_candidate, validate_image, validate_job,
    validate_notes,
};
use crate::models::candidate::{Application, CandidateProfile};
use crate::models::job::JobPosting;

pub const DEGRADED_WARNING: &str =
    "Using a previously generated result; the AI service is temporarily unavailable.";

/// Text produced for a task. `degraded` means it came from the fallback slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generated {
    pub text: String,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl Generated {
    fn fresh(text: String) -> Self {
        Self {
            text,
            degraded: false,
            warning: None,
        }
    }

    fn stale(text: String) -> Self {
        Self {
            text,
            degraded: true,
            warning: Some(DEGRADED_WARNING.to_string()),
        }
    }
}

/// Rankings in presentation order (descending score, then candidate index).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidates {
    pub rankings: Vec<RankingResult>,
    pub parse_mode: ParseMode,
    pub warnings: Vec<String>,
    pub degraded: bool,
}

pub struct GenerationService {
    prompts: PromptBuilder,
    caller: ResilientCaller,
    images: ImageGenerator,
}

impl GenerationService {
    pub fn new(prompts: PromptBuilder, caller: ResilientCaller, images: ImageGenerator) -> Self {
        Self {
            prompts,
            caller,
            images,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        self.caller.breaker()
    }

    pub async fn fit_summary(
        &self,
        job: &JobPosting,
        candidate: &CandidateProfile,
        seed: Option<u64>,
    ) -> Result<Generated, AppError> {
        validate_job(job)?;
        validate_candidate(candidate)?;
        self.run(TaskInput::FitSummary { job, candidate }, seed).await
    }

    pub async fn cover_letter(
        &self,
        job: &JobPosting,
        candidate: &CandidateProfile,
        seed: Option<u64>,
    ) -> Result<Generated, AppError> {
        validate_job(job)?;
        validate_candidate(candidate)?;
        self.run(TaskInput::CoverLetter { job, candidate }, seed).await
    }

    pub async fn improve_resume_bullets(
        &self,
        bullets: &[String],
        seed: Option<u64>,
    ) -> Result<Generated, AppError> {
        validate_bullets(bullets)?;
        self.run(TaskInput::ResumeBullets { bullets }, seed).await
    }

    pub async fn job_description(&self, notes: &str, seed: Option<u64>) -> Result<Generated, AppError> {
        validate_notes(notes)?;
        self.run(TaskInput::JobDescription { notes }, seed).await
    }

    pub async fn screening_questions(
        &self,
        job: &JobPosting,
        candidate: &CandidateProfile,
        seed: Option<u64>,
    ) -> Result<Generated, AppError> {
        validate_job(job)?;
        validate_candidate(candidate)?;
        self.run(TaskInput::ScreeningQuestions { job, candidate }, seed)
            .await
    }

    /// Ranks `applications` against `job`. Each result's `candidate_index` is the
    /// application's position in the input slice.
    pub async fn rank_candidates(
        &self,
        job: &JobPosting,
        applications: &[Application],
        seed: Option<u64>,
    ) -> Result<RankedCandidates, AppError> {
        validate_job(job)?;
        validate_applications(applications)?;

        let generated = self
            .run(TaskInput::CandidateRanking { job, applications }, seed)
            .await?;
        let (parse_mode, rankings, mut warnings) =
            parse_ranking(&generated.text, applications.len()).into_parts();
        if let Some(warning) = generated.warning {
            warnings.insert(0, warning);
        }

        Ok(RankedCandidates {
            rankings,
            parse_mode,
            warnings,
            degraded: generated.degraded,
        })
    }

    /// Never fails once the input is valid: provider or cache problems yield the placeholder URL.
    pub async fn generate_image(&self, prompt: &str, options: &ImageOptions) -> Result<String, AppError> {
        validate_image(prompt, options)?;
        Ok(self.images.generate_image(prompt, options).await)
    }

    async fn run(&self, input: TaskInput<'_>, seed: Option<u64>) -> Result<Generated, AppError> {
        let request = self.prompts.build(&input, seed);
        match self.caller.generate(&request).await {
            Ok(text) => Ok(Generated::fresh(text)),
            Err(GenerationUnavailable {
                fallback: Some(text),
                reason,
                ..
            }) => {
                warn!(task = %request.task, ?reason, "Returning degraded result");
                Ok(Generated::stale(text))
            }
            Err(e) => Err(e.into()),
        }
    }
}
