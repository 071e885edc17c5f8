//! Axum route handlers for the AI generation API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::generation::image::ImageOptions;
use crate::generation::service::{Generated, RankedCandidates};
use crate::models::candidate::{Application, CandidateProfile};
use crate::models::job::JobPosting;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

/// Body shared by fit-summary, cover-letter and screening-questions.
#[derive(Debug, Deserialize)]
pub struct JobCandidateRequest {
    pub job: JobPosting,
    pub candidate: CandidateProfile,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ResumeBulletsRequest {
    pub bullets: Vec<String>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct JobDescriptionRequest {
    pub notes: String,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct RankCandidatesRequest {
    pub job: JobPosting,
    pub applications: Vec<Application>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    #[serde(flatten)]
    pub options: ImageOptions,
}

#[derive(Debug, Serialize)]
pub struct ImageResponse {
    pub url: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/ai/fit-summary
pub async fn handle_fit_summary(
    State(state): State<AppState>,
    Json(request): Json<JobCandidateRequest>,
) -> Result<Json<Generated>, AppError> {
    let generated = state
        .generation
        .fit_summary(&request.job, &request.candidate, request.seed)
        .await?;
    Ok(Json(generated))
}

/// POST /api/v1/ai/cover-letter
pub async fn handle_cover_letter(
    State(state): State<AppState>,
    Json(request): Json<JobCandidateRequest>,
) -> Result<Json<Generated>, AppError> {
    let generated = state
        .generation
        .cover_letter(&request.job, &request.candidate, request.seed)
        .await?;
    Ok(Json(generated))
}

/// POST /api/v1/ai/resume-bullets
///
/// Returns the rewritten bullets as one text block, one bullet per line.
pub async fn handle_resume_bullets(
    State(state): State<AppState>,
    Json(request): Json<ResumeBulletsRequest>,
) -> Result<Json<Generated>, AppError> {
    let generated = state
        .generation
        .improve_resume_bullets(&request.bullets, request.seed)
        .await?;
    Ok(Json(generated))
}

/// POST /api/v1/ai/job-description
pub async fn handle_job_description(
    State(state): State<AppState>,
    Json(request): Json<JobDescriptionRequest>,
) -> Result<Json<Generated>, AppError> {
    let generated = state
        .generation
        .job_description(&request.notes, request.seed)
        .await?;
    Ok(Json(generated))
}

/// POST /api/v1/ai/rank-candidates
///
/// `rankings` is sorted for display; use each entry's `candidate_index` to map it back
/// to the submitted application.
pub async fn handle_rank_candidates(
    State(state): State<AppState>,
    Json(request): Json<RankCandidatesRequest>,
) -> Result<Json<RankedCandidates>, AppError> {
    let ranked = state
        .generation
        .rank_candidates(&request.job, &request.applications, request.seed)
        .await?;
    Ok(Json(ranked))
}

/// POST /api/v1/ai/screening-questions
pub async fn handle_screening_questions(
    State(state): State<AppState>,
    Json(request): Json<JobCandidateRequest>,
) -> Result<Json<Generated>, AppError> {
    let generated = state
        .generation
        .screening_questions(&request.job, &request.candidate, request.seed)
        .await?;
    Ok(Json(generated))
}

/// POST /api/v1/ai/image
pub async fn handle_image(
    State(state): State<AppState>,
    Json(request): Json<ImageRequest>,
) -> Result<Json<ImageResponse>, AppError> {
    let url = state
        .generation
        .generate_image(&request.prompt, &request.options)
        .await?;
    Ok(Json(ImageResponse { url }))
}
