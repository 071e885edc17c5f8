//! Input validation for generation tasks.
//!
//! Runs before any prompt is built. A failure here is a `ValidationError` and is never retried.

use crate::errors::AppError;
use crate::generation::image::ImageOptions;
use crate::models::candidate::{Application, CandidateProfile};
use crate::models::job::JobPosting;

pub const MAX_BULLETS: usize = 20;
pub const MAX_BULLET_CHARS: usize = 500;
pub const MAX_NOTES_CHARS: usize = 5000;
pub const MAX_APPLICATIONS: usize = 50;
pub const MAX_IMAGE_PROMPT_CHARS: usize = 1000;
pub const MAX_IMAGE_DIMENSION: u32 = 2048;

pub fn validate_job(job: &JobPosting) -> Result<(), AppError> {
    if job.title.trim().is_empty() {
        return Err(AppError::Validation("job.title cannot be empty".to_string()));
    }
    Ok(())
}

pub fn validate_candidate(candidate: &CandidateProfile) -> Result<(), AppError> {
    let has_content = !candidate.skills.is_empty()
        || !candidate.experience.is_empty()
        || !candidate.education.is_empty()
        || candidate
            .summary
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
        || candidate
            .headline
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
    if !has_content {
        return Err(AppError::Validation(
            "candidate profile has no skills, experience, education or summary".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_bullets(bullets: &[String]) -> Result<(), AppError> {
    if bullets.is_empty() {
        return Err(AppError::Validation("bullets cannot be empty".to_string()));
    }
    if bullets.len() > MAX_BULLETS {
        return Err(AppError::Validation(format!(
            "at most {MAX_BULLETS} bullets can be improved at once"
        )));
    }
    for (i, bullet) in bullets.iter().enumerate() {
        if bullet.trim().is_empty() {
            return Err(AppError::Validation(format!("bullet {} is empty", i + 1)));
        }
        if bullet.chars().count() > MAX_BULLET_CHARS {
            return Err(AppError::Validation(format!(
                "bullet {} exceeds {MAX_BULLET_CHARS} characters",
                i + 1
            )));
        }
    }
    Ok(())
}

pub fn validate_notes(notes: &str) -> Result<(), AppError> {
    if notes.trim().is_empty() {
        return Err(AppError::Validation("notes cannot be empty".to_string()));
    }
    if notes.chars().count() > MAX_NOTES_CHARS {
        return Err(AppError::Validation(format!(
            "notes cannot exceed {MAX_NOTES_CHARS} characters"
        )));
    }
    Ok(())
}

pub fn validate_applications(applications: &[Application]) -> Result<(), AppError> {
    if applications.is_empty() {
        return Err(AppError::Validation(
            "at least one application is required for ranking".to_string(),
        ));
    }
    if applications.len() > MAX_APPLICATIONS {
        return Err(AppError::Validation(format!(
            "at most {MAX_APPLICATIONS} applications can be ranked at once"
        )));
    }
    Ok(())
}

pub fn validate_image(prompt: &str, options: &ImageOptions) -> Result<(), AppError> {
    if prompt.trim().is_empty() {
        return Err(AppError::Validation("prompt cannot be empty".to_string()));
    }
    if prompt.chars().count() > MAX_IMAGE_PROMPT_CHARS {
        return Err(AppError::Validation(format!(
            "prompt cannot exceed {MAX_IMAGE_PROMPT_CHARS} characters"
        )));
    }
    for (name, value) in [("width", options.width), ("height", options.height)] {
        if value == 0 || value > MAX_IMAGE_DIMENSION {
            return Err(AppError::Validation(format!(
                "{name} must be between 1 and {MAX_IMAGE_DIMENSION}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_requires_title() {
        assert!(validate_job(&JobPosting::default()).is_err());
        let job = JobPosting {
            title: "Engineer".to_string(),
            ..Default::default()
        };
        assert!(validate_job(&job).is_ok());
    }

    #[test]
    fn test_empty_candidate_is_rejected() {
        assert!(validate_candidate(&CandidateProfile::default()).is_err());
        let candidate = CandidateProfile {
            skills: vec!["Rust".to_string()],
            ..Default::default()
        };
        assert!(validate_candidate(&candidate).is_ok());
    }

    #[test]
    fn test_bullet_bounds() {
        assert!(validate_bullets(&[]).is_err());
        assert!(validate_bullets(&["ok".to_string(), " ".to_string()]).is_err());
        assert!(validate_bullets(&vec!["ok".to_string(); MAX_BULLETS + 1]).is_err());
        assert!(validate_bullets(&["x".repeat(MAX_BULLET_CHARS + 1)]).is_err());
        assert!(validate_bullets(&["Built things".to_string()]).is_ok());
    }

    #[test]
    fn test_notes_bounds() {
        assert!(validate_notes("   ").is_err());
        assert!(validate_notes(&"n".repeat(MAX_NOTES_CHARS + 1)).is_err());
        assert!(validate_notes("Senior data engineer, Spark, remote").is_ok());
    }

    #[test]
    fn test_application_count_bounds() {
        assert!(validate_applications(&[]).is_err());
        assert!(validate_applications(&vec![Application::default(); MAX_APPLICATIONS + 1]).is_err());
        assert!(validate_applications(&[Application::default()]).is_ok());
    }

    #[test]
    fn test_image_bounds() {
        let options = ImageOptions::default();
        assert!(validate_image("", &options).is_err());
        assert!(validate_image("office skyline", &options).is_ok());
        let too_wide = ImageOptions {
            width: MAX_IMAGE_DIMENSION + 1,
            ..ImageOptions::default()
        };
        assert!(validate_image("office skyline", &too_wide).is_err());
    }
}
