//! Maps a typed task input to a `GenerationRequest`.
//!
//! Pure and total: no I/O, no errors, no clock. Identical inputs always produce an
//! identical request (and therefore an identical cache key), so every section is
//! rendered in input order and optional fields render the same way every time.
//! Input validation happens before this, in `validation.rs`.

use std::sync::LazyLock;
use std::time::Duration;

use regex::{Captures, Regex};

use crate::generation::prompts::{
    COVER_LETTER_SYSTEM, COVER_LETTER_TEMPLATE, FIT_SUMMARY_SYSTEM, FIT_SUMMARY_TEMPLATE,
    JOB_DESCRIPTION_SYSTEM, JOB_DESCRIPTION_TEMPLATE, RANKING_SYSTEM, RANKING_TEMPLATE,
    RESUME_BULLETS_SYSTEM, RESUME_BULLETS_TEMPLATE, SCREENING_QUESTIONS_SYSTEM,
    SCREENING_QUESTIONS_TEMPLATE,
};
use crate::generation::request::{GenerationParams, GenerationRequest, TaskKind};
use crate::llm_client::prompts::{FAIRNESS_INSTRUCTION, GROUNDING_INSTRUCTION, JSON_ONLY_INSTRUCTION};
use crate::models::candidate::{Application, CandidateProfile};
use crate::models::job::JobPosting;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_SEED: u64 = 42;
pub const TEXT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Cover letters and resume text are truncated before they reach the ranking prompt.
const MAX_COVER_LETTER_CHARS: usize = 1500;
const MAX_RESUME_SUMMARY_CHARS: usize = 600;
const MAX_RESUME_HIGHLIGHTS: usize = 5;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{(\w+)\}").unwrap());

/// Typed inputs for each task. Borrowed so callers keep ownership of their records.
#[derive(Debug, Clone, Copy)]
pub enum TaskInput<'a> {
    FitSummary {
        job: &'a JobPosting,
        candidate: &'a CandidateProfile,
    },
    CoverLetter {
        job: &'a JobPosting,
        candidate: &'a CandidateProfile,
    },
    ResumeBullets {
        bullets: &'a [String],
    },
    JobDescription {
        notes: &'a str,
    },
    CandidateRanking {
        job: &'a JobPosting,
        applications: &'a [Application],
    },
    ScreeningQuestions {
        job: &'a JobPosting,
        candidate: &'a CandidateProfile,
    },
}

impl TaskInput<'_> {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskInput::FitSummary { .. } => TaskKind::FitSummary,
            TaskInput::CoverLetter { .. } => TaskKind::CoverLetter,
            TaskInput::ResumeBullets { .. } => TaskKind::ResumeBullets,
            TaskInput::JobDescription { .. } => TaskKind::JobDescription,
            TaskInput::CandidateRanking { .. } => TaskKind::CandidateRanking,
            TaskInput::ScreeningQuestions { .. } => TaskKind::ScreeningQuestions,
        }
    }
}

/// Holds the model id; everything else about a request is fixed.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    model: String,
}

impl PromptBuilder {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    /// Builds the request for `input`. `seed` overrides the default seed of 42.
    pub fn build(&self, input: &TaskInput<'_>, seed: Option<u64>) -> GenerationRequest {
        let task = input.kind();
        let (system_prompt, user_prompt) = match input {
            TaskInput::FitSummary { job, candidate } => (
                system_with(FIT_SUMMARY_SYSTEM, &[FAIRNESS_INSTRUCTION]),
                render(
                    FIT_SUMMARY_TEMPLATE,
                    &[
                        ("job_section", job_section(job).as_str()),
                        ("candidate_section", candidate_section(candidate).as_str()),
                    ],
                ),
            ),
            TaskInput::CoverLetter { job, candidate } => (
                system_with(COVER_LETTER_SYSTEM, &[GROUNDING_INSTRUCTION]),
                render(
                    COVER_LETTER_TEMPLATE,
                    &[
                        ("job_section", job_section(job).as_str()),
                        ("candidate_section", candidate_section(candidate).as_str()),
                    ],
                ),
            ),
            TaskInput::ResumeBullets { bullets } => (
                system_with(RESUME_BULLETS_SYSTEM, &[GROUNDING_INSTRUCTION]),
                render(RESUME_BULLETS_TEMPLATE, &[("bullets", numbered_bullets(bullets).as_str())]),
            ),
            TaskInput::JobDescription { notes } => (
                JOB_DESCRIPTION_SYSTEM.to_string(),
                render(JOB_DESCRIPTION_TEMPLATE, &[("notes", notes.trim())]),
            ),
            TaskInput::CandidateRanking { job, applications } => (
                system_with(RANKING_SYSTEM, &[FAIRNESS_INSTRUCTION, JSON_ONLY_INSTRUCTION]),
                render(
                    RANKING_TEMPLATE,
                    &[
                        ("job_section", job_section(job).as_str()),
                        ("candidates", ranking_candidates(applications).as_str()),
                        ("candidate_count", applications.len().to_string().as_str()),
                        (
                            "last_index",
                            applications.len().saturating_sub(1).to_string().as_str(),
                        ),
                    ],
                ),
            ),
            TaskInput::ScreeningQuestions { job, candidate } => (
                system_with(SCREENING_QUESTIONS_SYSTEM, &[FAIRNESS_INSTRUCTION]),
                render(
                    SCREENING_QUESTIONS_TEMPLATE,
                    &[
                        ("job_section", job_section(job).as_str()),
                        ("candidate_section", candidate_section(candidate).as_str()),
                    ],
                ),
            ),
        };

        GenerationRequest {
            task,
            system_prompt,
            user_prompt,
            params: GenerationParams {
                model: self.model.clone(),
                temperature: DEFAULT_TEMPERATURE,
                seed: seed.unwrap_or(DEFAULT_SEED),
            },
            cache_ttl: TEXT_CACHE_TTL,
            fallback_message: Some(fallback_message(task).to_string()),
        }
    }
}

/// Message surfaced when nothing can be generated and nothing was generated before.
pub fn fallback_message(task: TaskKind) -> &'static str {
    match task {
        TaskKind::FitSummary => {
            "AI fit summaries are temporarily unavailable. Please review the profile manually."
        }
        TaskKind::CoverLetter => {
            "AI cover letters are temporarily unavailable. Please write your cover letter manually."
        }
        TaskKind::ResumeBullets => {
            "AI bullet suggestions are temporarily unavailable. Your original bullets are unchanged."
        }
        TaskKind::JobDescription => {
            "AI job descriptions are temporarily unavailable. Please write the description manually."
        }
        TaskKind::CandidateRanking => {
            "AI candidate ranking is temporarily unavailable. Please review applications manually."
        }
        TaskKind::ScreeningQuestions => {
            "AI screening questions are temporarily unavailable. Please prepare questions manually."
        }
    }
}

/// Fills `{name}` placeholders in one pass over the template. Substituted values are
/// never scanned again, so braces in caller text come through verbatim.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            values
                .iter()
                .find(|(name, _)| *name == &caps[1])
                .map_or_else(|| caps[0].to_string(), |(_, value)| value.to_string())
        })
        .into_owned()
}

fn system_with(base: &str, fragments: &[&str]) -> String {
    let mut system = base.to_string();
    for fragment in fragments {
        system.push(' ');
        system.push_str(fragment);
    }
    system
}

fn push_line(out: &mut String, label: &str, value: Option<&str>) {
    if let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) {
        out.push_str(label);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
}

fn push_list(out: &mut String, label: &str, items: &[String]) {
    if !items.is_empty() {
        push_line(out, label, Some(&items.join(", ")));
    }
}

fn job_section(job: &JobPosting) -> String {
    let mut out = String::from("JOB:\n");
    push_line(&mut out, "Title", Some(&job.title));
    push_line(&mut out, "Company", job.company.as_deref());
    push_line(&mut out, "Location", job.location.as_deref());
    push_line(&mut out, "Employment type", job.employment_type.as_deref());
    push_line(&mut out, "Experience level", job.experience_level.as_deref());
    push_list(&mut out, "Required skills", &job.skills);
    if !job.requirements.is_empty() {
        out.push_str("Requirements:\n");
        for requirement in &job.requirements {
            out.push_str("- ");
            out.push_str(requirement.trim());
            out.push('\n');
        }
    }
    push_line(&mut out, "Description", Some(&job.description));
    out.trim_end().to_string()
}

fn candidate_section(candidate: &CandidateProfile) -> String {
    let mut out = String::from("CANDIDATE:\n");
    candidate_details(&mut out, candidate);
    out.trim_end().to_string()
}

fn candidate_details(out: &mut String, candidate: &CandidateProfile) {
    push_line(out, "Name", candidate.name.as_deref());
    push_line(out, "Headline", candidate.headline.as_deref());
    if let Some(years) = candidate.years_of_experience {
        push_line(out, "Years of experience", Some(&years.to_string()));
    }
    push_list(out, "Skills", &candidate.skills);
    if !candidate.experience.is_empty() {
        out.push_str("Experience:\n");
        for role in &candidate.experience {
            let period = match (role.start_date.as_deref(), role.end_date.as_deref()) {
                (Some(start), Some(end)) => format!(" ({start} - {end})"),
                (Some(start), None) => format!(" ({start} - present)"),
                _ => String::new(),
            };
            out.push_str(&format!("- {} at {}{period}", role.title.trim(), role.company.trim()));
            if let Some(description) = role.description.as_deref().map(str::trim) {
                if !description.is_empty() {
                    out.push_str(": ");
                    out.push_str(description);
                }
            }
            out.push('\n');
        }
    }
    if !candidate.education.is_empty() {
        out.push_str("Education:\n");
        for education in &candidate.education {
            out.push_str(&format!("- {}", education.degree.trim()));
            if let Some(field) = education.field.as_deref() {
                out.push_str(&format!(" in {}", field.trim()));
            }
            out.push_str(&format!(", {}", education.institution.trim()));
            if let Some(year) = education.graduation_year {
                out.push_str(&format!(" ({year})"));
            }
            out.push('\n');
        }
    }
    push_line(out, "Summary", candidate.summary.as_deref());
}

fn numbered_bullets(bullets: &[String]) -> String {
    bullets
        .iter()
        .enumerate()
        .map(|(i, bullet)| format!("{}. {}", i + 1, bullet.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn ranking_candidates(applications: &[Application]) -> String {
    applications
        .iter()
        .enumerate()
        .map(|(index, application)| {
            let mut out = format!("CANDIDATE {index}\n");
            candidate_details(&mut out, &application.candidate);
            if let Some(resume) = &application.resume_data {
                let summary = resume
                    .summary
                    .as_deref()
                    .map(|summary| truncate(summary, MAX_RESUME_SUMMARY_CHARS));
                push_line(&mut out, "Resume summary", summary.as_deref());
                push_list(&mut out, "Resume skills", &resume.skills);
                let shown = resume.highlights.len().min(MAX_RESUME_HIGHLIGHTS);
                push_list(&mut out, "Resume highlights", &resume.highlights[..shown]);
            }
            if let Some(letter) = application.cover_letter.as_deref() {
                push_line(&mut out, "Cover letter", Some(&truncate(letter, MAX_COVER_LETTER_CHARS)));
            }
            out.trim_end().to_string()
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.trim().chars().take(max_chars).collect()
}
