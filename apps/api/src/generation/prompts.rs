// All LLM prompt constants for the generation tasks.
// Reuses cross-cutting fragments from llm_client::prompts.
// Templates are filled in a single pass over `{placeholder}` names by prompt_builder.rs.

/// System prompt for the candidate/job fit summary.
pub const FIT_SUMMARY_SYSTEM: &str = "You are an experienced technical recruiter. \
    You write concise, balanced assessments of how well a candidate matches a job, \
    for a hiring manager who has thirty seconds to read them.";

/// Replace: {job_section}, {candidate_section}
pub const FIT_SUMMARY_TEMPLATE: &str = r#"Assess how well this candidate fits the job below.

{job_section}

{candidate_section}

Write a fit summary of at most 150 words with three short paragraphs:
1. Overall fit in one sentence.
2. The strongest matches between the candidate and the requirements.
3. Gaps or open questions worth probing in an interview.
Do not use headings or bullet points."#;

/// System prompt for cover letters written on the candidate's behalf.
pub const COVER_LETTER_SYSTEM: &str = "You are a professional career writer. \
    You write warm, specific, confident cover letters in the first person \
    on behalf of job seekers.";

/// Replace: {job_section}, {candidate_section}
pub const COVER_LETTER_TEMPLATE: &str = r#"Write a cover letter for this candidate applying to the job below.

{job_section}

{candidate_section}

Requirements:
- 250 to 350 words, three or four paragraphs.
- Open with genuine interest in the role and company.
- Connect two or three concrete experiences to the job requirements.
- Close with a short call to action.
- Plain text only, no placeholders such as [Your Name]."#;

/// System prompt for rewriting resume bullets.
pub const RESUME_BULLETS_SYSTEM: &str = "You are an expert resume editor. \
    You rewrite resume bullet points to be specific, action-led and results-oriented \
    while keeping every fact the author provided.";

/// Replace: {bullets}
pub const RESUME_BULLETS_TEMPLATE: &str = r#"Improve each of the following resume bullet points.

ORIGINAL BULLETS:
{bullets}

Rules:
- Return exactly one improved bullet per original, in the same order, one per line, each starting with "- ".
- Start each bullet with a strong past-tense action verb.
- Keep every bullet under 30 words.
- Keep metrics that are present; never invent new numbers."#;

/// System prompt for drafting job descriptions from hiring-manager notes.
pub const JOB_DESCRIPTION_SYSTEM: &str = "You are a talent acquisition specialist. \
    You turn rough hiring-manager notes into clear, inclusive, well-structured job descriptions.";

/// Replace: {notes}
pub const JOB_DESCRIPTION_TEMPLATE: &str = r#"Draft a job description from these hiring-manager notes.

NOTES:
{notes}

Structure the description with these sections, in this order:
About the Role, Responsibilities, Requirements, Nice to Have, What We Offer.
Use inclusive language, avoid jargon such as "rockstar" or "ninja", and do not invent
a salary, benefits or company facts that are not in the notes."#;

/// System prompt for ranking applicants against a job.
pub const RANKING_SYSTEM: &str = "You are a senior technical recruiter who screens \
    applicants consistently and explains every score.";

/// Replace: {job_section}, {candidates}, {candidate_count}, {last_index}
pub const RANKING_TEMPLATE: &str = r#"Score each of the {candidate_count} candidates below against this job.

{job_section}

CANDIDATES:
{candidates}

Return a JSON array with exactly {candidate_count} objects, one per candidate, using this schema:
[
  {
    "candidateIndex": 0,
    "score": 85,
    "rationale": "Two sentences explaining the score.",
    "strength": "The single strongest qualification.",
    "concern": "The single biggest gap or risk."
  }
]

Rules:
- candidateIndex is the number shown after CANDIDATE, from 0 to {last_index}.
- score is an integer from 0 to 100.
- If you cannot produce JSON, use this plain-text format for every candidate instead:
CANDIDATE 0
Score: 85/100
Rationale: ...
Strength: ...
Concern: ..."#;

/// System prompt for interview screening questions.
pub const SCREENING_QUESTIONS_SYSTEM: &str = "You are an experienced interviewer. \
    You write targeted screening questions that verify a candidate's claims \
    and probe the gaps between their background and the role.";

/// Replace: {job_section}, {candidate_section}
pub const SCREENING_QUESTIONS_TEMPLATE: &str = r#"Write screening questions for a first-round interview.

{job_section}

{candidate_section}

Write exactly 5 numbered questions:
- 2 questions that verify experience the candidate claims.
- 2 questions that probe requirements the profile does not clearly cover.
- 1 behavioral question relevant to the role.
After each question add one line starting with "Listen for:" describing a strong answer."#;
