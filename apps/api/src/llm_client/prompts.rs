// Shared prompt constants used across generation tasks.
// Task-specific templates live in generation/prompts.rs.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_INSTRUCTION: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON value. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every system prompt that evaluates people.
pub const FAIRNESS_INSTRUCTION: &str = "\
    Evaluate candidates strictly on job-relevant skills, experience and education. \
    Never consider or infer age, gender, ethnicity, religion, disability, marital status \
    or any other protected characteristic.";

/// Appended to every system prompt that writes on a candidate's behalf.
pub const GROUNDING_INSTRUCTION: &str = "\
    Use only facts present in the provided profile and job details. \
    Do NOT invent employers, titles, dates, metrics or credentials.";
