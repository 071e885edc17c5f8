use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A job posting as stored by the jobs service.
///
/// `id` is carried for the caller's bookkeeping only; it never reaches a prompt,
/// so two postings with identical content share cached generations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub employment_type: Option<String>,
    #[serde(default)]
    pub experience_level: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}
