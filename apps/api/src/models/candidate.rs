use serde::{Deserialize, Serialize};

/// A candidate profile as stored by the profiles service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub years_of_experience: Option<u32>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience: Vec<WorkExperience>,
    #[serde(default)]
    pub education: Vec<Education>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkExperience {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    pub degree: String,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub graduation_year: Option<u32>,
}

/// Structured data extracted from an uploaded resume by the resume parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumeData {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub highlights: Vec<String>,
}

/// One application submitted against a job, as handed to candidate ranking.
/// Its position in the submitted list is its candidate index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub candidate: CandidateProfile,
    #[serde(default)]
    pub resume_data: Option<ResumeData>,
    #[serde(default)]
    pub cover_letter: Option<String>,
}
