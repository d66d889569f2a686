use serde::{Deserialize, Serialize};

pub const GOOD_MATCH: &str = "Yes";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub funder_name: String,
    /// `"<start> to <end>"`.
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub status: String,
    /// Raw dates some sources send instead of `duration`; read on import only.
    #[serde(default, rename = "startDate", skip_serializing)]
    pub start_date: String,
    #[serde(default, rename = "endDate", skip_serializing)]
    pub end_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publication {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub r#abstract: String,
}

/// Full scholar document as stored and as returned by the detail and batch
/// endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScholarRecord {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub should_email: String,
    #[serde(default)]
    pub relevance_score: i32,
    #[serde(default)]
    pub active_grants_count: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub reasoning: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub active_grants: Vec<Grant>,
    #[serde(default)]
    pub expired_grants: Vec<Grant>,
    #[serde(default)]
    pub publications: Vec<Publication>,
}

impl ScholarRecord {
    pub fn is_good_match(&self) -> bool {
        self.should_email == GOOD_MATCH
    }

    pub fn primary_department(&self) -> &str {
        primary_department(&self.department)
    }

    pub fn to_card(&self) -> ScholarCard {
        ScholarCard {
            id: self.id.clone(),
            name: self.name.clone(),
            title: self.title.clone(),
            department: self.department.clone(),
            position: self.position.clone(),
            should_email: self.should_email.clone(),
            relevance_score: self.relevance_score,
            active_grants_count: self.active_grants_count,
            tags: self.tags.clone(),
            requirements: self.requirements.clone(),
            publications_count: self.publications.len() as i64,
        }
    }
}

/// Reduced projection used by the listing grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScholarCard {
    pub id: String,
    pub name: String,
    pub title: String,
    pub department: String,
    pub position: String,
    pub should_email: String,
    pub relevance_score: i32,
    pub active_grants_count: i32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub publications_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScholarPage {
    pub data: Vec<ScholarCard>,
    pub total: i64,
    pub page: u32,
    #[serde(rename = "totalPages")]
    pub total_pages: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub departments: Vec<String>,
    pub positions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Include,
    Exclude,
}

impl FilterMode {
    /// Anything other than `exclude` selects include mode.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("exclude") => FilterMode::Exclude,
            _ => FilterMode::Include,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterMode::Include => "include",
            FilterMode::Exclude => "exclude",
        }
    }
}

/// Portion of a department string before its first `-`.
pub fn primary_department(department: &str) -> &str {
    department
        .split_once('-')
        .map(|(code, _)| code)
        .unwrap_or(department)
}
