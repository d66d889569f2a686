use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::client::export::ExportedScholar;
use crate::error::AppResult;
use crate::models::ScholarRecord;

pub const DEFAULT_TEMPLATE: &str = "\
Write a concise, professional cold email from a student to the professor described in the JSON below, \
asking about research opportunities in their group.

About me:
- Name: {{name}}
- Major: {{major}}
- Year: {{year}}
- University: {{university}}
- Skills: {{skills}}
- Interests: {{interests}}
- Links: {{links}}

Guidelines:
- Reference one or two of the professor's specific publications or grants.
- Connect my skills to the possible requirements listed for the professor.
- Keep it under 200 words and end with a clear, polite ask for a short meeting.

Professor profile:";

/// Free-text fields the student fills in once and reuses across prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub name: String,
    pub major: String,
    pub year: String,
    pub university: String,
    pub skills: String,
    pub interests: String,
    pub links: String,
}

impl UserProfile {
    /// Placeholder, value and the label used when the value is empty.
    fn fields(&self) -> [(&'static str, &str, &'static str); 7] {
        [
            ("{{name}}", self.name.as_str(), "[Your Name]"),
            ("{{major}}", self.major.as_str(), "[Your Major]"),
            ("{{year}}", self.year.as_str(), "[Your Year]"),
            ("{{university}}", self.university.as_str(), "[Your University]"),
            ("{{skills}}", self.skills.as_str(), "[Your Skills]"),
            ("{{interests}}", self.interests.as_str(), "[Your Interests]"),
            ("{{links}}", self.links.as_str(), "[Your Links]"),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource<'a> {
    Template(&'a str),
    Custom(&'a str),
}

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("Invalid regex"));

/// Fills the known placeholders in one pass over the template, so text
/// inserted from the profile is never substituted again. Unknown
/// placeholders are kept as is.
pub fn build(template: &str, profile: &UserProfile) -> String {
    let fields = profile.fields();
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures<'_>| {
            match fields.iter().find(|(placeholder, _, _)| *placeholder == &caps[0]) {
                Some(&(_, value, label)) if value.trim().is_empty() => label.to_string(),
                Some(&(_, value, _)) => value.trim().to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

pub fn render(source: &PromptSource<'_>, profile: &UserProfile) -> String {
    match source {
        PromptSource::Template(template) => build(template, profile),
        PromptSource::Custom(text) => text.to_string(),
    }
}

/// Prompt text followed by the scholar's pretty-printed export JSON.
pub fn full_prompt(
    source: &PromptSource<'_>,
    profile: &UserProfile,
    record: &ScholarRecord,
) -> AppResult<String> {
    let scholar = serde_json::to_string_pretty(&ExportedScholar::from(record))?;
    Ok(format!("{}\n{}", render(source, profile), scholar))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> UserProfile {
        UserProfile {
            name: "Sam Rivera".to_string(),
            major: "Computer Science".to_string(),
            ..UserProfile::default()
        }
    }

    #[test]
    fn fills_known_fields_and_labels_empty_ones() {
        let text = build("Hi, I'm {{name}} ({{major}}, {{year}}).", &profile());
        assert_eq!(text, "Hi, I'm Sam Rivera (Computer Science, [Your Year]).");
    }

    #[test]
    fn leaves_unknown_placeholders_intact() {
        let text = build("{{name}} likes {{hobby}}", &profile());
        assert_eq!(text, "Sam Rivera likes {{hobby}}");
    }

    #[test]
    fn profile_text_is_inserted_literally() {
        let profile = UserProfile {
            name: "I love {{major}}".to_string(),
            major: "CS".to_string(),
            ..UserProfile::default()
        };
        assert_eq!(build("{{name}}", &profile), "I love {{major}}");
        assert_eq!(build("{{name}} / {{major}}", &profile), "I love {{major}} / CS");
    }

    #[test]
    fn custom_text_bypasses_substitution() {
        let source = PromptSource::Custom("Dear {{name}}, verbatim.");
        assert_eq!(render(&source, &profile()), "Dear {{name}}, verbatim.");
    }

    #[test]
    fn full_prompt_appends_export_json_after_newline() {
        let record: ScholarRecord = serde_json::from_value(serde_json::json!({
            "id": "s1",
            "name": "Avery Lee",
            "requirements": ["Machine Learning"],
            "reasoning": ["Publishes on ML"],
        }))
        .unwrap();

        let text = full_prompt(&PromptSource::Custom("Write an email."), &profile(), &record)
            .unwrap();
        let (head, json) = text.split_once('\n').unwrap();
        assert_eq!(head, "Write an email.");

        let value: serde_json::Value = serde_json::from_str(json).unwrap();
        assert_eq!(value["possible_requirements"], serde_json::json!(["Machine Learning"]));
        assert_eq!(value["reasoning"], serde_json::json!(["Publishes on ML"]));
        assert!(value.get("requirements").is_none());
    }

    #[test]
    fn default_template_mentions_every_placeholder() {
        let text = build(DEFAULT_TEMPLATE, &UserProfile::default());
        assert!(!text.contains("{{"));
        assert!(text.contains("[Your Links]"));
    }
}
