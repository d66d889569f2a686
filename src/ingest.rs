use std::path::Path;

use anyhow::Context;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use crate::models::{Grant, Publication, ScholarRecord, GOOD_MATCH};

pub const MAX_PUBLICATIONS: usize = 10;
pub const MAX_GRANTS: usize = 10;
pub const ACTIVE: &str = "Active";
pub const EXPIRED: &str = "Expired";

/// Import shape: a scholar document plus the split name fields some exports
/// carry instead of `name`.
#[derive(Debug, Deserialize)]
struct ImportedScholar {
    #[serde(flatten)]
    record: ScholarRecord,
    #[serde(default, rename = "firstName")]
    first_name: String,
    #[serde(default, rename = "lastName")]
    last_name: String,
}

impl ImportedScholar {
    fn into_record(self) -> ScholarRecord {
        let mut record = self.record;
        if record.name.trim().is_empty() {
            record.name = format!("{} {}", self.first_name.trim(), self.last_name.trim())
                .trim()
                .to_string();
        }
        record
    }
}

/// Reads a JSON array of scholar documents in the final pipeline schema.
pub fn read_json(path: &Path) -> anyhow::Result<Vec<ScholarRecord>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_json(&raw).with_context(|| format!("{} is not a scholars JSON array", path.display()))
}

pub fn parse_json(raw: &str) -> anyhow::Result<Vec<ScholarRecord>> {
    let imported: Vec<ImportedScholar> = serde_json::from_str(raw)?;
    Ok(normalize_all(
        imported.into_iter().map(ImportedScholar::into_record).collect(),
    ))
}

/// Normalizes every record and drops the ones without an id.
pub fn normalize_all(records: Vec<ScholarRecord>) -> Vec<ScholarRecord> {
    records
        .into_iter()
        .filter_map(|record| {
            if record.id.trim().is_empty() {
                warn!(name = %record.name, "skipping scholar without id");
                None
            } else {
                Some(normalize(record))
            }
        })
        .collect()
}

pub fn normalize(record: ScholarRecord) -> ScholarRecord {
    normalize_on(record, chrono::Local::now().date_naive())
}

/// Normalizes a record, judging grant expiry against `today`.
pub fn normalize_on(mut record: ScholarRecord, today: NaiveDate) -> ScholarRecord {
    record.id = record.id.trim().to_string();
    record.relevance_score = record.relevance_score.clamp(0, 100);
    record.should_email = normalize_should_email(&record.should_email).to_string();
    record.reasoning.retain(|line| !line.trim().is_empty());
    record.requirements.retain(|line| !line.trim().is_empty());
    record.tags.retain(|tag| !tag.trim().is_empty());

    record
        .publications
        .sort_by(|a: &Publication, b: &Publication| b.date.cmp(&a.date));
    record.publications.truncate(MAX_PUBLICATIONS);
    classify_grants(&mut record, today);
    record.active_grants.truncate(MAX_GRANTS);
    record.expired_grants.truncate(MAX_GRANTS);
    record.active_grants_count = record.active_grants.len() as i32;

    record
}

/// Files every grant under active or expired. A parsable end date decides;
/// without one an explicit status wins, then the list the grant arrived in.
/// Grants without a title are dropped.
fn classify_grants(record: &mut ScholarRecord, today: NaiveDate) {
    let listed = std::mem::take(&mut record.active_grants)
        .into_iter()
        .map(|grant| (grant, true))
        .chain(
            std::mem::take(&mut record.expired_grants)
                .into_iter()
                .map(|grant| (grant, false)),
        );

    for (mut grant, listed_active) in listed {
        grant.title = grant.title.trim().to_string();
        if grant.title.is_empty() {
            continue;
        }
        if grant.duration.trim().is_empty()
            && !grant.start_date.trim().is_empty()
            && !grant.end_date.trim().is_empty()
        {
            grant.duration = format!("{} to {}", grant.start_date.trim(), grant.end_date.trim());
        }

        let active = match grant_end(&grant) {
            Some(end) => end >= today,
            None if grant.status.trim().is_empty() => listed_active,
            None => grant.status.trim().eq_ignore_ascii_case(ACTIVE),
        };
        grant.status = if active { ACTIVE } else { EXPIRED }.to_string();

        if active {
            record.active_grants.push(grant);
        } else {
            record.expired_grants.push(grant);
        }
    }
}

fn grant_end(grant: &Grant) -> Option<NaiveDate> {
    let raw = if grant.end_date.trim().is_empty() {
        grant.duration.split(" to ").nth(1)?
    } else {
        grant.end_date.as_str()
    };
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

pub fn normalize_should_email(raw: &str) -> &'static str {
    match raw.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "1" => GOOD_MATCH,
        _ => "No",
    }
}

/// Small realistic collection used by the `seed` command.
pub fn seed_records() -> Vec<ScholarRecord> {
    let rows: [(&str, &str, &str, &str, &str, i32, &[&str], &[&str]); 8] = [
        (
            "seed-avery-lee",
            "Avery Lee",
            "Associate Professor",
            "EG-Computer & Information Science & Engineering",
            "Associate Professor",
            92,
            &["Machine Learning", "Distributed Systems"],
            &["Machine Learning", "Backend Development", "Data Engineering"],
        ),
        (
            "seed-jules-moreno",
            "Jules Moreno",
            "Professor",
            "MD-Medicine-Cardiology",
            "Professor",
            74,
            &["Medical Imaging"],
            &["Computer Vision", "Data Visualization", "Python"],
        ),
        (
            "seed-kiara-patel",
            "Kiara Patel",
            "Assistant Professor",
            "LS-Biology",
            "Assistant Professor",
            63,
            &["Bioinformatics", "Genomics"],
            &["Bioinformatics Pipelines", "Statistics", "Cloud Computing"],
        ),
        (
            "seed-ravi-iyer",
            "Ravi Iyer",
            "Professor",
            "EG-Electrical & Computer Engineering",
            "Professor",
            88,
            &["Embedded Systems", "Signal Processing"],
            &["Embedded C", "Signal Processing", "FPGA Design"],
        ),
        (
            "seed-maya-chen",
            "Maya Chen",
            "Lecturer",
            "LS-English",
            "Lecturer",
            18,
            &["Digital Humanities"],
            &["Web Development"],
        ),
        (
            "seed-omar-haddad",
            "Omar Haddad",
            "Research Scientist",
            "AG-Agricultural & Biological Engineering",
            "Research Scientist",
            57,
            &["Precision Agriculture", "Remote Sensing"],
            &["Computer Vision", "GIS", "Machine Learning"],
        ),
        (
            "seed-lena-novak",
            "Lena Novak",
            "Associate Professor",
            "BA-Economics",
            "Associate Professor",
            46,
            &["Econometrics"],
            &["Data Analysis", "Statistics"],
        ),
        (
            "seed-tomas-reyes",
            "Tomas Reyes",
            "Assistant Professor",
            "MD-Radiology",
            "Assistant Professor",
            81,
            &["Medical Imaging", "Deep Learning"],
            &["Deep Learning", "Computer Vision", "MLOps"],
        ),
    ];

    rows.into_iter()
        .map(
            |(id, name, title, department, position, score, tags, requirements)| {
                let first = name.split_whitespace().next().unwrap_or(name).to_lowercase();
                let active_grants = if score >= 60 {
                    vec![Grant {
                        title: format!("{} Research Initiative", tags[0]),
                        funder_name: "National Science Foundation".to_string(),
                        duration: "2025-07-01 to 2030-06-30".to_string(),
                        status: ACTIVE.to_string(),
                        ..Grant::default()
                    }]
                } else {
                    Vec::new()
                };

                normalize(ScholarRecord {
                    id: id.to_string(),
                    name: name.to_string(),
                    title: title.to_string(),
                    email: format!("{first}@ufl.edu"),
                    department: department.to_string(),
                    position: position.to_string(),
                    should_email: if score >= 50 { "Yes" } else { "No" }.to_string(),
                    relevance_score: score,
                    active_grants_count: 0,
                    tags: tags.iter().map(|tag| tag.to_string()).collect(),
                    reasoning: vec![
                        format!("Research centers on {}.", tags.join(" and ")),
                        format!("Relevance score {score} reflects computational overlap."),
                    ],
                    requirements: requirements.iter().map(|r| r.to_string()).collect(),
                    active_grants,
                    expired_grants: vec![Grant {
                        title: format!("Pilot Study in {}", tags[0]),
                        funder_name: "University of Florida".to_string(),
                        duration: "2019-01-01 to 2021-12-31".to_string(),
                        status: EXPIRED.to_string(),
                        ..Grant::default()
                    }],
                    publications: vec![Publication {
                        title: format!("Advances in {}", tags[0]),
                        date: "2024-03-15".to_string(),
                        r#abstract: format!("A survey of recent work in {}.", tags[0]),
                    }],
                })
            },
        )
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(value: serde_json::Value) -> ScholarRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn clamps_scores_and_normalizes_good_match_flag() {
        let record = normalize(raw(serde_json::json!({
            "id": " abc ",
            "relevance_score": 140,
            "should_email": "TRUE",
        })));
        assert_eq!(record.id, "abc");
        assert_eq!(record.relevance_score, 100);
        assert_eq!(record.should_email, "Yes");

        let record = normalize(raw(serde_json::json!({ "id": "x", "relevance_score": -4 })));
        assert_eq!(record.relevance_score, 0);
        assert_eq!(record.should_email, "No");
    }

    #[test]
    fn truncates_publications_newest_first_and_recounts_grants() {
        let publications: Vec<_> = (1..=12)
            .map(|month| serde_json::json!({ "title": format!("p{month}"), "date": format!("2024-{month:02}-01") }))
            .collect();
        let grants: Vec<_> = (0..12)
            .map(|i| serde_json::json!({ "title": format!("g{i}"), "status": "Active" }))
            .collect();

        let record = normalize(raw(serde_json::json!({
            "id": "x",
            "publications": publications,
            "active_grants": grants,
            "active_grants_count": 99,
            "reasoning": ["ok", "  "],
        })));

        assert_eq!(record.publications.len(), MAX_PUBLICATIONS);
        assert_eq!(record.publications[0].title, "p12");
        assert_eq!(record.active_grants_count, MAX_GRANTS as i32);
        assert_eq!(record.reasoning, vec!["ok"]);
    }

    fn day(raw: &str) -> NaiveDate {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn expired_grants_never_count_as_active() {
        let record = normalize_on(
            raw(serde_json::json!({
                "id": "x",
                "active_grants": [
                    { "title": "Old award", "status": "Expired", "duration": "2010-01-01 to 2012-01-01" },
                    { "title": "Marked expired", "status": "Expired" },
                ],
                "active_grants_count": 2,
            })),
            day("2026-10-19"),
        );

        assert_eq!(record.active_grants_count, 0);
        assert!(record.active_grants.is_empty());
        assert_eq!(record.expired_grants.len(), 2);
        assert!(record.expired_grants.iter().all(|grant| grant.status == EXPIRED));
    }

    #[test]
    fn end_date_decides_grant_status() {
        let record = normalize_on(
            raw(serde_json::json!({
                "id": "x",
                "active_grants": [
                    { "title": "Lapsed", "status": "Active", "duration": "2020-01-01 to 2026-10-18" },
                ],
                "expired_grants": [
                    { "title": "Renewed", "status": "Expired", "duration": "2024-01-01 to 2028-12-31" },
                    { "title": "Raw dates", "startDate": "2025-09-01T00:00:00", "endDate": "2027-08-31T00:00:00" },
                    { "title": "  " },
                ],
            })),
            day("2026-10-19"),
        );

        let active: Vec<_> = record.active_grants.iter().map(|g| g.title.as_str()).collect();
        assert_eq!(active, vec!["Renewed", "Raw dates"]);
        assert_eq!(record.active_grants_count, 2);
        assert_eq!(record.active_grants[1].duration, "2025-09-01T00:00:00 to 2027-08-31T00:00:00");
        assert_eq!(record.expired_grants.len(), 1);
        assert_eq!(record.expired_grants[0].title, "Lapsed");
        assert_eq!(record.expired_grants[0].status, EXPIRED);
    }

    #[test]
    fn split_name_fields_fill_a_missing_name() {
        let records = parse_json(
            r#"[
                { "id": "a", "firstName": "Lena", "lastName": "Novak" },
                { "id": "b", "name": "Ravi Iyer", "firstName": "R." },
                { "id": "c", "lastName": "Haddad" }
            ]"#,
        )
        .unwrap();

        let names: Vec<_> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Lena Novak", "Ravi Iyer", "Haddad"]);
    }

    #[test]
    fn drops_records_without_id() {
        let records = normalize_all(vec![
            raw(serde_json::json!({ "id": "" , "name": "Nobody" })),
            raw(serde_json::json!({ "id": "kept" })),
        ]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "kept");
    }

    #[test]
    fn seed_records_have_unique_ids() {
        let records = seed_records();
        let mut ids: Vec<_> = records.iter().map(|r| r.id.clone()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), records.len());
        assert!(records.iter().any(|r| r.is_good_match()));
    }
}
