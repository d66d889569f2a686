use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::ScholarRecord;

pub const BANDS: [(i32, i32, &str); 5] = [
    (0, 20, "No relevance"),
    (21, 40, "Minimal"),
    (41, 60, "Moderate"),
    (61, 80, "High"),
    (81, 100, "Core CS"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandSummary {
    pub label: &'static str,
    pub min: i32,
    pub max: i32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DepartmentSummary {
    pub code: String,
    pub count: usize,
    pub avg_score: f64,
}

pub fn relevance_band(score: i32) -> &'static str {
    let score = score.clamp(0, 100);
    BANDS
        .iter()
        .find(|(min, max, _)| (*min..=*max).contains(&score))
        .map(|(_, _, label)| *label)
        .unwrap_or("No relevance")
}

pub fn summarize_by_band(records: &[ScholarRecord]) -> Vec<BandSummary> {
    BANDS
        .iter()
        .map(|&(min, max, label)| BandSummary {
            label,
            min,
            max,
            count: records
                .iter()
                .filter(|record| relevance_band(record.relevance_score) == label)
                .count(),
        })
        .collect()
}

pub fn summarize_by_department(records: &[ScholarRecord]) -> Vec<DepartmentSummary> {
    let mut map: HashMap<&str, (usize, i64)> = HashMap::new();

    for record in records {
        let entry = map
            .entry(record.primary_department())
            .or_insert((0, 0));
        entry.0 += 1;
        entry.1 += record.relevance_score as i64;
    }

    let mut summaries: Vec<DepartmentSummary> = map
        .into_iter()
        .map(|(code, (count, total_score))| DepartmentSummary {
            code: if code.is_empty() {
                "(none)".to_string()
            } else {
                code.to_string()
            },
            count,
            avg_score: if count == 0 {
                0.0
            } else {
                total_score as f64 / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));
    summaries
}

pub fn build_report(generated_on: NaiveDate, records: &[ScholarRecord]) -> String {
    let bands = summarize_by_band(records);
    let departments = summarize_by_department(records);
    let good_matches = records.iter().filter(|record| record.is_good_match()).count();

    let mut output = String::new();

    let _ = writeln!(output, "# Scholar Relevance Report");
    let _ = writeln!(
        output,
        "Generated on {} across {} scholars ({} good matches)",
        generated_on,
        records.len(),
        good_matches
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Relevance Distribution");

    for band in &bands {
        let _ = writeln!(
            output,
            "- {}-{} {}: {}",
            band.min, band.max, band.label, band.count
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Department Mix");

    if departments.is_empty() {
        let _ = writeln!(output, "No scholars loaded.");
    } else {
        for department in &departments {
            let _ = writeln!(
                output,
                "- {}: {} scholars (avg relevance {:.1})",
                department.code, department.count, department.avg_score
            );
        }
    }

    let mut ranked: Vec<&ScholarRecord> = records.iter().collect();
    ranked.sort_by(|a, b| {
        b.relevance_score
            .cmp(&a.relevance_score)
            .then_with(|| a.id.cmp(&b.id))
    });
    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Scholars");

    if ranked.is_empty() {
        let _ = writeln!(output, "No scholars loaded.");
    } else {
        for record in ranked.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} ({}, {}) score {} [{}], {} active grants",
                record.name,
                record.position,
                record.department,
                record.relevance_score,
                relevance_band(record.relevance_score),
                record.active_grants_count
            );
        }
    }

    output
}
