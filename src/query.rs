//! Translation of the flat listing parameters into a structured scholar query.
//!
//! The same [`ScholarQuery`] drives both backends: [`ScholarQuery::where_clause`]
//! renders it as Postgres SQL with positional binds, and
//! [`ScholarQuery::matches`] evaluates it against an in-memory record.

use serde::Deserialize;
use tracing::debug;

use crate::models::{primary_department, FilterMode, ScholarRecord, GOOD_MATCH};

pub const PAGE_SIZE: i64 = 25;

/// Raw query string of `GET /api/scholars`. Every value stays a string so
/// malformed numbers can be dropped instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    pub page: Option<String>,
    pub search: Option<String>,
    pub min_score: Option<String>,
    pub max_score: Option<String>,
    pub min_grants: Option<String>,
    pub max_grants: Option<String>,
    pub req_search: Option<String>,
    pub email_only: Option<String>,
    pub depts: Option<String>,
    pub dept_mode: Option<String>,
    pub sub_depts: Option<String>,
    pub sub_dept_mode: Option<String>,
    pub positions: Option<String>,
    pub pos_mode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetFilter {
    pub values: Vec<String>,
    pub mode: FilterMode,
}

impl SetFilter {
    fn parse(raw: Option<&str>, mode: Option<&str>) -> Option<Self> {
        let values: Vec<String> = raw?
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();

        if values.is_empty() {
            return None;
        }

        Some(Self {
            values,
            mode: FilterMode::parse(mode),
        })
    }

    fn admits(&self, hit: bool) -> bool {
        match self.mode {
            FilterMode::Include => hit,
            FilterMode::Exclude => !hit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScholarQuery {
    pub search: Option<String>,
    pub min_score: Option<i32>,
    pub max_score: Option<i32>,
    pub min_grants: Option<i32>,
    pub max_grants: Option<i32>,
    pub req_search: Option<String>,
    pub email_only: bool,
    pub departments: Option<SetFilter>,
    pub sub_departments: Option<SetFilter>,
    pub positions: Option<SetFilter>,
    pub page: u32,
}

impl Default for ScholarQuery {
    fn default() -> Self {
        Self {
            search: None,
            min_score: None,
            max_score: None,
            min_grants: None,
            max_grants: None,
            req_search: None,
            email_only: false,
            departments: None,
            sub_departments: None,
            positions: None,
            page: 1,
        }
    }
}

/// A positional bind value for the rendered SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Text(String),
    Int(i32),
    BigInt(i64),
    TextArray(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlWhere {
    pub sql: String,
    pub binds: Vec<SqlValue>,
}

impl SqlWhere {
    fn push(&mut self, clause: &str, value: SqlValue) {
        self.binds.push(value);
        let placeholder = format!("${}", self.binds.len());
        let clause = clause.replace("{}", &placeholder);
        if self.sql.is_empty() {
            self.sql.push_str(" WHERE ");
        } else {
            self.sql.push_str(" AND ");
        }
        self.sql.push_str(&clause);
    }

    /// Appends `LIMIT`/`OFFSET` binds after the predicate binds.
    pub fn paginate(&mut self, limit: i64, offset: i64) -> String {
        self.binds.push(SqlValue::BigInt(limit));
        let limit_at = self.binds.len();
        self.binds.push(SqlValue::BigInt(offset));
        format!(" LIMIT ${} OFFSET ${}", limit_at, limit_at + 1)
    }
}

impl ScholarQuery {
    pub fn from_params(params: &ListParams) -> Self {
        Self {
            search: text(params.search.as_deref()),
            min_score: lenient_int("minScore", params.min_score.as_deref()),
            max_score: lenient_int("maxScore", params.max_score.as_deref()),
            min_grants: lenient_int("minGrants", params.min_grants.as_deref()),
            max_grants: lenient_int("maxGrants", params.max_grants.as_deref()),
            req_search: text(params.req_search.as_deref()),
            email_only: params.email_only.as_deref().map(str::trim) == Some("true"),
            departments: SetFilter::parse(params.depts.as_deref(), params.dept_mode.as_deref()),
            sub_departments: SetFilter::parse(
                params.sub_depts.as_deref(),
                params.sub_dept_mode.as_deref(),
            ),
            positions: SetFilter::parse(params.positions.as_deref(), params.pos_mode.as_deref()),
            page: lenient_int("page", params.page.as_deref())
                .filter(|page| *page >= 1)
                .map(|page| page as u32)
                .unwrap_or(1),
        }
    }

    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * PAGE_SIZE
    }

    pub fn where_clause(&self) -> SqlWhere {
        let mut sql = SqlWhere::default();

        if let Some(search) = &self.search {
            sql.push(
                "(strpos(lower(name), lower({})) > 0 OR strpos(lower(title), lower({})) > 0)",
                SqlValue::Text(search.clone()),
            );
        }
        if let Some(min) = self.min_score {
            sql.push("relevance_score >= {}", SqlValue::Int(min));
        }
        if let Some(max) = self.max_score {
            sql.push("relevance_score <= {}", SqlValue::Int(max));
        }
        if let Some(min) = self.min_grants {
            sql.push("active_grants_count >= {}", SqlValue::Int(min));
        }
        if let Some(max) = self.max_grants {
            sql.push("active_grants_count <= {}", SqlValue::Int(max));
        }
        if let Some(req) = &self.req_search {
            sql.push(
                "EXISTS (SELECT 1 FROM unnest(requirements) AS requirement \
                 WHERE strpos(lower(requirement), lower({})) > 0)",
                SqlValue::Text(req.clone()),
            );
        }
        if self.email_only {
            sql.push("should_email = {}", SqlValue::Text(GOOD_MATCH.to_string()));
        }
        if let Some(depts) = &self.departments {
            let patterns = depts.values.iter().map(|code| prefix_pattern(code)).collect();
            let clause = match depts.mode {
                FilterMode::Include => "department ~ ANY({})",
                FilterMode::Exclude => "NOT (department ~ ANY({}))",
            };
            sql.push(clause, SqlValue::TextArray(patterns));
        }
        if let Some(subs) = &self.sub_departments {
            let clause = match subs.mode {
                FilterMode::Include => "department = ANY({})",
                FilterMode::Exclude => "NOT (department = ANY({}))",
            };
            sql.push(clause, SqlValue::TextArray(subs.values.clone()));
        }
        if let Some(positions) = &self.positions {
            let clause = match positions.mode {
                FilterMode::Include => "position = ANY({})",
                FilterMode::Exclude => "NOT (position = ANY({}))",
            };
            sql.push(clause, SqlValue::TextArray(positions.values.clone()));
        }

        sql
    }

    pub fn matches(&self, record: &ScholarRecord) -> bool {
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !contains_folded(&record.name, &needle) && !contains_folded(&record.title, &needle)
            {
                return false;
            }
        }
        if self.min_score.is_some_and(|min| record.relevance_score < min)
            || self.max_score.is_some_and(|max| record.relevance_score > max)
            || self.min_grants.is_some_and(|min| record.active_grants_count < min)
            || self.max_grants.is_some_and(|max| record.active_grants_count > max)
        {
            return false;
        }
        if let Some(req) = &self.req_search {
            let needle = req.to_lowercase();
            if !record
                .requirements
                .iter()
                .any(|requirement| contains_folded(requirement, &needle))
            {
                return false;
            }
        }
        if self.email_only && !record.is_good_match() {
            return false;
        }
        if let Some(depts) = &self.departments {
            let hit = depts
                .values
                .iter()
                .any(|code| record.department.starts_with(&format!("{code}-")));
            if !depts.admits(hit) {
                return false;
            }
        }
        if let Some(subs) = &self.sub_departments {
            if !subs.admits(subs.values.contains(&record.department)) {
                return false;
            }
        }
        if let Some(positions) = &self.positions {
            if !positions.admits(positions.values.contains(&record.position)) {
                return false;
            }
        }
        true
    }
}

pub fn total_pages(total: i64) -> i64 {
    (total + PAGE_SIZE - 1) / PAGE_SIZE
}

/// Anchored regex matching every department under a primary code.
pub fn prefix_pattern(code: &str) -> String {
    format!("^{}-", regex::escape(code))
}

/// Whether `department` sits under the primary department `code`.
pub fn under_primary(department: &str, code: &str) -> bool {
    department.contains('-') && primary_department(department) == code
}

fn text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn lenient_int(name: &str, raw: Option<&str>) -> Option<i32> {
    let raw = raw.map(str::trim).filter(|value| !value.is_empty())?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(param = name, value = raw, error = %e, "ignoring malformed numeric filter");
            None
        }
    }
}

fn contains_folded(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> ListParams {
        let map: serde_json::Map<String, serde_json::Value> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect();
        serde_json::from_value(serde_json::Value::Object(map)).unwrap()
    }

    fn scholar(id: &str, department: &str, position: &str, score: i32) -> ScholarRecord {
        ScholarRecord {
            id: id.to_string(),
            name: format!("Scholar {id}"),
            title: "Associate Professor".to_string(),
            email: format!("{id}@ufl.edu"),
            department: department.to_string(),
            position: position.to_string(),
            should_email: if score >= 50 { "Yes" } else { "No" }.to_string(),
            relevance_score: score,
            active_grants_count: 2,
            tags: Vec::new(),
            reasoning: Vec::new(),
            requirements: vec!["Machine Learning".to_string(), "Data Visualization".to_string()],
            active_grants: Vec::new(),
            expired_grants: Vec::new(),
            publications: Vec::new(),
        }
    }

    #[test]
    fn empty_params_produce_no_predicate() {
        let query = ScholarQuery::from_params(&ListParams::default());
        assert_eq!(query, ScholarQuery::default());
        assert_eq!(query.where_clause(), SqlWhere::default());
    }

    #[test]
    fn malformed_numbers_are_treated_as_absent() {
        let query = ScholarQuery::from_params(&params(&[
            ("minScore", "abc"),
            ("maxScore", "80"),
            ("page", "-3"),
        ]));
        assert_eq!(query.min_score, None);
        assert_eq!(query.max_score, Some(80));
        assert_eq!(query.page, 1);
    }

    #[test]
    fn score_range_is_inclusive() {
        let query = ScholarQuery::from_params(&params(&[("minScore", "70"), ("maxScore", "80")]));
        assert!(query.matches(&scholar("a", "EG-CS", "Professor", 70)));
        assert!(query.matches(&scholar("b", "EG-CS", "Professor", 80)));
        assert!(!query.matches(&scholar("c", "EG-CS", "Professor", 69)));
        assert!(!query.matches(&scholar("d", "EG-CS", "Professor", 81)));
    }

    #[test]
    fn search_is_case_insensitive_over_name_or_title() {
        let query = ScholarQuery::from_params(&params(&[("search", "ASSOCIATE")]));
        assert!(query.matches(&scholar("a", "EG-CS", "Professor", 10)));

        let query = ScholarQuery::from_params(&params(&[("search", "scholar A")]));
        assert!(query.matches(&scholar("a", "EG-CS", "Professor", 10)));
        assert!(!query.matches(&scholar("b", "EG-CS", "Professor", 10)));
    }

    #[test]
    fn requirement_search_matches_any_element() {
        let query = ScholarQuery::from_params(&params(&[("reqSearch", "visual")]));
        assert!(query.matches(&scholar("a", "EG-CS", "Professor", 10)));

        let query = ScholarQuery::from_params(&params(&[("reqSearch", "robotics")]));
        assert!(!query.matches(&scholar("a", "EG-CS", "Professor", 10)));
    }

    #[test]
    fn department_exclude_drops_prefix_matches_only() {
        let query =
            ScholarQuery::from_params(&params(&[("depts", "EG"), ("deptMode", "exclude")]));
        assert!(!query.matches(&scholar("a", "EG-Computer Science", "Professor", 10)));
        assert!(query.matches(&scholar("b", "MD-Medicine", "Professor", 10)));
        assert!(query.matches(&scholar("c", "EGX-Other", "Professor", 10)));
    }

    #[test]
    fn department_and_sub_department_compose_conjunctively() {
        let query = ScholarQuery::from_params(&params(&[
            ("depts", "EG,MD"),
            ("subDepts", "EG-Mechanical"),
            ("subDeptMode", "exclude"),
        ]));
        assert!(query.matches(&scholar("a", "EG-Computer Science", "Professor", 10)));
        assert!(!query.matches(&scholar("b", "EG-Mechanical", "Professor", 10)));
        assert!(query.matches(&scholar("c", "MD-Medicine", "Professor", 10)));
        assert!(!query.matches(&scholar("d", "LS-Biology", "Professor", 10)));

        let sql = query.where_clause();
        assert_eq!(
            sql.sql,
            " WHERE department ~ ANY($1) AND NOT (department = ANY($2))"
        );
        assert_eq!(
            sql.binds,
            vec![
                SqlValue::TextArray(vec!["^EG-".to_string(), "^MD-".to_string()]),
                SqlValue::TextArray(vec!["EG-Mechanical".to_string()]),
            ]
        );
    }

    #[test]
    fn position_filter_supports_exclusion() {
        let query = ScholarQuery::from_params(&params(&[
            ("positions", "Lecturer, Adjunct"),
            ("posMode", "exclude"),
        ]));
        assert!(query.matches(&scholar("a", "EG-CS", "Professor", 10)));
        assert!(!query.matches(&scholar("b", "EG-CS", "Lecturer", 10)));
    }

    #[test]
    fn renders_positional_binds_in_order() {
        let query = ScholarQuery::from_params(&params(&[
            ("search", "lee"),
            ("minScore", "70"),
            ("emailOnly", "true"),
            ("positions", "Professor"),
        ]));
        let mut sql = query.where_clause();
        assert_eq!(
            sql.sql,
            " WHERE (strpos(lower(name), lower($1)) > 0 OR strpos(lower(title), lower($1)) > 0) \
             AND relevance_score >= $2 AND should_email = $3 AND position = ANY($4)"
        );
        assert_eq!(sql.paginate(PAGE_SIZE, 25), " LIMIT $5 OFFSET $6");
        assert_eq!(sql.binds.len(), 6);
    }

    #[test]
    fn prefix_pattern_escapes_regex_metacharacters() {
        assert_eq!(prefix_pattern("EG"), "^EG-");
        assert_eq!(prefix_pattern("A.B"), "^A\\.B-");
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0), 0);
        assert_eq!(total_pages(25), 1);
        assert_eq!(total_pages(30), 2);
    }

    #[test]
    fn email_only_requires_literal_true() {
        let query = ScholarQuery::from_params(&params(&[("emailOnly", "yes")]));
        assert!(!query.email_only);
        let query = ScholarQuery::from_params(&params(&[("emailOnly", "true")]));
        assert!(query.matches(&scholar("a", "EG-CS", "Professor", 70)));
        assert!(!query.matches(&scholar("b", "EG-CS", "Professor", 10)));
    }
}
