//! Client-held browsing state and its mirror in local storage.
//!
//! Nothing is written to storage until [`ClientStore::hydrate`] has run, so
//! defaults never overwrite what a previous session saved. Filter changes are
//! persisted when the (debounced) listing fetch is issued rather than on
//! every keystroke.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::client::debounce::RequestSequencer;
use crate::client::prompt::{PromptSource, UserProfile, DEFAULT_TEMPLATE};
use crate::client::storage::{self, KeyValueStorage};
use crate::error::AppResult;
use crate::models::{FilterMode, FilterOptions, ScholarPage, ScholarRecord};
use crate::query::under_primary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FilterSelection {
    pub search: String,
    pub min_score: Option<i32>,
    pub max_score: Option<i32>,
    pub min_grants: Option<i32>,
    pub max_grants: Option<i32>,
    pub req_search: String,
    pub email_only: bool,
    pub depts: BTreeSet<String>,
    pub dept_mode: FilterMode,
    pub sub_depts: BTreeSet<String>,
    pub sub_dept_mode: FilterMode,
    pub positions: BTreeSet<String>,
    pub pos_mode: FilterMode,
    pub page: u32,
}

impl Default for FilterSelection {
    fn default() -> Self {
        Self {
            search: String::new(),
            min_score: None,
            max_score: None,
            min_grants: None,
            max_grants: None,
            req_search: String::new(),
            email_only: false,
            depts: BTreeSet::new(),
            dept_mode: FilterMode::Include,
            sub_depts: BTreeSet::new(),
            sub_dept_mode: FilterMode::Include,
            positions: BTreeSet::new(),
            pos_mode: FilterMode::Include,
            page: 1,
        }
    }
}

impl FilterSelection {
    /// Query string pairs for `GET /api/scholars`; unset filters are omitted.
    pub fn to_query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("page", self.page.to_string())];

        if !self.search.trim().is_empty() {
            pairs.push(("search", self.search.trim().to_string()));
        }
        let bounds = [
            ("minScore", self.min_score),
            ("maxScore", self.max_score),
            ("minGrants", self.min_grants),
            ("maxGrants", self.max_grants),
        ];
        for (key, bound) in bounds {
            if let Some(value) = bound {
                pairs.push((key, value.to_string()));
            }
        }
        if !self.req_search.trim().is_empty() {
            pairs.push(("reqSearch", self.req_search.trim().to_string()));
        }
        if self.email_only {
            pairs.push(("emailOnly", "true".to_string()));
        }

        let sets = [
            ("depts", "deptMode", &self.depts, self.dept_mode),
            ("subDepts", "subDeptMode", &self.sub_depts, self.sub_dept_mode),
            ("positions", "posMode", &self.positions, self.pos_mode),
        ];
        for (key, mode_key, values, mode) in sets {
            if !values.is_empty() {
                let joined = values.iter().map(String::as_str).collect::<Vec<_>>().join(",");
                pairs.push((key, joined));
                pairs.push((mode_key, mode.as_str().to_string()));
            }
        }

        pairs
    }

    pub fn is_filtered(&self) -> bool {
        *self
            != Self {
                page: self.page,
                ..Self::default()
            }
    }
}

/// One user edit to the filter selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterAction {
    SetSearch(String),
    SetRequirementSearch(String),
    SetScoreRange(Option<i32>, Option<i32>),
    SetGrantRange(Option<i32>, Option<i32>),
    SetEmailOnly(bool),
    ToggleDepartment(String),
    SetDepartmentMode(FilterMode),
    ToggleSubDepartment(String),
    SetSubDepartmentMode(FilterMode),
    TogglePosition(String),
    SetPositionMode(FilterMode),
    Clear,
    SetPage(u32),
    NextPage,
    PreviousPage,
}

impl FilterAction {
    /// Free-text edits arrive per keystroke and are worth debouncing.
    pub fn is_text_edit(&self) -> bool {
        matches!(
            self,
            FilterAction::SetSearch(_) | FilterAction::SetRequirementSearch(_)
        )
    }

    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            FilterAction::SetPage(_) | FilterAction::NextPage | FilterAction::PreviousPage
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ListingState {
    #[default]
    Idle,
    Loading,
    Loaded(ScholarPage),
    /// Every failure collapses into one connection error.
    Error,
}

pub struct ClientStore {
    storage: Arc<dyn KeyValueStorage>,
    sequencer: RequestSequencer,
    hydrated: bool,
    filters: FilterSelection,
    saved: BTreeSet<String>,
    copied: BTreeSet<String>,
    prompt_copied: BTreeSet<String>,
    mailed: BTreeSet<String>,
    profile: UserProfile,
    custom_prompt: String,
    use_custom_prompt: bool,
    disclaimer_accepted: bool,
    listing: ListingState,
    filter_options: FilterOptions,
    selected: Option<ScholarRecord>,
}

impl ClientStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>) -> Self {
        Self {
            storage,
            sequencer: RequestSequencer::default(),
            hydrated: false,
            filters: FilterSelection::default(),
            saved: BTreeSet::new(),
            copied: BTreeSet::new(),
            prompt_copied: BTreeSet::new(),
            mailed: BTreeSet::new(),
            profile: UserProfile::default(),
            custom_prompt: String::new(),
            use_custom_prompt: false,
            disclaimer_accepted: false,
            listing: ListingState::Idle,
            filter_options: FilterOptions::default(),
            selected: None,
        }
    }

    /// Loads every persisted key, then unlocks persistence.
    pub fn hydrate(&mut self) {
        self.filters = self.load(storage::FILTERS);
        self.filters.page = self.filters.page.max(1);
        self.saved = self.load(storage::SAVED_LIST);
        self.copied = self.load(storage::COPIED_IDS);
        self.prompt_copied = self.load(storage::PROMPT_COPIED_IDS);
        self.mailed = self.load(storage::MAILED_IDS);
        self.profile = self.load(storage::USER_PROFILE);
        self.custom_prompt = self.load(storage::CUSTOM_PROMPT);
        self.use_custom_prompt = self.load(storage::USE_CUSTOM_PROMPT);
        self.disclaimer_accepted = self.load(storage::DISCLAIMER_ACCEPTED);
        self.hydrated = true;
        debug!(saved = self.saved.len(), "client state hydrated");
    }

    fn load<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        let Some(raw) = self.storage.get(key) else {
            return T::default();
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(key, error = %e, "ignoring unreadable local storage value");
            T::default()
        })
    }

    fn persist<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> AppResult<()> {
        if !self.hydrated {
            debug!(key, "skipping persist before hydration");
            return Ok(());
        }
        self.storage.set(key, serde_json::to_string(value)?)
    }

    pub fn filters(&self) -> &FilterSelection {
        &self.filters
    }

    /// Applies a filter edit. Anything but page navigation returns to page 1.
    /// Returns whether the selection changed.
    pub fn dispatch(&mut self, action: FilterAction) -> bool {
        let before = self.filters.clone();
        let navigation = action.is_navigation();
        let filters = &mut self.filters;

        match action {
            FilterAction::SetSearch(text) => filters.search = text,
            FilterAction::SetRequirementSearch(text) => filters.req_search = text,
            FilterAction::SetScoreRange(min, max) => {
                filters.min_score = min;
                filters.max_score = max;
            }
            FilterAction::SetGrantRange(min, max) => {
                filters.min_grants = min;
                filters.max_grants = max;
            }
            FilterAction::SetEmailOnly(on) => filters.email_only = on,
            FilterAction::ToggleDepartment(code) => {
                if !filters.depts.remove(&code) {
                    filters.depts.insert(code);
                } else {
                    let remaining = &filters.depts;
                    filters.sub_depts.retain(|sub| {
                        !under_primary(sub, &code)
                            || remaining.iter().any(|other| under_primary(sub, other))
                    });
                }
            }
            FilterAction::SetDepartmentMode(mode) => filters.dept_mode = mode,
            FilterAction::ToggleSubDepartment(department) => toggle(&mut filters.sub_depts, department),
            FilterAction::SetSubDepartmentMode(mode) => filters.sub_dept_mode = mode,
            FilterAction::TogglePosition(position) => toggle(&mut filters.positions, position),
            FilterAction::SetPositionMode(mode) => filters.pos_mode = mode,
            FilterAction::Clear => *filters = FilterSelection::default(),
            FilterAction::SetPage(page) => filters.page = page.max(1),
            FilterAction::NextPage => filters.page = filters.page.saturating_add(1),
            FilterAction::PreviousPage => filters.page = filters.page.saturating_sub(1).max(1),
        }

        if !navigation && self.filters != before {
            self.filters.page = 1;
        }

        self.filters != before
    }

    /// Marks a listing request as issued and persists the filters it uses.
    /// The returned ticket must accompany the response.
    pub fn begin_listing(&mut self) -> AppResult<(u64, FilterSelection)> {
        let ticket = self.sequencer.issue();
        self.listing = ListingState::Loading;
        self.persist(storage::FILTERS, &self.filters)?;
        Ok((ticket, self.filters.clone()))
    }

    /// Writes the current selection without issuing a fetch, for edits whose
    /// debounced fetch never ran.
    pub fn save_filters(&self) -> AppResult<()> {
        self.persist(storage::FILTERS, &self.filters)
    }

    /// Applies a listing response unless a newer request has been issued
    /// since. Returns whether it was applied.
    pub fn complete_listing<E: std::fmt::Display>(
        &mut self,
        ticket: u64,
        result: Result<ScholarPage, E>,
    ) -> bool {
        if !self.sequencer.is_latest(ticket) {
            debug!(ticket, latest = self.sequencer.latest(), "discarding stale listing response");
            return false;
        }

        self.listing = match result {
            Ok(page) => ListingState::Loaded(page),
            Err(e) => {
                warn!(error = %e, "listing request failed");
                ListingState::Error
            }
        };
        true
    }

    pub fn listing(&self) -> &ListingState {
        &self.listing
    }

    pub fn set_filter_options(&mut self, options: FilterOptions) {
        self.filter_options = options;
    }

    pub fn filter_options(&self) -> &FilterOptions {
        &self.filter_options
    }

    /// Sub-department values offered under the selected primary departments.
    pub fn reachable_sub_departments(&self) -> Vec<&str> {
        self.filter_options
            .departments
            .iter()
            .filter(|department| {
                self.filters
                    .depts
                    .iter()
                    .any(|code| under_primary(department, code))
            })
            .map(String::as_str)
            .collect()
    }

    pub fn select(&mut self, record: ScholarRecord) {
        self.selected = Some(record);
    }

    pub fn selected(&self) -> Option<&ScholarRecord> {
        self.selected.as_ref()
    }

    pub fn close_detail(&mut self) {
        self.selected = None;
    }

    /// Flips saved-list membership and returns whether the id is now saved.
    pub fn toggle_saved(&mut self, id: &str) -> AppResult<bool> {
        let saved = if self.saved.remove(id) {
            false
        } else {
            self.saved.insert(id.to_string());
            true
        };
        self.persist(storage::SAVED_LIST, &self.saved)?;
        Ok(saved)
    }

    pub fn is_saved(&self, id: &str) -> bool {
        self.saved.contains(id)
    }

    pub fn saved_ids(&self) -> Vec<String> {
        self.saved.iter().cloned().collect()
    }

    pub fn clear_saved(&mut self) -> AppResult<()> {
        self.saved.clear();
        if !self.hydrated {
            return Ok(());
        }
        self.storage.remove(storage::SAVED_LIST)
    }

    pub fn mark_copied(&mut self, id: &str) -> AppResult<()> {
        if self.copied.insert(id.to_string()) {
            self.persist(storage::COPIED_IDS, &self.copied)?;
        }
        Ok(())
    }

    pub fn mark_prompt_copied(&mut self, id: &str) -> AppResult<()> {
        if self.prompt_copied.insert(id.to_string()) {
            self.persist(storage::PROMPT_COPIED_IDS, &self.prompt_copied)?;
        }
        Ok(())
    }

    pub fn mark_mailed(&mut self, id: &str) -> AppResult<()> {
        if self.mailed.insert(id.to_string()) {
            self.persist(storage::MAILED_IDS, &self.mailed)?;
        }
        Ok(())
    }

    pub fn is_copied(&self, id: &str) -> bool {
        self.copied.contains(id)
    }

    pub fn is_prompt_copied(&self, id: &str) -> bool {
        self.prompt_copied.contains(id)
    }

    pub fn is_mailed(&self, id: &str) -> bool {
        self.mailed.contains(id)
    }

    pub fn profile(&self) -> &UserProfile {
        &self.profile
    }

    pub fn set_profile(&mut self, profile: UserProfile) -> AppResult<()> {
        self.profile = profile;
        self.persist(storage::USER_PROFILE, &self.profile)
    }

    pub fn set_custom_prompt(&mut self, text: String) -> AppResult<()> {
        self.custom_prompt = text;
        self.persist(storage::CUSTOM_PROMPT, &self.custom_prompt)
    }

    pub fn set_use_custom_prompt(&mut self, on: bool) -> AppResult<()> {
        self.use_custom_prompt = on;
        self.persist(storage::USE_CUSTOM_PROMPT, &self.use_custom_prompt)
    }

    /// The stored custom text when custom mode is on, the stock template otherwise.
    pub fn prompt_source(&self) -> PromptSource<'_> {
        if self.use_custom_prompt {
            PromptSource::Custom(&self.custom_prompt)
        } else {
            PromptSource::Template(DEFAULT_TEMPLATE)
        }
    }

    pub fn disclaimer_accepted(&self) -> bool {
        self.disclaimer_accepted
    }

    pub fn accept_disclaimer(&mut self) -> AppResult<()> {
        self.disclaimer_accepted = true;
        self.persist(storage::DISCLAIMER_ACCEPTED, &true)
    }
}

fn toggle(set: &mut BTreeSet<String>, value: String) {
    if !set.remove(&value) {
        set.insert(value);
    }
}
