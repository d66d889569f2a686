//! Interactive browse loop: line commands edit the filter selection, listing
//! fetches go through the debouncer and only the newest response is shown.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::client::api::ApiClient;
use crate::client::debounce::Debouncer;
use crate::client::state::{ClientStore, FilterAction, ListingState};
use crate::config::ClientConfig;
use crate::error::AppResult;
use crate::models::{FilterMode, ScholarPage, ScholarRecord};

const DISCLAIMER: &str = "Scores and requirements are AI-generated estimates. \
Verify a professor's current work before reaching out. Type `accept` to continue.";

const HELP: &str = "\
commands:
  search <text>          name/title search (empty clears)
  req <text>             requirement search
  score <min|-> <max|->  relevance score range
  grants <min|-> <max|-> active grant range
  good on|off            good matches only
  dept <CODE>            toggle primary department
  dept-mode include|exclude
  sub <DEPARTMENT>       toggle sub-department
  sub-mode include|exclude
  pos <POSITION>         toggle position
  pos-mode include|exclude
  clear | next | prev | page <n>
  open <id> | close | copy <id> | save [id] | saved | clear-saved | options
  accept | help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Filter(FilterAction),
    Open(String),
    Copy(String),
    Close,
    Save(String),
    SaveSelected,
    ClearSaved,
    Saved,
    Options,
    Accept,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let (word, rest) = line
        .split_once(char::is_whitespace)
        .map(|(word, rest)| (word, rest.trim()))
        .unwrap_or((line, ""));

    match word {
        "search" => Command::Filter(FilterAction::SetSearch(rest.to_string())),
        "req" => Command::Filter(FilterAction::SetRequirementSearch(rest.to_string())),
        "score" => {
            let (min, max) = bounds(rest);
            Command::Filter(FilterAction::SetScoreRange(min, max))
        }
        "grants" => {
            let (min, max) = bounds(rest);
            Command::Filter(FilterAction::SetGrantRange(min, max))
        }
        "good" => Command::Filter(FilterAction::SetEmailOnly(matches!(rest, "on" | "true" | "yes"))),
        "dept" if !rest.is_empty() => {
            Command::Filter(FilterAction::ToggleDepartment(rest.to_string()))
        }
        "dept-mode" => Command::Filter(FilterAction::SetDepartmentMode(FilterMode::parse(Some(rest)))),
        "sub" if !rest.is_empty() => {
            Command::Filter(FilterAction::ToggleSubDepartment(rest.to_string()))
        }
        "sub-mode" => {
            Command::Filter(FilterAction::SetSubDepartmentMode(FilterMode::parse(Some(rest))))
        }
        "pos" if !rest.is_empty() => Command::Filter(FilterAction::TogglePosition(rest.to_string())),
        "pos-mode" => Command::Filter(FilterAction::SetPositionMode(FilterMode::parse(Some(rest)))),
        "clear" => Command::Filter(FilterAction::Clear),
        "next" => Command::Filter(FilterAction::NextPage),
        "prev" => Command::Filter(FilterAction::PreviousPage),
        "page" => match rest.parse() {
            Ok(page) => Command::Filter(FilterAction::SetPage(page)),
            Err(_) => Command::Unknown(line.to_string()),
        },
        "open" if !rest.is_empty() => Command::Open(rest.to_string()),
        "copy" if !rest.is_empty() => Command::Copy(rest.to_string()),
        "close" => Command::Close,
        "save" if rest.is_empty() => Command::SaveSelected,
        "save" => Command::Save(rest.to_string()),
        "clear-saved" => Command::ClearSaved,
        "saved" => Command::Saved,
        "options" => Command::Options,
        "accept" => Command::Accept,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// `"<min> <max>"`, where `-` or anything unparsable means unbounded.
fn bounds(rest: &str) -> (Option<i32>, Option<i32>) {
    let mut parts = rest.split_whitespace().map(|part| part.parse().ok());
    (parts.next().flatten(), parts.next().flatten())
}

pub async fn run(config: &ClientConfig, api: ApiClient, store: ClientStore) -> anyhow::Result<()> {
    let store = Arc::new(Mutex::new(store));
    let api = Arc::new(api);
    let mut debouncer = Debouncer::new(config.debounce);

    if !api.health().await.unwrap_or(false) {
        println!("Connection error. Is the API running?");
    }

    {
        let mut guard = store.lock().await;
        if !guard.disclaimer_accepted() {
            println!("{DISCLAIMER}");
        }
        match api.filter_options().await {
            Ok(options) => guard.set_filter_options(options),
            Err(e) => warn!(error = %e, "could not load filter options"),
        }
    }
    debouncer.schedule_after(Duration::ZERO, fetch_listing(store.clone(), api.clone()));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        match parse_command(&line) {
            Command::Filter(action) => {
                let text_edit = action.is_text_edit();
                if store.lock().await.dispatch(action) {
                    let fetch = fetch_listing(store.clone(), api.clone());
                    if text_edit {
                        debouncer.schedule(fetch);
                    } else {
                        debouncer.schedule_after(Duration::ZERO, fetch);
                    }
                }
            }
            Command::Open(id) => match api.get(&id).await {
                Ok(record) => {
                    print_detail(&record);
                    store.lock().await.select(record);
                }
                Err(e) => println!("Could not open {id}: {e}"),
            },
            Command::Copy(id) => match api.get(&id).await {
                Ok(record) => {
                    println!("{}", record.email);
                    store.lock().await.mark_copied(&record.id)?;
                }
                Err(e) => println!("Could not copy {id}: {e}"),
            },
            Command::Close => store.lock().await.close_detail(),
            Command::Save(id) => {
                let now_saved = store.lock().await.toggle_saved(&id)?;
                println!("{id} {}", if now_saved { "saved" } else { "removed" });
            }
            Command::SaveSelected => {
                let mut guard = store.lock().await;
                match guard.selected().map(|record| record.id.clone()) {
                    Some(id) => {
                        let now_saved = guard.toggle_saved(&id)?;
                        println!("{id} {}", if now_saved { "saved" } else { "removed" });
                    }
                    None => println!("Open a scholar first, or use `save <id>`."),
                }
            }
            Command::ClearSaved => store.lock().await.clear_saved()?,
            Command::Saved => {
                let ids = store.lock().await.saved_ids();
                println!("{} saved: {}", ids.len(), ids.join(", "));
            }
            Command::Options => {
                let guard = store.lock().await;
                let options = guard.filter_options();
                println!("departments: {}", options.departments.join(" | "));
                println!("positions: {}", options.positions.join(" | "));
                let reachable = guard.reachable_sub_departments();
                if !reachable.is_empty() {
                    println!("sub-departments: {}", reachable.join(" | "));
                }
            }
            Command::Accept => store.lock().await.accept_disclaimer()?,
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
            Command::Unknown(text) => println!("Unknown command: {text} (try `help`)"),
        }
    }

    finish(&mut debouncer, &store).await?;
    Ok(())
}

/// Cancels a fetch still waiting out its delay, keeping the filter edits it
/// would have persisted.
async fn finish(debouncer: &mut Debouncer, store: &Mutex<ClientStore>) -> AppResult<()> {
    if debouncer.is_waiting() {
        debug!("saving filters of the pending listing fetch");
        store.lock().await.save_filters()?;
    }
    debouncer.cancel();
    Ok(())
}

async fn fetch_listing(store: Arc<Mutex<ClientStore>>, api: Arc<ApiClient>) {
    let issued = store.lock().await.begin_listing();
    let (ticket, filters) = match issued {
        Ok(issued) => issued,
        Err(e) => {
            warn!(error = %e, "could not persist filters");
            return;
        }
    };

    let result = api.list(&filters).await;

    let mut guard = store.lock().await;
    if guard.complete_listing(ticket, result) {
        match guard.listing() {
            ListingState::Loaded(page) => print_page(page, &guard),
            ListingState::Error => println!("Connection error. Is the API running?"),
            _ => {}
        }
    }
}

fn print_page(page: &ScholarPage, store: &ClientStore) {
    println!(
        "-- page {} of {} ({} scholars{}) --",
        page.page,
        page.total_pages.max(1),
        page.total,
        if store.filters().is_filtered() { ", filtered" } else { "" }
    );
    for card in &page.data {
        let saved = if store.is_saved(&card.id) { "*" } else { " " };
        let good = if card.should_email == crate::models::GOOD_MATCH {
            "good"
        } else {
            "    "
        };
        println!(
            "{saved} {:>3} {good} {:<30} {:<40} {} grants, {} pubs  [{}]",
            card.relevance_score,
            card.name,
            card.department,
            card.active_grants_count,
            card.publications_count,
            card.id
        );
    }
}

pub fn print_detail(record: &ScholarRecord) {
    println!("{} ({})", record.name, record.email);
    println!("{} | {} | {}", record.title, record.department, record.position);
    println!(
        "Relevance {} | good match: {}",
        record.relevance_score, record.should_email
    );
    if !record.tags.is_empty() {
        println!("Tags: {}", record.tags.join(", "));
    }
    for line in &record.reasoning {
        println!("  - {line}");
    }
    if !record.requirements.is_empty() {
        println!("Possible requirements: {}", record.requirements.join(", "));
    }
    for grant in record.active_grants.iter().chain(&record.expired_grants) {
        println!(
            "  grant [{}] {} ({}, {})",
            grant.status, grant.title, grant.funder_name, grant.duration
        );
    }
    for publication in &record.publications {
        println!("  pub {} {}", publication.date, publication.title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filter_commands() {
        assert_eq!(
            parse_command("search  machine learning "),
            Command::Filter(FilterAction::SetSearch("machine learning".to_string()))
        );
        assert_eq!(
            parse_command("score 70 -"),
            Command::Filter(FilterAction::SetScoreRange(Some(70), None))
        );
        assert_eq!(
            parse_command("dept-mode exclude"),
            Command::Filter(FilterAction::SetDepartmentMode(FilterMode::Exclude))
        );
        assert_eq!(
            parse_command("sub EG-Computer Science"),
            Command::Filter(FilterAction::ToggleSubDepartment(
                "EG-Computer Science".to_string()
            ))
        );
        assert_eq!(
            parse_command("good on"),
            Command::Filter(FilterAction::SetEmailOnly(true))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn quitting_keeps_filters_of_a_pending_fetch() {
        use crate::client::storage::{self, KeyValueStorage, MemoryStorage};

        let local = Arc::new(MemoryStorage::default());
        let mut client = ClientStore::new(local.clone());
        client.hydrate();
        client.dispatch(FilterAction::SetSearch("lee".to_string()));
        let store = Mutex::new(client);

        let mut debouncer = Debouncer::new(Duration::from_millis(400));
        debouncer.schedule(async {});
        finish(&mut debouncer, &store).await.unwrap();

        assert!(!debouncer.is_waiting());
        let saved = local.get(storage::FILTERS).unwrap();
        assert!(saved.contains(r#""search":"lee""#));
    }

    #[test]
    fn bare_search_clears_the_text() {
        assert_eq!(
            parse_command("search"),
            Command::Filter(FilterAction::SetSearch(String::new()))
        );
    }

    #[test]
    fn parses_navigation_and_session_commands() {
        assert_eq!(parse_command("page 3"), Command::Filter(FilterAction::SetPage(3)));
        assert_eq!(parse_command("open abc"), Command::Open("abc".to_string()));
        assert_eq!(parse_command("q"), Command::Quit);
        assert!(matches!(parse_command("page x"), Command::Unknown(_)));
        assert!(matches!(parse_command("dept"), Command::Unknown(_)));
        assert_eq!(parse_command("save"), Command::SaveSelected);
        assert_eq!(parse_command("save s1"), Command::Save("s1".to_string()));
    }
}
