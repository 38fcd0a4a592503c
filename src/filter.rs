use chrono::{DateTime, Local, NaiveDate};
use std::fmt;
use thiserror::Error;
use tracing::debug;

use crate::database::{DatabaseError, Store};
use crate::models::{StartBucket, Status, Task, TaskType};
use crate::query::RichQuery;
use crate::sort::{self, SortKey};
use crate::utils;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),
    #[error("Invalid date '{value}' (expected YYYY-MM-DD or a timestamp)")]
    InvalidDate { value: String },
    #[error("Conflicting selectors: {reason}")]
    ConflictingSelectors { reason: &'static str },
    #[error("No tasks selected: pass --id or at least one filter")]
    MissingSelector,
    #[error("Unknown {kind}: {value}")]
    UnknownSelector { kind: &'static str, value: String },
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Incomplete,
    Completed,
    Canceled,
    Any,
}

impl StatusFilter {
    pub fn parse(value: &str) -> Result<Self, FilterError> {
        match value.trim().to_lowercase().as_str() {
            "incomplete" | "open" => Ok(StatusFilter::Incomplete),
            "completed" | "done" => Ok(StatusFilter::Completed),
            "canceled" | "cancelled" => Ok(StatusFilter::Canceled),
            "any" | "all" => Ok(StatusFilter::Any),
            other => Err(FilterError::InvalidQuery(format!(
                "unknown status '{other}' (expected incomplete, completed, canceled or any)"
            ))),
        }
    }

    /// The stored status this filter pins, or None for any
    pub fn status(self) -> Option<Status> {
        match self {
            StatusFilter::Incomplete => Some(Status::Incomplete),
            StatusFilter::Completed => Some(Status::Completed),
            StatusFilter::Canceled => Some(Status::Canceled),
            StatusFilter::Any => None,
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status() {
            Some(status) => write!(f, "{status}"),
            None => f.write_str("any"),
        }
    }
}

/// Query options as the user passed them.
///
/// Every selector is `Some` only when the flag was given, so "explicitly
/// set" can be told apart from "left at its default". The status default
/// belongs to the command and is passed separately.
#[derive(Debug, Clone, Default)]
pub struct TaskQueryOptions {
    pub status: Option<String>,
    pub project: Option<String>,
    pub area: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
    pub query: Option<String>,
    pub created_before: Option<String>,
    pub created_after: Option<String>,
    pub modified_before: Option<String>,
    pub modified_after: Option<String>,
    pub due_before: Option<String>,
    pub start_before: Option<String>,
    pub has_url: Option<bool>,
    pub include_trashed: bool,
    pub all: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub sort: Option<String>,
}

impl TaskQueryOptions {
    /// True when any filter flag was given. Paging and sort are not selectors.
    pub fn has_explicit_selector(&self) -> bool {
        let strings = [
            &self.status,
            &self.project,
            &self.area,
            &self.tag,
            &self.search,
            &self.query,
            &self.created_before,
            &self.created_after,
            &self.modified_before,
            &self.modified_after,
            &self.due_before,
            &self.start_before,
        ];
        strings.iter().any(|value| value.is_some())
            || self.has_url.is_some()
            || self.include_trashed
            || self.all
    }

    pub fn effective_status(&self, default_status: StatusFilter) -> Result<StatusFilter, FilterError> {
        if self.all {
            return Ok(StatusFilter::Any);
        }
        match &self.status {
            Some(status) => StatusFilter::parse(status),
            None => Ok(default_status),
        }
    }

    fn rich_query(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    /// Compile the options against the store, resolving container selectors
    pub fn compile(
        &self,
        store: &Store,
        default_status: StatusFilter,
        types: &[TaskType],
    ) -> Result<CompiledQuery, FilterError> {
        let today = utils::today();
        let mut filter = TaskFilter {
            status: self.effective_status(default_status)?.status(),
            include_trashed: self.include_trashed || self.all,
            types: types.to_vec(),
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            created_before: parse_instant(self.created_before.as_deref())?,
            created_after: parse_instant(self.created_after.as_deref())?,
            modified_before: parse_instant(self.modified_before.as_deref())?,
            modified_after: parse_instant(self.modified_after.as_deref())?,
            due_before: parse_day(self.due_before.as_deref())?,
            start_before: parse_day(self.start_before.as_deref())?,
            has_url: self.has_url,
            limit: self.limit.filter(|limit| *limit > 0),
            ..TaskFilter::default()
        };

        if let Some(project) = &self.project {
            let id = store.resolve_project(project)?.ok_or_else(|| FilterError::UnknownSelector {
                kind: "project",
                value: project.clone(),
            })?;
            filter.project_id = Some(id);
        }
        if let Some(area) = &self.area {
            let id = store.resolve_area(area)?.ok_or_else(|| FilterError::UnknownSelector {
                kind: "area",
                value: area.clone(),
            })?;
            filter.area_id = Some(id);
        }
        if let Some(tag) = &self.tag {
            let tags = store.resolve_tag(tag)?;
            if tags.is_empty() {
                return Err(FilterError::UnknownSelector {
                    kind: "tag",
                    value: tag.clone(),
                });
            }
            filter.tag = Some(TagSelection {
                ids: tags.iter().map(|t| t.uuid.clone()).collect(),
                titles: tags.into_iter().map(|t| t.title).collect(),
            });
        }

        let rich = self.rich_query().map(|q| RichQuery::parse(q, today)).transpose()?;
        let sort = match self.sort.as_deref() {
            Some(spec) => sort::parse_sort_spec(spec)?,
            None => Vec::new(),
        };

        debug!(
            status = ?filter.status,
            rich = rich.is_some(),
            sort_keys = sort.len(),
            "compiled task query"
        );
        Ok(CompiledQuery {
            filter,
            rich,
            sort,
            offset: self.offset.unwrap_or(0),
            limit: self.limit.unwrap_or(0),
        })
    }
}

/// Result of compiling query options: the native filter plus the residual
/// work that can only run over materialized tasks.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub filter: TaskFilter,
    pub rich: Option<RichQuery>,
    pub sort: Vec<SortKey>,
    pub offset: usize,
    /// 0 means unlimited
    pub limit: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSelection {
    pub ids: Vec<String>,
    pub titles: Vec<String>,
}

/// Native predicate over tasks. `Store` pushes it down as SQL; `matches`
/// evaluates the same predicate in memory.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<Status>,
    pub include_trashed: bool,
    pub types: Vec<TaskType>,
    pub project_id: Option<String>,
    pub area_id: Option<String>,
    pub tag: Option<TagSelection>,
    pub search: Option<String>,
    pub start: Option<StartBucket>,
    pub created_before: Option<DateTime<Local>>,
    pub created_after: Option<DateTime<Local>>,
    pub modified_before: Option<DateTime<Local>>,
    pub modified_after: Option<DateTime<Local>>,
    pub due_before: Option<NaiveDate>,
    pub start_before: Option<NaiveDate>,
    pub has_url: Option<bool>,
    pub limit: Option<usize>,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if !self.types.is_empty() && !self.types.contains(&task.task_type) {
            return false;
        }
        if self.status.is_some_and(|status| status != task.status) {
            return false;
        }
        if !self.include_trashed && task.trashed {
            return false;
        }
        if self.project_id.is_some() && task.project_id != self.project_id {
            return false;
        }
        if self.area_id.is_some() && task.area_id != self.area_id {
            return false;
        }
        if let Some(selection) = &self.tag {
            let hit = task.tags.iter().any(|tag| {
                selection
                    .titles
                    .iter()
                    .any(|wanted| wanted.eq_ignore_ascii_case(tag))
            });
            if !hit {
                return false;
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !task.title.to_lowercase().contains(&needle)
                && !task.notes.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        if let Some(start) = self.start {
            if task.start != start || (start != StartBucket::Inbox && task.start_date.is_some()) {
                return false;
            }
        }
        if !within(task.created, self.created_after, self.created_before)
            || !within(task.modified, self.modified_after, self.modified_before)
        {
            return false;
        }
        if let Some(bound) = self.due_before {
            if !task.deadline.is_some_and(|due| due < bound) {
                return false;
            }
        }
        if let Some(bound) = self.start_before {
            if !task.start_date.is_some_and(|start| start < bound) {
                return false;
            }
        }
        if let Some(has_url) = self.has_url {
            if notes_have_url(&task.notes) != has_url {
                return false;
            }
        }
        true
    }
}

/// `after` is inclusive, `before` exclusive. A missing timestamp only
/// passes when neither bound is set.
fn within(
    value: Option<DateTime<Local>>,
    after: Option<DateTime<Local>>,
    before: Option<DateTime<Local>>,
) -> bool {
    if after.is_none() && before.is_none() {
        return true;
    }
    let Some(value) = value else {
        return false;
    };
    after.is_none_or(|after| value >= after) && before.is_none_or(|before| value < before)
}

pub fn notes_have_url(notes: &str) -> bool {
    let notes = notes.to_lowercase();
    notes.contains("http://") || notes.contains("https://")
}

fn parse_instant(value: Option<&str>) -> Result<Option<DateTime<Local>>, FilterError> {
    value
        .map(|raw| {
            utils::parse_date_or_time(raw)
                .map(|(instant, _)| instant)
                .ok_or_else(|| FilterError::InvalidDate {
                    value: raw.to_string(),
                })
        })
        .transpose()
}

fn parse_day(value: Option<&str>) -> Result<Option<NaiveDate>, FilterError> {
    Ok(parse_instant(value)?.map(|instant| instant.date_naive()))
}

/// How a mutation names its targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Id(String),
    Query,
}

impl Selector {
    /// Exactly one of a direct ID or an explicit filter must be given
    pub fn resolve(id: Option<&str>, options: &TaskQueryOptions) -> Result<Selector, FilterError> {
        let id = id.map(str::trim).filter(|id| !id.is_empty());
        match (id, options.has_explicit_selector()) {
            (Some(_), true) => Err(FilterError::ConflictingSelectors {
                reason: "--id cannot be combined with filters",
            }),
            (Some(id), false) => Ok(Selector::Id(id.to_string())),
            (None, true) => Ok(Selector::Query),
            (None, false) => Err(FilterError::MissingSelector),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> TaskQueryOptions {
        TaskQueryOptions::default()
    }

    #[test]
    fn id_with_any_explicit_selector_conflicts() {
        let setters: Vec<fn(&mut TaskQueryOptions)> = vec![
            |o: &mut TaskQueryOptions| o.status = Some("incomplete".into()),
            |o: &mut TaskQueryOptions| o.project = Some("Work".into()),
            |o: &mut TaskQueryOptions| o.area = Some("Home".into()),
            |o: &mut TaskQueryOptions| o.tag = Some("urgent".into()),
            |o: &mut TaskQueryOptions| o.search = Some("milk".into()),
            |o: &mut TaskQueryOptions| o.query = Some("title:milk".into()),
            |o: &mut TaskQueryOptions| o.created_before = Some("2024-01-01".into()),
            |o: &mut TaskQueryOptions| o.modified_after = Some("2024-01-01".into()),
            |o: &mut TaskQueryOptions| o.due_before = Some("2024-01-01".into()),
            |o: &mut TaskQueryOptions| o.start_before = Some("2024-01-01".into()),
            |o: &mut TaskQueryOptions| o.has_url = Some(false),
            |o: &mut TaskQueryOptions| o.include_trashed = true,
            |o: &mut TaskQueryOptions| o.all = true,
        ];
        for set in setters {
            let mut opts = options();
            set(&mut opts);
            assert!(matches!(
                Selector::resolve(Some("ABC"), &opts),
                Err(FilterError::ConflictingSelectors { .. })
            ));
        }
    }

    #[test]
    fn explicit_default_status_still_counts_as_selector() {
        let mut opts = options();
        opts.status = Some("incomplete".into());
        assert!(opts.has_explicit_selector());
    }

    #[test]
    fn paging_and_sort_are_not_selectors() {
        let mut opts = options();
        opts.limit = Some(5);
        opts.offset = Some(2);
        opts.sort = Some("title".into());
        assert_eq!(
            Selector::resolve(Some("ABC"), &opts).unwrap(),
            Selector::Id("ABC".to_string())
        );
        assert!(matches!(
            Selector::resolve(None, &opts),
            Err(FilterError::MissingSelector)
        ));
    }

    #[test]
    fn blank_id_is_treated_as_absent() {
        let mut opts = options();
        opts.search = Some("x".into());
        assert_eq!(Selector::resolve(Some("  "), &opts).unwrap(), Selector::Query);
    }

    #[test]
    fn all_overrides_status() {
        let mut opts = options();
        opts.status = Some("completed".into());
        opts.all = true;
        assert_eq!(
            opts.effective_status(StatusFilter::Incomplete).unwrap(),
            StatusFilter::Any
        );
    }

    #[test]
    fn unknown_status_is_invalid_query() {
        assert!(matches!(
            StatusFilter::parse("finished"),
            Err(FilterError::InvalidQuery(_))
        ));
    }

    #[test]
    fn malformed_date_names_the_value() {
        let err = parse_instant(Some("31/12/2024")).unwrap_err();
        match err {
            FilterError::InvalidDate { value } => assert_eq!(value, "31/12/2024"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn matches_applies_status_trash_and_search() {
        let mut task = Task::new("A", "Buy milk");
        task.notes = "see https://shop.example".into();
        let filter = TaskFilter {
            status: Some(Status::Incomplete),
            search: Some("MILK".into()),
            has_url: Some(true),
            ..TaskFilter::default()
        };
        assert!(filter.matches(&task));

        task.trashed = true;
        assert!(!filter.matches(&task));
        task.trashed = false;
        task.status = Status::Completed;
        assert!(!filter.matches(&task));
    }

    #[test]
    fn date_bounds_are_exclusive_before_inclusive_after() {
        let day = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let mut task = Task::new("A", "a");
        task.deadline = Some(day);
        let mut filter = TaskFilter {
            due_before: Some(day),
            ..TaskFilter::default()
        };
        assert!(!filter.matches(&task));
        filter.due_before = day.succ_opt();
        assert!(filter.matches(&task));

        task.deadline = None;
        assert!(!filter.matches(&task));

        let midnight = utils::local_midnight(day).unwrap();
        task.created = Some(midnight);
        let filter = TaskFilter {
            created_after: Some(midnight),
            ..TaskFilter::default()
        };
        assert!(filter.matches(&task));
    }

    #[test]
    fn tag_selection_matches_titles_case_insensitively() {
        let mut task = Task::new("A", "a");
        task.tags = vec!["Errand".into()];
        let filter = TaskFilter {
            tag: Some(TagSelection {
                ids: vec!["T1".into()],
                titles: vec!["errand".into()],
            }),
            ..TaskFilter::default()
        };
        assert!(filter.matches(&task));
        task.tags.clear();
        assert!(!filter.matches(&task));
    }
}
