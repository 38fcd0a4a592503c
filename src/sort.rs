use std::cmp::Ordering;

use crate::filter::FilterError;
use crate::models::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Created,
    Modified,
    Deadline,
    Start,
    Title,
    Project,
    Area,
    Heading,
    Status,
    Uuid,
    Index,
    TodayIndex,
}

impl SortField {
    pub fn parse(name: &str) -> Option<Self> {
        let field = match name.trim().to_lowercase().as_str() {
            "created" => SortField::Created,
            "modified" => SortField::Modified,
            "deadline" | "due" => SortField::Deadline,
            "start" => SortField::Start,
            "title" => SortField::Title,
            "project" => SortField::Project,
            "area" => SortField::Area,
            "heading" => SortField::Heading,
            "status" => SortField::Status,
            "uuid" | "id" => SortField::Uuid,
            "index" => SortField::Index,
            "today-index" | "today_index" | "today_idx" => SortField::TodayIndex,
            _ => return None,
        };
        Some(field)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

/// Parse `created,-deadline,title`. A leading `-` sorts that key descending.
pub fn parse_sort_spec(spec: &str) -> Result<Vec<SortKey>, FilterError> {
    spec.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (name, descending) = match part.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (part.strip_prefix('+').unwrap_or(part), false),
            };
            SortField::parse(name)
                .map(|field| SortKey { field, descending })
                .ok_or_else(|| FilterError::InvalidQuery(format!("unknown sort field '{name}'")))
        })
        .collect()
}

/// Stable multi-key sort with UUID as the final tiebreaker.
///
/// Missing dates and empty strings sort after every present value no matter
/// the direction.
pub fn sort_tasks(tasks: &mut [Task], keys: &[SortKey]) {
    tasks.sort_by(|a, b| {
        keys.iter()
            .map(|key| compare_by(a, b, *key))
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| a.uuid.cmp(&b.uuid))
    });
}

fn compare_by(a: &Task, b: &Task, key: SortKey) -> Ordering {
    let desc = key.descending;
    match key.field {
        SortField::Created => present_first(a.created, b.created, desc),
        SortField::Modified => present_first(a.modified, b.modified, desc),
        SortField::Deadline => present_first(a.deadline, b.deadline, desc),
        SortField::Start => present_first(a.start_date, b.start_date, desc),
        SortField::Title => present_first(folded(&a.title), folded(&b.title), desc),
        SortField::Project => present_first(
            folded_opt(&a.project_title),
            folded_opt(&b.project_title),
            desc,
        ),
        SortField::Area => present_first(folded_opt(&a.area_title), folded_opt(&b.area_title), desc),
        SortField::Heading => present_first(
            folded_opt(&a.heading_title),
            folded_opt(&b.heading_title),
            desc,
        ),
        SortField::Status => directed(a.status.code().cmp(&b.status.code()), desc),
        SortField::Uuid => directed(a.uuid.cmp(&b.uuid), desc),
        SortField::Index => directed(a.index.cmp(&b.index), desc),
        SortField::TodayIndex => directed(
            a.today_index.unwrap_or(0).cmp(&b.today_index.unwrap_or(0)),
            desc,
        ),
    }
}

fn directed(ordering: Ordering, descending: bool) -> Ordering {
    if descending { ordering.reverse() } else { ordering }
}

fn present_first<T: Ord>(a: Option<T>, b: Option<T>, descending: bool) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => directed(a.cmp(&b), descending),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn folded(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_lowercase())
}

fn folded_opt(value: &Option<String>) -> Option<String> {
    value.as_deref().and_then(folded)
}
