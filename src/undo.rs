use tracing::debug;

use crate::action_log::{ActionEntry, ActionItem, ActionKind};
use crate::models::Status;
use crate::things::{AddOptions, ChannelError, Dispatch, UpdateOptions};

pub const RESTORED_ARE_NEW_WARNING: &str =
    "restored tasks are new items; trashed originals remain in Trash.";
pub const CANNOT_UNCOMPLETE_WARNING: &str =
    "Things URL scheme cannot un-complete tasks; some items may remain completed.";

/// Dispatches that invert a logged action, in logged order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndoPlan {
    pub kind: ActionKind,
    pub dispatches: Vec<Dispatch>,
    pub warnings: Vec<String>,
}

/// Build the inverse of `entry`. Updates are keyed by the original IDs and
/// need an auth token; trashed tasks come back as new tasks.
pub fn plan_undo(entry: &ActionEntry, auth_token: Option<&str>) -> Result<UndoPlan, ChannelError> {
    let plan = match entry.kind {
        ActionKind::Trash => UndoPlan {
            kind: entry.kind,
            dispatches: entry.items.iter().map(|item| Dispatch::Add(restore(item))).collect(),
            warnings: vec![RESTORED_ARE_NEW_WARNING.to_string()],
        },
        ActionKind::Update => {
            let token = auth_token
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .ok_or(ChannelError::MissingAuthToken)?;
            let mut warnings = Vec::new();
            if entry.items.iter().any(|item| item.status == Status::Incomplete) {
                warnings.push(CANNOT_UNCOMPLETE_WARNING.to_string());
            }
            UndoPlan {
                kind: entry.kind,
                dispatches: entry
                    .items
                    .iter()
                    .map(|item| Dispatch::Update(reapply(item, token)))
                    .collect(),
                warnings,
            }
        }
    };
    debug!(kind = ?plan.kind, dispatches = plan.dispatches.len(), "planned undo");
    Ok(plan)
}

fn restore(item: &ActionItem) -> AddOptions {
    AddOptions {
        title: item.title.clone(),
        notes: Some(item.notes.clone()).filter(|notes| !notes.is_empty()),
        when: when_for(item),
        deadline: item.deadline.map(|d| d.format("%Y-%m-%d").to_string()),
        tags: item.tags.clone(),
        list_id: list_for(item),
        heading: item.heading.clone(),
        ..AddOptions::default()
    }
}

fn reapply(item: &ActionItem, token: &str) -> UpdateOptions {
    UpdateOptions {
        id: item.id.clone(),
        auth_token: token.to_string(),
        title: Some(item.title.clone()),
        notes: Some(item.notes.clone()),
        when: when_for(item),
        deadline: Some(
            item.deadline
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        ),
        tags: Some(item.tags.clone()),
        list_id: list_for(item),
        heading: item.heading.clone(),
        completed: (item.status == Status::Completed).then_some(true),
        canceled: (item.status == Status::Canceled).then_some(true),
        ..UpdateOptions::default()
    }
}

/// Start date if set, else the bucket name
fn when_for(item: &ActionItem) -> Option<String> {
    let when = match item.start_date {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => item.start.label().to_string(),
    };
    Some(when)
}

fn list_for(item: &ActionItem) -> Option<String> {
    item.project_id.clone().or_else(|| item.area_id.clone())
}
