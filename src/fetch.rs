use tracing::debug;

use crate::database::{DatabaseError, Store};
use crate::filter::{FilterError, StatusFilter, TaskFilter, TaskQueryOptions};
use crate::models::{Task, TaskType};
use crate::sort;

/// Run a task query end to end: compile, fetch, filter, sort, page.
///
/// `fetch` is the store read to run (plain listing, created-between,
/// completed-between). When the request needs a rich query, a sort, an
/// offset or `force_post`, the read runs without a limit and the rest
/// happens in memory; otherwise the limit goes straight to SQLite.
pub fn fetch_tasks<F>(
    store: &Store,
    options: &TaskQueryOptions,
    default_status: StatusFilter,
    force_post: bool,
    types: &[TaskType],
    fetch: F,
) -> Result<Vec<Task>, FilterError>
where
    F: FnOnce(&Store, &TaskFilter) -> Result<Vec<Task>, DatabaseError>,
{
    let compiled = options.compile(store, default_status, types)?;
    let post = force_post || compiled.rich.is_some() || !compiled.sort.is_empty() || compiled.offset > 0;
    debug!(post, offset = compiled.offset, limit = compiled.limit, "fetching tasks");

    if !post {
        return Ok(fetch(store, &compiled.filter)?);
    }

    let mut filter = compiled.filter;
    filter.limit = None;
    let mut tasks = fetch(store, &filter)?;
    if !types.is_empty() {
        tasks.retain(|task| types.contains(&task.task_type));
    }
    if let Some(rich) = &compiled.rich {
        tasks.retain(|task| rich.matches(task));
    }
    sort::sort_tasks(&mut tasks, &compiled.sort);
    Ok(page(tasks, compiled.offset, compiled.limit))
}

/// Slice `[offset, offset + limit)`; a zero limit keeps everything after offset
pub fn page(tasks: Vec<Task>, offset: usize, limit: usize) -> Vec<Task> {
    let rest = tasks.into_iter().skip(offset);
    if limit == 0 {
        rest.collect()
    } else {
        rest.take(limit).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tasks(n: usize) -> Vec<Task> {
        (0..n).map(|i| Task::new(format!("T{i}"), format!("task {i}"))).collect()
    }

    #[test]
    fn page_slices_offset_and_limit() {
        let ids: Vec<String> = page(tasks(5), 1, 2).into_iter().map(|t| t.uuid).collect();
        assert_eq!(ids, vec!["T1", "T2"]);
    }

    #[test]
    fn zero_limit_is_unlimited() {
        assert_eq!(page(tasks(5), 2, 0).len(), 3);
        assert!(page(tasks(2), 5, 1).is_empty());
    }
}
