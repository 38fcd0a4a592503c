use chrono::{DateTime, Days, Local, NaiveDate};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::database::{DatabaseError, TaskLookup};
use crate::filter::FilterError;
use crate::models::{StartBucket, Task};
use crate::utils;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error(
        "Could not confirm task {id} moved to {expected} (last seen: start={}, start date={})",
        describe_start(.last_start),
        describe_date(.last_start_date)
    )]
    VerificationTimeout {
        id: String,
        expected: String,
        last_start: Option<StartBucket>,
        last_start_date: Option<NaiveDate>,
    },
    #[error("Task {id} is a repeating task; Things does not allow rescheduling it from outside the app")]
    RepeatingTaskNotUpdatable { id: String },
    #[error("Task {id} is scheduled for {start_date}; evening only applies to today (pass --allow-non-today to override)")]
    EveningRequiresToday { id: String, start_date: NaiveDate },
    #[error("Created task '{title}' did not appear in the Things database")]
    CreatedTaskNotFound { title: String },
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

fn describe_start(start: &Option<StartBucket>) -> String {
    start.map_or_else(|| "unknown".to_string(), |s| s.to_string())
}

fn describe_date(date: &Option<NaiveDate>) -> String {
    date.map_or_else(|| "none".to_string(), |d| d.to_string())
}

/// Scheduling target for a `when` change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
    Today,
    Tomorrow,
    Evening,
    Inbox,
    Anytime,
    Someday,
    Date(NaiveDate),
}

impl When {
    pub fn parse(value: &str) -> Result<Self, FilterError> {
        let trimmed = value.trim();
        let when = match trimmed.to_lowercase().as_str() {
            "today" => When::Today,
            "tomorrow" => When::Tomorrow,
            "evening" | "this evening" => When::Evening,
            "inbox" => When::Inbox,
            "anytime" => When::Anytime,
            "someday" => When::Someday,
            _ => utils::parse_date(trimmed)
                .map(When::Date)
                .map_err(|_| FilterError::InvalidDate {
                    value: value.to_string(),
                })?,
        };
        Ok(when)
    }

    /// Value for the `when` URL parameter
    pub fn as_param(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            When::Today => f.write_str("today"),
            When::Tomorrow => f.write_str("tomorrow"),
            When::Evening => f.write_str("evening"),
            When::Inbox => f.write_str("inbox"),
            When::Anytime => f.write_str("anytime"),
            When::Someday => f.write_str("someday"),
            When::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

/// Whether the stored scheduling state of `task` reflects `when`
pub fn when_matches(task: &Task, when: &When, today: NaiveDate) -> bool {
    match when {
        When::Today | When::Evening => task.start_date == Some(today),
        When::Tomorrow => task.start_date.is_some() && task.start_date == today.checked_add_days(Days::new(1)),
        When::Date(date) => task.start_date == Some(*date),
        When::Inbox => task.start == StartBucket::Inbox,
        When::Anytime => task.start == StartBucket::Anytime && task.start_date.is_none(),
        When::Someday => task.start == StartBucket::Someday && task.start_date.is_none(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(200),
            timeout: Duration::from_secs(4),
        }
    }
}

/// Poll until the snapshot shows `when` applied to `id`, or the policy's
/// timeout passes.
pub fn verify_when_applied<L>(
    lookup: &L,
    id: &str,
    when: &When,
    policy: &VerifyPolicy,
) -> Result<(), VerifyError>
where
    L: TaskLookup + ?Sized,
{
    let deadline = Instant::now() + policy.timeout;
    let mut last: Option<Task> = None;
    let mut polls = 0u32;

    loop {
        polls += 1;
        match lookup.task_by_id(id) {
            Ok(task) => {
                if when_matches(&task, when, utils::today()) {
                    debug!(id, polls, %when, "scheduling change confirmed");
                    return Ok(());
                }
                last = Some(task);
            }
            Err(DatabaseError::NotFound { .. }) => {
                debug!(id, polls, "task vanished while verifying; treating as applied");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(policy.interval.min(deadline - now));
    }

    debug!(id, polls, %when, "verification timed out");
    match last {
        Some(task) if task.repeating => Err(VerifyError::RepeatingTaskNotUpdatable { id: id.to_string() }),
        last => Err(VerifyError::VerificationTimeout {
            id: id.to_string(),
            expected: when.to_string(),
            last_start: last.as_ref().map(|task| task.start),
            last_start_date: last.and_then(|task| task.start_date),
        }),
    }
}

/// Evening only makes sense for tasks that are unscheduled or already on today
pub fn guard_evening(task: &Task, today: NaiveDate, allow_non_today: bool) -> Result<(), VerifyError> {
    match task.start_date {
        Some(date) if date != today && !allow_non_today => Err(VerifyError::EveningRequiresToday {
            id: task.uuid.clone(),
            start_date: date,
        }),
        _ => Ok(()),
    }
}

/// Poll for a freshly added task by exact title, newest match first
pub fn await_created<F>(
    mut find: F,
    title: &str,
    since: DateTime<Local>,
    policy: &VerifyPolicy,
) -> Result<Task, VerifyError>
where
    F: FnMut(&str, DateTime<Local>) -> Result<Vec<Task>, DatabaseError>,
{
    let deadline = Instant::now() + policy.timeout;
    loop {
        if let Some(task) = find(title, since)?.into_iter().next() {
            debug!(id = %task.uuid, title, "created task located");
            return Ok(task);
        }
        let now = Instant::now();
        if now >= deadline {
            return Err(VerifyError::CreatedTaskNotFound {
                title: title.to_string(),
            });
        }
        thread::sleep(policy.interval.min(deadline - now));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    fn fast() -> VerifyPolicy {
        VerifyPolicy {
            interval: Duration::from_millis(5),
            timeout: Duration::from_millis(40),
        }
    }

    struct Fixed(Task);

    impl TaskLookup for Fixed {
        fn task_by_id(&self, _id: &str) -> Result<Task, DatabaseError> {
            Ok(self.0.clone())
        }
    }

    struct Missing;

    impl TaskLookup for Missing {
        fn task_by_id(&self, id: &str) -> Result<Task, DatabaseError> {
            Err(DatabaseError::NotFound { id: id.to_string() })
        }
    }

    #[test]
    fn parse_accepts_buckets_and_dates() {
        assert_eq!(When::parse("Today").unwrap(), When::Today);
        assert_eq!(
            When::parse("2025-04-01").unwrap(),
            When::Date(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap())
        );
        assert!(matches!(When::parse("soon"), Err(FilterError::InvalidDate { .. })));
    }

    #[test]
    fn when_matches_compares_dates_and_buckets() {
        let mut task = Task::new("A", "a");
        assert!(when_matches(&task, &When::Inbox, today()));
        assert!(!when_matches(&task, &When::Today, today()));

        task.start = StartBucket::Anytime;
        task.start_date = Some(today());
        assert!(when_matches(&task, &When::Today, today()));
        assert!(when_matches(&task, &When::Evening, today()));
        assert!(!when_matches(&task, &When::Anytime, today()));

        task.start_date = today().succ_opt();
        assert!(when_matches(&task, &When::Tomorrow, today()));
        assert!(when_matches(&task, &When::Date(today().succ_opt().unwrap()), today()));

        task.start = StartBucket::Someday;
        task.start_date = None;
        assert!(when_matches(&task, &When::Someday, today()));
        assert!(!when_matches(&task, &When::Tomorrow, today()));
    }

    #[test]
    fn timeout_carries_last_observed_state() {
        let mut task = Task::new("A", "a");
        task.start = StartBucket::Someday;
        task.start_date = NaiveDate::from_ymd_opt(2000, 1, 1);
        let err = verify_when_applied(&Fixed(task), "A", &When::Today, &fast()).unwrap_err();
        match err {
            VerifyError::VerificationTimeout {
                id,
                expected,
                last_start,
                last_start_date,
            } => {
                assert_eq!(id, "A");
                assert_eq!(expected, "today");
                assert_eq!(last_start, Some(StartBucket::Someday));
                assert_eq!(last_start_date, NaiveDate::from_ymd_opt(2000, 1, 1));
            }
            other => panic!("unexpected: {other}"),
        }
    }

    #[test]
    fn repeating_task_timeout_is_reported_as_not_updatable() {
        let mut task = Task::new("R", "repeat");
        task.repeating = true;
        assert!(matches!(
            verify_when_applied(&Fixed(task), "R", &When::Someday, &fast()),
            Err(VerifyError::RepeatingTaskNotUpdatable { .. })
        ));
    }

    #[test]
    fn vanished_task_counts_as_applied() {
        assert!(verify_when_applied(&Missing, "gone", &When::Today, &fast()).is_ok());
    }

    #[test]
    fn immediate_match_returns_ok() {
        let task = Task::new("I", "inbox task");
        assert!(verify_when_applied(&Fixed(task), "I", &When::Inbox, &fast()).is_ok());
    }

    #[test]
    fn guard_evening_blocks_other_days_unless_overridden() {
        let mut task = Task::new("E", "e");
        assert!(guard_evening(&task, today(), false).is_ok());
        task.start_date = Some(today());
        assert!(guard_evening(&task, today(), false).is_ok());
        task.start_date = today().succ_opt();
        assert!(matches!(
            guard_evening(&task, today(), false),
            Err(VerifyError::EveningRequiresToday { .. })
        ));
        assert!(guard_evening(&task, today(), true).is_ok());
    }

    #[test]
    fn await_created_polls_until_found() {
        let calls = Cell::new(0);
        let found = await_created(
            |title, _since| {
                calls.set(calls.get() + 1);
                if calls.get() < 3 {
                    Ok(Vec::new())
                } else {
                    Ok(vec![Task::new("NEW", title)])
                }
            },
            "Water plants",
            Local::now(),
            &VerifyPolicy {
                interval: Duration::from_millis(1),
                timeout: Duration::from_secs(2),
            },
        )
        .unwrap();
        assert_eq!(found.uuid, "NEW");
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn await_created_gives_up_after_timeout() {
        let err = await_created(|_, _| Ok(Vec::new()), "Ghost", Local::now(), &fast()).unwrap_err();
        assert!(matches!(err, VerifyError::CreatedTaskNotFound { .. }));
    }
}
