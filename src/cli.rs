use clap::{Args, Parser, Subcommand};
use std::io;
use thiserror::Error;

use crate::action_log::ActionLogError;
use crate::config::ConfigError;
use crate::database::DatabaseError;
use crate::filter::{FilterError, TaskQueryOptions};
use crate::gate::GateError;
use crate::output::{OutputFormat, Rendering};
use crate::things::ChannelError;
use crate::verify::VerifyError;

#[derive(Parser)]
#[command(name = "things")]
#[command(about = "Query and safely mutate Things 3 tasks from the terminal")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Use development mode (separate config and action log)
    #[arg(long, global = true)]
    pub dev: bool,

    /// Path to the Things database (overrides THINGSDB and config)
    #[arg(long, global = true)]
    pub db: Option<String>,

    /// Show what a mutation would do without dispatching it
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Selector flags shared by listing and mutating commands
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// incomplete, completed, canceled or any
    #[arg(long)]
    pub status: Option<String>,
    /// Project title or ID
    #[arg(long)]
    pub project: Option<String>,
    /// Area title or ID
    #[arg(long)]
    pub area: Option<String>,
    /// Tag title or ID (includes child tags)
    #[arg(long)]
    pub tag: Option<String>,
    /// Case-insensitive substring of title or notes
    #[arg(long)]
    pub search: Option<String>,
    /// Rich query, e.g. 'tag:work (due:<2025-01-01 OR title:/urgent/)'
    #[arg(short, long)]
    pub query: Option<String>,
    #[arg(long)]
    pub created_before: Option<String>,
    #[arg(long)]
    pub created_after: Option<String>,
    #[arg(long)]
    pub modified_before: Option<String>,
    #[arg(long)]
    pub modified_after: Option<String>,
    #[arg(long)]
    pub due_before: Option<String>,
    #[arg(long)]
    pub start_before: Option<String>,
    /// Only tasks whose notes contain a URL; `--has-url=false` inverts it
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    pub has_url: Option<bool>,
    #[arg(long)]
    pub include_trashed: bool,
    /// Any status, trashed included
    #[arg(long)]
    pub all: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PagingArgs {
    /// Maximum results; 0 for no limit
    #[arg(long)]
    pub limit: Option<usize>,
    #[arg(long)]
    pub offset: Option<usize>,
    /// Sort keys, e.g. 'created,-deadline,title'
    #[arg(long)]
    pub sort: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct OutputArgs {
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
    /// Shorthand for --format json
    #[arg(long)]
    pub json: bool,
    #[arg(long)]
    pub no_header: bool,
}

impl OutputArgs {
    pub fn rendering(&self) -> Rendering {
        Rendering {
            format: if self.json { OutputFormat::Json } else { self.format },
            header: !self.no_header,
        }
    }
}

impl FilterArgs {
    /// Options with only the flags the user actually passed set
    pub fn to_options(&self, paging: Option<&PagingArgs>, default_limit: usize) -> TaskQueryOptions {
        TaskQueryOptions {
            status: self.status.clone(),
            project: self.project.clone(),
            area: self.area.clone(),
            tag: self.tag.clone(),
            search: self.search.clone(),
            query: self.query.clone(),
            created_before: self.created_before.clone(),
            created_after: self.created_after.clone(),
            modified_before: self.modified_before.clone(),
            modified_after: self.modified_after.clone(),
            due_before: self.due_before.clone(),
            start_before: self.start_before.clone(),
            has_url: self.has_url,
            include_trashed: self.include_trashed,
            all: self.all,
            limit: Some(paging.and_then(|p| p.limit).unwrap_or(default_limit)),
            offset: paging.and_then(|p| p.offset),
            sort: paging.and_then(|p| p.sort.clone()),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub filter: FilterArgs,
    #[command(flatten)]
    pub paging: PagingArgs,
    #[command(flatten)]
    pub output: OutputArgs,
    /// Columns to print, e.g. 'uuid,title,deadline'
    #[arg(long)]
    pub select: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AddArgs {
    /// Task title
    pub title: String,
    #[arg(long)]
    pub notes: Option<String>,
    /// today, tomorrow, evening, anytime, someday, inbox or YYYY-MM-DD
    #[arg(long)]
    pub when: Option<String>,
    /// Deadline (YYYY-MM-DD)
    #[arg(long)]
    pub deadline: Option<String>,
    /// Comma-separated tags
    #[arg(long)]
    pub tags: Option<String>,
    /// Checklist item (repeatable)
    #[arg(long = "checklist-item")]
    pub checklist: Vec<String>,
    /// Project or area title
    #[arg(long)]
    pub list: Option<String>,
    /// Project or area ID
    #[arg(long)]
    pub list_id: Option<String>,
    #[arg(long)]
    pub heading: Option<String>,
    #[arg(long)]
    pub completed: bool,
    #[arg(long)]
    pub canceled: bool,
    /// Show the new task in Things
    #[arg(long)]
    pub reveal: bool,
    /// Copy the repeat rule of this task onto the new one
    #[arg(long)]
    pub repeat_from: Option<String>,
    #[arg(long)]
    pub allow_unsafe_title: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    /// Task ID (mutually exclusive with filter flags)
    #[arg(long)]
    pub id: Option<String>,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// New title
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long)]
    pub prepend_notes: Option<String>,
    #[arg(long)]
    pub append_notes: Option<String>,
    #[arg(long)]
    pub when: Option<String>,
    /// Move to This Evening; same as --when evening
    #[arg(long, conflicts_with = "when")]
    pub later: bool,
    #[arg(long)]
    pub deadline: Option<String>,
    #[arg(long, conflicts_with = "deadline")]
    pub clear_deadline: bool,
    /// Replace all tags (comma-separated)
    #[arg(long)]
    pub tags: Option<String>,
    /// Add tags (comma-separated)
    #[arg(long)]
    pub add_tags: Option<String>,
    /// Replace the checklist (repeatable)
    #[arg(long = "checklist-item")]
    pub checklist: Vec<String>,
    #[arg(long = "prepend-checklist-item")]
    pub prepend_checklist: Vec<String>,
    #[arg(long = "append-checklist-item")]
    pub append_checklist: Vec<String>,
    #[arg(long)]
    pub list: Option<String>,
    #[arg(long)]
    pub list_id: Option<String>,
    #[arg(long)]
    pub heading: Option<String>,
    #[arg(long)]
    pub completed: bool,
    #[arg(long, alias = "cancelled", conflicts_with = "completed")]
    pub canceled: bool,
    /// Creation date to record (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub creation_date: Option<String>,
    /// Completion date to record (YYYY-MM-DD or RFC 3339)
    #[arg(long)]
    pub completion_date: Option<String>,
    /// Duplicate the task and apply the changes to the copy
    #[arg(long)]
    pub duplicate: bool,
    /// Show the task in Things afterwards
    #[arg(long)]
    pub reveal: bool,
    /// Confirm a change that matches more than one task
    #[arg(long, short = 'y')]
    pub yes: bool,
    #[arg(long)]
    pub auth_token: Option<String>,
    /// Allow --when evening for tasks scheduled on another day
    #[arg(long)]
    pub allow_non_today: bool,
    /// Skip polling the database after a scheduling change
    #[arg(long)]
    pub no_verify: bool,
    #[arg(long)]
    pub allow_unsafe_title: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct DeleteArgs {
    /// Task ID (mutually exclusive with filter flags)
    #[arg(long)]
    pub id: Option<String>,
    #[command(flatten)]
    pub filter: FilterArgs,
    /// Confirm a delete that matches more than one task
    #[arg(long, short = 'y')]
    pub yes: bool,
    /// Repeat the task's ID or title to delete it by --id
    #[arg(long)]
    pub confirm: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct AddAreaArgs {
    /// Area title
    pub title: String,
    /// Comma-separated tags
    #[arg(long)]
    pub tags: Option<String>,
    #[arg(long)]
    pub allow_unsafe_title: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct UpdateProjectArgs {
    /// Project ID
    #[arg(long)]
    pub id: String,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
    #[arg(long)]
    pub prepend_notes: Option<String>,
    #[arg(long)]
    pub append_notes: Option<String>,
    #[arg(long)]
    pub when: Option<String>,
    #[arg(long)]
    pub deadline: Option<String>,
    #[arg(long, conflicts_with = "deadline")]
    pub clear_deadline: bool,
    /// Replace all tags (comma-separated)
    #[arg(long)]
    pub tags: Option<String>,
    /// Add tags (comma-separated)
    #[arg(long)]
    pub add_tags: Option<String>,
    /// Move to this area (title)
    #[arg(long)]
    pub area: Option<String>,
    /// Move to this area (ID)
    #[arg(long)]
    pub area_id: Option<String>,
    /// Append a to-do to the project (repeatable)
    #[arg(long = "todo")]
    pub todos: Vec<String>,
    #[arg(long)]
    pub completed: bool,
    #[arg(long, alias = "cancelled", conflicts_with = "completed")]
    pub canceled: bool,
    #[arg(long)]
    pub creation_date: Option<String>,
    #[arg(long)]
    pub completion_date: Option<String>,
    #[arg(long)]
    pub duplicate: bool,
    #[arg(long)]
    pub reveal: bool,
    #[arg(long)]
    pub auth_token: Option<String>,
    #[arg(long)]
    pub allow_unsafe_title: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct UndoArgs {
    /// Confirm undoing more than one item
    #[arg(long, short = 'y')]
    pub yes: bool,
    #[arg(long)]
    pub auth_token: Option<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RepeatArgs {
    /// Task to change
    #[arg(long)]
    pub id: String,
    /// Copy the repeat rule from this task
    #[arg(long, group = "source")]
    pub from_task: Option<String>,
    /// Read raw repeat rule bytes from a file
    #[arg(long, group = "source")]
    pub rule_file: Option<String>,
    /// Remove the repeat rule and its deadline
    #[arg(long, group = "source")]
    pub clear: bool,
    /// Deadline to set alongside the rule (YYYY-MM-DD)
    #[arg(long, conflicts_with = "clear")]
    pub deadline: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List to-dos
    #[command(alias = "todos")]
    Tasks(ListArgs),
    /// List to-dos in the Inbox
    Inbox(ListArgs),
    /// List to-dos scheduled for today or earlier
    Today(ListArgs),
    /// List unscheduled Anytime to-dos
    Anytime(ListArgs),
    /// List Someday to-dos
    Someday(ListArgs),
    /// List completed to-dos
    Logbook(ListArgs),
    /// Search titles and notes
    Search {
        text: String,
        #[command(flatten)]
        list: ListArgs,
    },
    /// List to-dos created in the last 24 hours
    Createdtoday(ListArgs),
    /// List to-dos completed today
    Logtoday(ListArgs),
    /// Show one task
    Show {
        id: String,
        #[arg(long)]
        json: bool,
    },
    /// List projects
    Projects {
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        include_trashed: bool,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List areas
    Areas {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// List tags
    Tags {
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Add a to-do
    Add(AddArgs),
    /// Add an area
    #[command(alias = "create-area")]
    AddArea(AddAreaArgs),
    /// Update to-dos by ID or filter
    Update(UpdateArgs),
    /// Update one project by ID
    UpdateProject(UpdateProjectArgs),
    /// Move to-dos to the Trash
    Delete(DeleteArgs),
    /// Undo the last delete or update
    Undo(UndoArgs),
    /// Set, copy or clear a repeat rule directly in the database
    Repeat(RepeatArgs),
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
    #[error("{0}")]
    FilterError(#[from] FilterError),
    #[error("{0}")]
    GateError(#[from] GateError),
    #[error("{0}")]
    VerifyError(#[from] VerifyError),
    #[error("{0}")]
    ActionLogError(#[from] ActionLogError),
    #[error("{0}")]
    ChannelError(#[from] ChannelError),
    #[error("Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Output error: {0}")]
    OutputError(#[from] io::Error),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
