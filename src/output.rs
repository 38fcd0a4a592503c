//! Table, JSON, JSON Lines and CSV rendering for command results.

use chrono::{DateTime, Local, NaiveDate};
use clap::ValueEnum;
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::{self, Write};

use crate::action_log::ActionItem;
use crate::filter::FilterError;
use crate::models::{Area, Project, Tag, Task};

/// Maximum width for the title column before truncation
const MAX_TITLE_WIDTH: usize = 48;

/// Maximum width for the tags column before truncation
const MAX_TAGS_WIDTH: usize = 24;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Jsonl,
    Csv,
}

#[derive(Debug, Clone, Copy)]
pub struct Rendering {
    pub format: OutputFormat,
    pub header: bool,
}

/// A task column for tables and CSV, or a key for selected JSON
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskField {
    Uuid,
    Title,
    Notes,
    Type,
    Status,
    When,
    Start,
    StartDate,
    Deadline,
    List,
    Project,
    Area,
    Heading,
    Tags,
    Created,
    Modified,
    Stopped,
    Trashed,
    Repeating,
}

impl TaskField {
    /// Columns shown when nothing is selected
    pub const DEFAULT: [TaskField; 7] = [
        TaskField::Uuid,
        TaskField::Title,
        TaskField::Status,
        TaskField::When,
        TaskField::Deadline,
        TaskField::List,
        TaskField::Tags,
    ];

    pub fn parse(name: &str) -> Option<Self> {
        let field = match name.trim().to_lowercase().replace('-', "_").as_str() {
            "uuid" | "id" => TaskField::Uuid,
            "title" => TaskField::Title,
            "notes" => TaskField::Notes,
            "type" => TaskField::Type,
            "status" => TaskField::Status,
            "when" => TaskField::When,
            "start" => TaskField::Start,
            "start_date" => TaskField::StartDate,
            "deadline" | "due" => TaskField::Deadline,
            "list" => TaskField::List,
            "project" | "project_title" => TaskField::Project,
            "area" | "area_title" => TaskField::Area,
            "heading" | "heading_title" => TaskField::Heading,
            "tags" => TaskField::Tags,
            "created" => TaskField::Created,
            "modified" => TaskField::Modified,
            "stopped" | "completed" => TaskField::Stopped,
            "trashed" => TaskField::Trashed,
            "repeating" => TaskField::Repeating,
            _ => return None,
        };
        Some(field)
    }

    pub fn name(self) -> &'static str {
        match self {
            TaskField::Uuid => "uuid",
            TaskField::Title => "title",
            TaskField::Notes => "notes",
            TaskField::Type => "type",
            TaskField::Status => "status",
            TaskField::When => "when",
            TaskField::Start => "start",
            TaskField::StartDate => "start_date",
            TaskField::Deadline => "deadline",
            TaskField::List => "list",
            TaskField::Project => "project",
            TaskField::Area => "area",
            TaskField::Heading => "heading",
            TaskField::Tags => "tags",
            TaskField::Created => "created",
            TaskField::Modified => "modified",
            TaskField::Stopped => "stopped",
            TaskField::Trashed => "trashed",
            TaskField::Repeating => "repeating",
        }
    }

    fn header(self) -> &'static str {
        match self {
            TaskField::Uuid => "UUID",
            TaskField::Title => "TITLE",
            TaskField::Notes => "NOTES",
            TaskField::Type => "TYPE",
            TaskField::Status => "STATUS",
            TaskField::When => "WHEN",
            TaskField::Start => "START",
            TaskField::StartDate => "START_DATE",
            TaskField::Deadline => "DEADLINE",
            TaskField::List => "LIST",
            TaskField::Project => "PROJECT",
            TaskField::Area => "AREA",
            TaskField::Heading => "HEADING",
            TaskField::Tags => "TAGS",
            TaskField::Created => "CREATED",
            TaskField::Modified => "MODIFIED",
            TaskField::Stopped => "STOPPED",
            TaskField::Trashed => "TRASHED",
            TaskField::Repeating => "REPEATING",
        }
    }

    /// Text for a table or CSV cell; tables truncate long titles and tags
    fn cell(self, task: &Task, today: NaiveDate, truncated: bool) -> String {
        let text = |value: &Option<String>| value.clone().unwrap_or_default();
        let stamp = |value: Option<DateTime<Local>>| {
            value.map(|dt| dt.format("%Y-%m-%d %H:%M").to_string()).unwrap_or_default()
        };
        let fit = |value: String, width: usize| if truncated { truncate(&value, width) } else { value };
        match self {
            TaskField::Uuid => task.uuid.clone(),
            TaskField::Title => fit(task.title.clone(), MAX_TITLE_WIDTH),
            TaskField::Notes => fit(task.notes.replace('\n', " "), MAX_TITLE_WIDTH),
            TaskField::Type => task.task_type.label().to_string(),
            TaskField::Status => task.status.to_string(),
            TaskField::When => when_label(task, today),
            TaskField::Start => task.start.to_string(),
            TaskField::StartDate => task.start_date.map(|d| d.to_string()).unwrap_or_default(),
            TaskField::Deadline => task.deadline.map(|d| d.to_string()).unwrap_or_default(),
            TaskField::List => task
                .project_title
                .clone()
                .or_else(|| task.area_title.clone())
                .unwrap_or_default(),
            TaskField::Project => text(&task.project_title),
            TaskField::Area => text(&task.area_title),
            TaskField::Heading => text(&task.heading_title),
            TaskField::Tags => fit(task.tags.join(", "), MAX_TAGS_WIDTH),
            TaskField::Created => stamp(task.created),
            TaskField::Modified => stamp(task.modified),
            TaskField::Stopped => stamp(task.stopped),
            TaskField::Trashed => task.trashed.to_string(),
            TaskField::Repeating => task.repeating.to_string(),
        }
    }

    fn json(self, task: &Task, today: NaiveDate) -> Value {
        let optional = |value: Option<String>| value.map_or(Value::Null, Value::String);
        match self {
            TaskField::Tags => Value::from(task.tags.clone()),
            TaskField::Trashed => Value::Bool(task.trashed),
            TaskField::Repeating => Value::Bool(task.repeating),
            TaskField::Project => optional(task.project_title.clone()),
            TaskField::Area => optional(task.area_title.clone()),
            TaskField::Heading => optional(task.heading_title.clone()),
            TaskField::StartDate => optional(task.start_date.map(|d| d.to_string())),
            TaskField::Deadline => optional(task.deadline.map(|d| d.to_string())),
            TaskField::Created => optional(task.created.map(|dt| dt.to_rfc3339())),
            TaskField::Modified => optional(task.modified.map(|dt| dt.to_rfc3339())),
            TaskField::Stopped => optional(task.stopped.map(|dt| dt.to_rfc3339())),
            other => Value::String(other.cell(task, today, false)),
        }
    }
}

/// Parse `--select uuid,title,deadline`; an empty list means the defaults
pub fn parse_select(raw: &str) -> Result<Vec<TaskField>, FilterError> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| {
            TaskField::parse(name)
                .ok_or_else(|| FilterError::InvalidQuery(format!("unknown field '{name}' in --select")))
        })
        .collect()
}

/// Truncate to `max_width` characters, adding an ellipsis if needed
fn truncate(s: &str, max_width: usize) -> String {
    if s.chars().count() <= max_width {
        s.to_string()
    } else if max_width <= 3 {
        s.chars().take(max_width).collect()
    } else {
        let mut cut: String = s.chars().take(max_width - 3).collect();
        cut.push_str("...");
        cut
    }
}

/// Align `rows` under `headers`, two spaces between columns
pub fn format_table(headers: &[&str], rows: &[Vec<String>], header: bool) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let render = |cells: Vec<&str>| {
        let line = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ");
        line.trim_end().to_string()
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    if header {
        lines.push(render(headers.to_vec()));
    }
    for row in rows {
        lines.push(render(row.iter().map(String::as_str).collect()));
    }
    lines.join("\n")
}

fn write_json<W, T>(out: &mut W, records: &[T], lines: bool) -> io::Result<()>
where
    W: Write + ?Sized,
    T: Serialize,
{
    if !lines {
        serde_json::to_writer_pretty(&mut *out, records)?;
        return writeln!(out);
    }
    for record in records {
        serde_json::to_writer(&mut *out, record)?;
        writeln!(out)?;
    }
    Ok(())
}

fn write_records<W, T>(
    out: &mut W,
    records: &[T],
    rendering: Rendering,
    headers: &[&str],
    row: impl Fn(&T) -> Vec<String>,
) -> io::Result<()>
where
    W: Write + ?Sized,
    T: Serialize,
{
    match rendering.format {
        OutputFormat::Json => write_json(out, records, false),
        OutputFormat::Jsonl => write_json(out, records, true),
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(&mut *out);
            if rendering.header {
                writer.write_record(headers)?;
            }
            for record in records {
                writer.write_record(row(record))?;
            }
            writer.flush()
        }
        OutputFormat::Table => {
            if records.is_empty() {
                return Ok(());
            }
            let rows: Vec<Vec<String>> = records.iter().map(row).collect();
            writeln!(out, "{}", format_table(headers, &rows, rendering.header))
        }
    }
}

/// Render tasks. `select` picks columns (and JSON keys); empty keeps the
/// default columns and full JSON records.
pub fn write_tasks<W: Write + ?Sized>(
    out: &mut W,
    tasks: &[Task],
    rendering: Rendering,
    select: &[TaskField],
    today: NaiveDate,
) -> io::Result<()> {
    let json = matches!(rendering.format, OutputFormat::Json | OutputFormat::Jsonl);
    if json && !select.is_empty() {
        let projected: Vec<Map<String, Value>> = tasks
            .iter()
            .map(|task| {
                select
                    .iter()
                    .map(|field| (field.name().to_string(), field.json(task, today)))
                    .collect()
            })
            .collect();
        return write_json(out, &projected, rendering.format == OutputFormat::Jsonl);
    }

    let fields: &[TaskField] = if select.is_empty() { &TaskField::DEFAULT } else { select };
    let headers: Vec<&str> = fields.iter().map(|field| field.header()).collect();
    let truncated = rendering.format == OutputFormat::Table;
    write_records(out, tasks, rendering, &headers, |task| {
        fields
            .iter()
            .map(|field| field.cell(task, today, truncated))
            .collect()
    })
}

fn when_label(task: &Task, today: NaiveDate) -> String {
    match task.start_date {
        Some(date) if date > today => date.to_string(),
        _ => task.bucket(today).to_string(),
    }
}

pub fn write_projects<W: Write + ?Sized>(
    out: &mut W,
    projects: &[Project],
    rendering: Rendering,
) -> io::Result<()> {
    write_records(out, projects, rendering, &["ID", "TITLE", "STATUS", "AREA"], |p| {
        vec![
            p.uuid.clone(),
            truncate(&p.title, MAX_TITLE_WIDTH),
            p.status.to_string(),
            p.area_title.clone().unwrap_or_default(),
        ]
    })
}

pub fn write_areas<W: Write + ?Sized>(out: &mut W, areas: &[Area], rendering: Rendering) -> io::Result<()> {
    write_records(out, areas, rendering, &["ID", "TITLE"], |a| {
        vec![a.uuid.clone(), truncate(&a.title, MAX_TITLE_WIDTH)]
    })
}

pub fn write_tags<W: Write + ?Sized>(out: &mut W, tags: &[Tag], rendering: Rendering) -> io::Result<()> {
    write_records(out, tags, rendering, &["ID", "TITLE", "SHORTCUT"], |t| {
        vec![
            t.uuid.clone(),
            t.title.clone(),
            t.shortcut.clone().unwrap_or_default(),
        ]
    })
}

/// Multi-line view of a single task for `show`
pub fn write_task_detail<W: Write + ?Sized>(out: &mut W, task: &Task, today: NaiveDate) -> io::Result<()> {
    writeln!(out, "{}", task.title)?;
    writeln!(out, "  id:        {}", task.uuid)?;
    writeln!(out, "  status:    {}{}", task.status, if task.trashed { " (trashed)" } else { "" })?;
    writeln!(out, "  when:      {}", when_label(task, today))?;
    if let Some(deadline) = task.deadline {
        writeln!(out, "  deadline:  {deadline}")?;
    }
    if let Some(project) = &task.project_title {
        writeln!(out, "  project:   {project}")?;
    }
    if let Some(area) = &task.area_title {
        writeln!(out, "  area:      {area}")?;
    }
    if let Some(heading) = &task.heading_title {
        writeln!(out, "  heading:   {heading}")?;
    }
    if !task.tags.is_empty() {
        writeln!(out, "  tags:      {}", task.tags.join(", "))?;
    }
    if task.repeating {
        writeln!(out, "  repeating: yes")?;
    }
    if !task.notes.is_empty() {
        writeln!(out)?;
        for line in task.notes.lines() {
            writeln!(out, "  {line}")?;
        }
    }
    Ok(())
}

/// Anything listed in a dry-run preview
pub trait PreviewRow {
    fn preview_id(&self) -> &str;
    fn preview_title(&self) -> &str;
}

impl PreviewRow for Task {
    fn preview_id(&self) -> &str {
        &self.uuid
    }

    fn preview_title(&self) -> &str {
        &self.title
    }
}

impl PreviewRow for ActionItem {
    fn preview_id(&self) -> &str {
        &self.id
    }

    fn preview_title(&self) -> &str {
        &self.title
    }
}

/// Dry-run listing: the first `shown` targets plus a count of the rest
pub fn write_preview<W, T>(out: &mut W, action: &str, shown: &[T], total: usize) -> io::Result<()>
where
    W: Write + ?Sized,
    T: PreviewRow,
{
    writeln!(out, "Matches: {total}")?;
    writeln!(out, "Dry run: would {action} {total} task(s):")?;
    for row in shown {
        writeln!(
            out,
            "  {}  {}",
            row.preview_id(),
            truncate(row.preview_title(), MAX_TITLE_WIDTH)
        )?;
    }
    if total > shown.len() {
        writeln!(out, "  ... and {} more", total - shown.len())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).unwrap()
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo wörld", 8), "héllo...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[test]
    fn table_aligns_columns() {
        let rows = vec![
            vec!["A1".to_string(), "first".to_string()],
            vec!["B22".to_string(), "second".to_string()],
        ];
        assert_eq!(
            format_table(&["ID", "TITLE"], &rows, true),
            "ID   TITLE\nA1   first\nB22  second"
        );
        assert_eq!(format_table(&["ID", "TITLE"], &rows, false), "A1   first\nB22  second");
    }

    #[test]
    fn jsonl_writes_one_object_per_line() {
        let tasks = vec![Task::new("A", "a"), Task::new("B", "b")];
        let mut buf = Vec::new();
        let rendering = Rendering {
            format: OutputFormat::Jsonl,
            header: true,
        };
        write_tasks(&mut buf, &tasks, rendering, &[], today()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["uuid"], "A");
        assert_eq!(first["type"], "todo");
    }

    #[test]
    fn preview_reports_remainder() {
        let tasks = vec![Task::new("A", "a"), Task::new("B", "b")];
        let mut buf = Vec::new();
        write_preview(&mut buf, "trash", &tasks[..1], 2).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("Matches: 2\nDry run: would trash 2 task(s):"));
        assert!(text.contains("... and 1 more"));
    }

    #[test]
    fn preview_lists_logged_items() {
        let mut task = Task::new("A", "Buy milk");
        task.start = crate::models::StartBucket::Anytime;
        let items = vec![ActionItem::capture(&task)];
        let mut buf = Vec::new();
        write_preview(&mut buf, "restore", &items, 1).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "Matches: 1\nDry run: would restore 1 task(s):\n  A  Buy milk\n");
    }

    #[test]
    fn csv_writes_selected_columns_with_quoting() {
        let mut task = Task::new("ABC", "Task, with comma");
        task.status = crate::models::Status::Completed;
        let select = parse_select("uuid,title,status").unwrap();
        let mut buf = Vec::new();
        let rendering = Rendering {
            format: OutputFormat::Csv,
            header: true,
        };
        write_tasks(&mut buf, &[task], rendering, &select, today()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "UUID,TITLE,STATUS\nABC,\"Task, with comma\",completed\n");
    }

    #[test]
    fn csv_keeps_long_titles_whole() {
        let title = "x".repeat(MAX_TITLE_WIDTH + 10);
        let mut buf = Vec::new();
        let rendering = Rendering {
            format: OutputFormat::Csv,
            header: false,
        };
        write_tasks(&mut buf, &[Task::new("A", title.clone())], rendering, &[TaskField::Title], today())
            .unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), format!("{title}\n"));
    }

    #[test]
    fn selected_json_keeps_only_requested_keys() {
        let mut task = Task::new("A", "a");
        task.deadline = NaiveDate::from_ymd_opt(2025, 4, 1);
        let mut buf = Vec::new();
        let rendering = Rendering {
            format: OutputFormat::Jsonl,
            header: true,
        };
        let select = parse_select("id, deadline, tags").unwrap();
        write_tasks(&mut buf, &[task], rendering, &select, today()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&buf).unwrap();
        assert_eq!(value, serde_json::json!({"uuid": "A", "deadline": "2025-04-01", "tags": []}));
    }

    #[test]
    fn unknown_select_field_is_rejected() {
        assert!(matches!(parse_select("title,priority"), Err(FilterError::InvalidQuery(_))));
        assert!(parse_select(" ").unwrap().is_empty());
    }
}
