use chrono::{Duration, Local, NaiveDate};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::action_log::{ActionEntry, ActionKind, ActionLog, ActionLogError};
use crate::cli::{
    AddAreaArgs, AddArgs, CliError, Commands, DeleteArgs, FilterArgs, ListArgs, OutputArgs, RepeatArgs, UndoArgs,
    UpdateArgs, UpdateProjectArgs,
};
use crate::config::Config;
use crate::database::{DatabaseError, Store};
use crate::fetch::fetch_tasks;
use crate::filter::{FilterError, Selector, StatusFilter, TaskFilter, TaskQueryOptions};
use crate::gate::{self, GateDecision, GateRequest};
use crate::models::{RepeatUpdate, StartBucket, Task, TaskType, encode_things_date};
use crate::output::{self, OutputFormat};
use crate::things::{
    self, AddAreaOptions, AddOptions, Channel, ChannelError, Dispatch, UpdateOptions, UpdateProjectOptions,
};
use crate::undo;
use crate::utils;
use crate::verify::{self, VerifyError, When};

/// Everything a command needs besides its own arguments
pub struct App<'a> {
    pub config: Config,
    database: Option<String>,
    action_log: Option<ActionLog>,
    dry_run: bool,
    out: &'a mut dyn Write,
    err: &'a mut dyn Write,
    channel: &'a mut dyn Channel,
}

impl<'a> App<'a> {
    pub fn new(
        config: Config,
        out: &'a mut dyn Write,
        err: &'a mut dyn Write,
        channel: &'a mut dyn Channel,
    ) -> Self {
        Self {
            config,
            database: None,
            action_log: None,
            dry_run: false,
            out,
            err,
            channel,
        }
    }

    /// Database path from `--db`; otherwise env, config, then discovery
    pub fn with_database(mut self, database: Option<String>) -> Self {
        self.database = database;
        self
    }

    pub fn with_action_log(mut self, action_log: Option<ActionLog>) -> Self {
        self.action_log = action_log;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    fn database_path(&self) -> Result<PathBuf, CliError> {
        Ok(self.config.resolve_database_path(self.database.as_deref())?)
    }

    fn open_store(&self) -> Result<Store, CliError> {
        Ok(Store::open(&self.database_path()?)?)
    }

    fn open_store_writable(&self) -> Result<Store, CliError> {
        Ok(Store::open_writable(&self.database_path()?)?)
    }

    fn gate_request(&self, confirm_bulk: bool) -> GateRequest {
        GateRequest {
            dry_run: self.dry_run,
            confirm_bulk,
            preview_limit: self.config.preview_limit,
        }
    }

    /// Print a user-facing warning and log it
    fn warn(&mut self, message: &str) -> Result<(), CliError> {
        warn!("{message}");
        writeln!(self.err, "Warning: {message}")?;
        Ok(())
    }

    /// Best-effort write of the undo slot; never fails the mutation
    fn record(&mut self, entry: &ActionEntry) -> Result<(), CliError> {
        let outcome = match &self.action_log {
            Some(log) => log.append(entry),
            None => Err(ActionLogError::NoLocation),
        };
        if let Err(e) = outcome {
            self.warn(&format!("could not record action for undo: {e}"))?;
        }
        Ok(())
    }
}

/// Dispatch a parsed command
pub fn run(app: &mut App, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Tasks(args) => handle_list(app, ListView::Tasks, args),
        Commands::Inbox(args) => handle_list(app, ListView::Inbox, args),
        Commands::Today(args) => handle_list(app, ListView::Today, args),
        Commands::Anytime(args) => handle_list(app, ListView::Anytime, args),
        Commands::Someday(args) => handle_list(app, ListView::Someday, args),
        Commands::Logbook(args) => handle_list(app, ListView::Logbook, args),
        Commands::Createdtoday(args) => handle_list(app, ListView::CreatedToday, args),
        Commands::Logtoday(args) => handle_list(app, ListView::LogToday, args),
        Commands::Search { text, mut list } => {
            if list.filter.search.is_some() {
                return Err(FilterError::ConflictingSelectors {
                    reason: "search text given both as an argument and with --search",
                }
                .into());
            }
            list.filter.search = Some(text);
            handle_list(app, ListView::Tasks, list)
        }
        Commands::Show { id, json } => handle_show(app, &id, json),
        Commands::Projects {
            status,
            include_trashed,
            output,
        } => handle_projects(app, status.as_deref(), include_trashed, &output),
        Commands::Areas { output } => handle_areas(app, &output),
        Commands::Tags { output } => handle_tags(app, &output),
        Commands::Add(args) => handle_add(app, args),
        Commands::AddArea(args) => handle_add_area(app, args),
        Commands::Update(args) => handle_update(app, args),
        Commands::UpdateProject(args) => handle_update_project(app, args),
        Commands::Delete(args) => handle_delete(app, args),
        Commands::Undo(args) => handle_undo(app, args),
        Commands::Repeat(args) => handle_repeat(app, args),
    }
}

/// Built-in list views layered on top of the user's filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListView {
    Tasks,
    Inbox,
    Today,
    Anytime,
    Someday,
    Logbook,
    CreatedToday,
    LogToday,
}

impl ListView {
    fn default_status(self) -> StatusFilter {
        match self {
            ListView::Logbook => StatusFilter::Completed,
            ListView::CreatedToday | ListView::LogToday => StatusFilter::Any,
            _ => StatusFilter::Incomplete,
        }
    }

    fn fetch(self, store: &Store, filter: &TaskFilter, today: NaiveDate) -> Result<Vec<Task>, DatabaseError> {
        let mut filter = filter.clone();
        match self {
            ListView::Inbox => filter.start = Some(StartBucket::Inbox),
            ListView::Anytime => filter.start = Some(StartBucket::Anytime),
            ListView::Someday => filter.start = Some(StartBucket::Someday),
            ListView::Today => {
                let tomorrow = today.succ_opt().unwrap_or(today);
                filter.start_before = Some(filter.start_before.map_or(tomorrow, |d| d.min(tomorrow)));
            }
            ListView::Tasks | ListView::Logbook | ListView::CreatedToday | ListView::LogToday => {}
        }
        match self {
            ListView::CreatedToday => {
                let end = Local::now();
                store.tasks_created_between(end - Duration::hours(24), end, &filter)
            }
            ListView::LogToday => {
                let (start, end) = utils::day_bounds();
                store.tasks_completed_between(start, end, &filter)
            }
            _ => store.tasks(&filter),
        }
    }
}

fn handle_list(app: &mut App, view: ListView, args: ListArgs) -> Result<(), CliError> {
    let select = args
        .select
        .as_deref()
        .map(output::parse_select)
        .transpose()?
        .unwrap_or_default();
    let store = app.open_store()?;
    let today = utils::today();
    let options = args.filter.to_options(Some(&args.paging), app.config.default_limit);
    let tasks = fetch_tasks(
        &store,
        &options,
        view.default_status(),
        false,
        &[TaskType::Todo],
        |store, filter| view.fetch(store, filter, today),
    )?;
    info!(?view, count = tasks.len(), "listed tasks");

    let rendering = args.output.rendering();
    output::write_tasks(&mut *app.out, &tasks, rendering, &select, today)?;
    if tasks.is_empty() && rendering.format == OutputFormat::Table {
        writeln!(app.err, "No matching tasks.")?;
    }
    Ok(())
}

fn handle_show(app: &mut App, id: &str, json: bool) -> Result<(), CliError> {
    let store = app.open_store()?;
    let task = store.task_by_id(id)?;
    if json {
        serde_json::to_writer_pretty(&mut *app.out, &task).map_err(std::io::Error::from)?;
        writeln!(app.out)?;
    } else {
        output::write_task_detail(&mut *app.out, &task, utils::today())?;
    }
    Ok(())
}

fn handle_projects(
    app: &mut App,
    status: Option<&str>,
    include_trashed: bool,
    output_args: &OutputArgs,
) -> Result<(), CliError> {
    let store = app.open_store()?;
    let status = status
        .map(StatusFilter::parse)
        .transpose()?
        .unwrap_or(StatusFilter::Incomplete);
    let projects = store.projects(status.status(), include_trashed)?;
    output::write_projects(&mut *app.out, &projects, output_args.rendering())?;
    Ok(())
}

fn handle_areas(app: &mut App, output_args: &OutputArgs) -> Result<(), CliError> {
    let areas = app.open_store()?.areas()?;
    output::write_areas(&mut *app.out, &areas, output_args.rendering())?;
    Ok(())
}

fn handle_tags(app: &mut App, output_args: &OutputArgs) -> Result<(), CliError> {
    let tags = app.open_store()?.tags()?;
    output::write_tags(&mut *app.out, &tags, output_args.rendering())?;
    Ok(())
}

fn split_tags(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_day(value: &str) -> Result<NaiveDate, CliError> {
    utils::parse_date(value.trim())
        .map_err(|_| CliError::InvalidArgument(format!("invalid date '{value}' (expected YYYY-MM-DD)")))
}

/// Check a creation or completion date and pass it on as typed
fn parse_timestamp(value: &str) -> Result<String, CliError> {
    let trimmed = value.trim();
    utils::parse_date_or_time(trimmed)
        .map(|_| trimmed.to_string())
        .ok_or_else(|| CliError::InvalidArgument(format!("invalid date '{value}' (expected YYYY-MM-DD or RFC 3339)")))
}

fn handle_add_area(app: &mut App, args: AddAreaArgs) -> Result<(), CliError> {
    gate::guard_unsafe_title(&args.title, args.allow_unsafe_title)?;
    let options = AddAreaOptions {
        title: args.title.trim().to_string(),
        tags: split_tags(args.tags.as_deref()),
    };
    if options.title.is_empty() {
        return Err(ChannelError::MissingTitle.into());
    }
    if app.dry_run {
        writeln!(app.out, "Dry run: would add area '{}'", options.title)?;
        return Ok(());
    }
    let title = options.title.clone();
    app.channel.dispatch(&Dispatch::AddArea(options))?;
    writeln!(app.out, "Added area '{title}'")?;
    Ok(())
}

fn handle_add(app: &mut App, args: AddArgs) -> Result<(), CliError> {
    gate::guard_unsafe_title(&args.title, args.allow_unsafe_title)?;
    let when = args.when.as_deref().map(When::parse).transpose()?;
    if let Some(deadline) = &args.deadline {
        parse_day(deadline)?;
    }

    let add = AddOptions {
        title: args.title.clone(),
        notes: args.notes.clone(),
        when: when.map(|w| w.as_param()),
        deadline: args.deadline.clone(),
        tags: split_tags(args.tags.as_deref()),
        checklist_items: args.checklist.clone(),
        list_id: args.list_id.clone(),
        list: args.list.clone(),
        heading: args.heading.clone(),
        completed: args.completed,
        canceled: args.canceled,
        reveal: args.reveal,
    };

    // Read the source rule before dispatching so a bad ID adds nothing
    let repeat = match &args.repeat_from {
        Some(source) => {
            let rule = app.open_store()?.repeat_rule(source)?;
            if rule.recurrence_rule.is_empty() {
                return Err(CliError::InvalidArgument(format!("task {source} has no repeat rule")));
            }
            Some(RepeatUpdate::from_rule(rule))
        }
        None => None,
    };

    if app.dry_run {
        writeln!(app.out, "Dry run: would add '{}'", add.title)?;
        writeln!(app.out, "  {}", things::add_url(&add))?;
        return Ok(());
    }

    let since = Local::now() - Duration::seconds(2);
    app.channel.dispatch(&Dispatch::Add(add))?;
    writeln!(app.out, "Added '{}'", args.title)?;

    if let Some(update) = repeat {
        let store = app.open_store_writable()?;
        let policy = app.config.verify_policy();
        let created = verify::await_created(
            |title, since| store.tasks_by_title_since(title, TaskType::Todo, since),
            &args.title,
            since,
            &policy,
        )?;
        store.apply_repeat_rule(&created.uuid, &update)?;
        writeln!(app.out, "Applied repeat rule to {}", created.uuid)?;
    }
    Ok(())
}

/// Resolve mutation targets from `--id` or the filter flags, in resolution order
fn resolve_targets(
    store: &Store,
    id: Option<&str>,
    options: &TaskQueryOptions,
) -> Result<Vec<Task>, CliError> {
    match Selector::resolve(id, options)? {
        Selector::Id(id) => Ok(vec![store.task_by_id(&id)?]),
        Selector::Query => Ok(fetch_tasks(
            store,
            options,
            StatusFilter::Incomplete,
            false,
            &[TaskType::Todo],
            |store, filter| store.tasks(filter),
        )?),
    }
}

fn mutation_options(filter: &FilterArgs) -> TaskQueryOptions {
    let mut options = filter.to_options(None, 0);
    options.limit = None;
    options
}

fn handle_update(app: &mut App, args: UpdateArgs) -> Result<(), CliError> {
    if let Some(title) = &args.title {
        gate::guard_unsafe_title(title, args.allow_unsafe_title)?;
    }
    let when = if args.later {
        Some(When::Evening)
    } else {
        args.when.as_deref().map(When::parse).transpose()?
    };
    if let Some(deadline) = &args.deadline {
        parse_day(deadline)?;
    }
    let creation_date = args.creation_date.as_deref().map(parse_timestamp).transpose()?;
    let completion_date = args.completion_date.as_deref().map(parse_timestamp).transpose()?;

    let template = UpdateOptions {
        title: args.title.clone(),
        notes: args.notes.clone(),
        prepend_notes: args.prepend_notes.clone(),
        append_notes: args.append_notes.clone(),
        when: when.map(|w| w.as_param()),
        deadline: if args.clear_deadline {
            Some(String::new())
        } else {
            args.deadline.clone()
        },
        tags: args.tags.as_deref().map(|raw| split_tags(Some(raw))),
        add_tags: split_tags(args.add_tags.as_deref()),
        list_id: args.list_id.clone(),
        list: args.list.clone(),
        heading: args.heading.clone(),
        completed: args.completed.then_some(true),
        canceled: args.canceled.then_some(true),
        checklist_items: (!args.checklist.is_empty()).then(|| args.checklist.clone()),
        prepend_checklist_items: args.prepend_checklist.clone(),
        append_checklist_items: args.append_checklist.clone(),
        creation_date,
        completion_date,
        duplicate: args.duplicate,
        reveal: args.reveal,
        ..UpdateOptions::default()
    };
    if template == UpdateOptions::default() {
        return Err(CliError::InvalidArgument("nothing to update".to_string()));
    }

    let options = mutation_options(&args.filter);
    let store = app.open_store()?;
    let targets = resolve_targets(&store, args.id.as_deref(), &options)?;
    drop(store);

    // One title or body copied onto many tasks is never what was meant
    if targets.len() > 1 && (args.title.is_some() || args.notes.is_some()) {
        return Err(CliError::InvalidArgument(
            "bulk update does not accept --title or --notes (use --id or refine the query)".to_string(),
        ));
    }
    // Things ignores schedule changes to repeating to-dos sent from outside the app
    if when.is_some() {
        if let Some(task) = targets.iter().find(|task| task.repeating) {
            return Err(VerifyError::RepeatingTaskNotUpdatable {
                id: task.uuid.clone(),
            }
            .into());
        }
    }

    if when == Some(When::Evening) {
        let today = utils::today();
        for task in &targets {
            verify::guard_evening(task, today, args.allow_non_today)?;
        }
    }

    match gate::evaluate(&targets, app.gate_request(args.yes))? {
        GateDecision::Preview { shown, total } => {
            output::write_preview(&mut *app.out, "update", shown, total)?;
            return Ok(());
        }
        GateDecision::Execute => {}
    }

    let token = app
        .config
        .resolve_auth_token(args.auth_token.as_deref())
        .ok_or(ChannelError::MissingAuthToken)?;

    app.record(&ActionEntry::capture(ActionKind::Update, &targets))?;
    for task in &targets {
        let update = UpdateOptions {
            id: task.uuid.clone(),
            auth_token: token.clone(),
            ..template.clone()
        };
        app.channel.dispatch(&Dispatch::Update(update))?;
    }
    writeln!(app.out, "Updated {} task(s)", targets.len())?;

    if let Some(when) = when.filter(|_| !args.no_verify) {
        verify_targets(app, &targets, &when)?;
    }
    Ok(())
}

fn handle_update_project(app: &mut App, args: UpdateProjectArgs) -> Result<(), CliError> {
    if let Some(title) = &args.title {
        gate::guard_unsafe_title(title, args.allow_unsafe_title)?;
    }
    let when = args.when.as_deref().map(When::parse).transpose()?;
    if let Some(deadline) = &args.deadline {
        parse_day(deadline)?;
    }

    let mut options = UpdateProjectOptions {
        title: args.title.clone(),
        notes: args.notes.clone(),
        prepend_notes: args.prepend_notes.clone(),
        append_notes: args.append_notes.clone(),
        when: when.map(|w| w.as_param()),
        deadline: if args.clear_deadline {
            Some(String::new())
        } else {
            args.deadline.clone()
        },
        tags: args.tags.as_deref().map(|raw| split_tags(Some(raw))),
        add_tags: split_tags(args.add_tags.as_deref()),
        area_id: args.area_id.clone(),
        area: args.area.clone(),
        todos: args.todos.clone(),
        completed: args.completed,
        canceled: args.canceled,
        creation_date: args.creation_date.as_deref().map(parse_timestamp).transpose()?,
        completion_date: args.completion_date.as_deref().map(parse_timestamp).transpose()?,
        duplicate: args.duplicate,
        reveal: args.reveal,
        ..UpdateProjectOptions::default()
    };
    if options == UpdateProjectOptions::default() {
        return Err(CliError::InvalidArgument("nothing to update".to_string()));
    }

    let project = app.open_store()?.task_by_id(&args.id)?;
    if project.task_type != TaskType::Project {
        return Err(CliError::InvalidArgument(format!("{} is not a project", args.id)));
    }
    if app.dry_run {
        writeln!(app.out, "Dry run: would update project '{}' ({})", project.title, project.uuid)?;
        return Ok(());
    }

    options.id = project.uuid.clone();
    options.auth_token = app
        .config
        .resolve_auth_token(args.auth_token.as_deref())
        .ok_or(ChannelError::MissingAuthToken)?;
    app.channel.dispatch(&Dispatch::UpdateProject(options))?;
    writeln!(app.out, "Updated project '{}'", project.title)?;
    Ok(())
}

fn verify_targets(app: &mut App, targets: &[Task], when: &When) -> Result<(), CliError> {
    let store = match app.open_store() {
        Ok(store) => store,
        Err(e) => {
            app.warn(&format!("could not open the Things database to verify the change: {e}"))?;
            return Ok(());
        }
    };
    let policy = app.config.verify_policy();
    for task in targets {
        verify::verify_when_applied(&store, &task.uuid, when, &policy)?;
    }
    Ok(())
}

fn handle_delete(app: &mut App, args: DeleteArgs) -> Result<(), CliError> {
    let options = mutation_options(&args.filter);
    let store = app.open_store()?;
    let targets = resolve_targets(&store, args.id.as_deref(), &options)?;
    drop(store);

    if args.id.is_some() && !app.dry_run {
        if let [task] = targets.as_slice() {
            gate::confirm_named_target(&task.uuid, &task.title, args.confirm.as_deref())?;
        }
    }

    match gate::evaluate(&targets, app.gate_request(args.yes))? {
        GateDecision::Preview { shown, total } => {
            output::write_preview(&mut *app.out, "trash", shown, total)?;
            return Ok(());
        }
        GateDecision::Execute => {}
    }

    app.record(&ActionEntry::capture(ActionKind::Trash, &targets))?;
    let ids: Vec<String> = targets.iter().map(|task| task.uuid.clone()).collect();
    app.channel.dispatch(&Dispatch::Trash(ids))?;
    writeln!(app.out, "Moved {} task(s) to Trash", targets.len())?;
    Ok(())
}

fn handle_undo(app: &mut App, args: UndoArgs) -> Result<(), CliError> {
    let log = app.action_log.clone().ok_or(ActionLogError::NoLocation)?;
    let entry = log.read_last()?;

    let (verb, noun) = match entry.kind {
        ActionKind::Trash => ("restore", "trash"),
        ActionKind::Update => ("revert", "update"),
    };
    match gate::evaluate(&entry.items, app.gate_request(args.yes))? {
        GateDecision::Preview { shown, total } => {
            output::write_preview(&mut *app.out, verb, shown, total)?;
            return Ok(());
        }
        GateDecision::Execute => {}
    }

    let token = app.config.resolve_auth_token(args.auth_token.as_deref());
    let plan = undo::plan_undo(&entry, token.as_deref())?;
    for warning in &plan.warnings {
        app.warn(warning)?;
    }
    for dispatch in &plan.dispatches {
        app.channel.dispatch(dispatch)?;
    }
    if let Err(e) = log.remove() {
        app.warn(&format!("could not clear the action log: {e}"))?;
    }
    writeln!(app.out, "Undid {noun} of {} task(s)", plan.dispatches.len())?;
    Ok(())
}

fn handle_repeat(app: &mut App, args: RepeatArgs) -> Result<(), CliError> {
    let deadline = args.deadline.as_deref().map(parse_day).transpose()?;
    let store = if app.dry_run {
        app.open_store()?
    } else {
        app.open_store_writable()?
    };

    if args.clear {
        if app.dry_run {
            store.task_by_id(&args.id)?;
            writeln!(app.out, "Dry run: would clear the repeat rule of {}", args.id)?;
            return Ok(());
        }
        store.clear_repeat_rule(&args.id)?;
        writeln!(app.out, "Cleared repeat rule of {}", args.id)?;
        return Ok(());
    }

    let mut update = match (&args.from_task, &args.rule_file) {
        (Some(source), None) => {
            let rule = store.repeat_rule(source)?;
            if rule.recurrence_rule.is_empty() {
                return Err(CliError::InvalidArgument(format!("task {source} has no repeat rule")));
            }
            RepeatUpdate::from_rule(rule)
        }
        (None, Some(path)) => {
            let bytes = fs::read(utils::expand_path(path))
                .map_err(|e| CliError::InvalidArgument(format!("cannot read rule file {path}: {e}")))?;
            if bytes.is_empty() {
                return Err(CliError::InvalidArgument(format!("rule file {path} is empty")));
            }
            let today = encode_things_date(utils::today());
            RepeatUpdate {
                recurrence_rule: bytes,
                instance_creation_start_date: today,
                next_instance_start_date: Some(today),
                ..RepeatUpdate::default()
            }
        }
        _ => {
            return Err(CliError::InvalidArgument(
                "pass exactly one of --from-task, --rule-file or --clear".to_string(),
            ));
        }
    };
    if let Some(deadline) = deadline {
        update.deadline = Some(encode_things_date(deadline));
        update.set_deadline = true;
    }

    if app.dry_run {
        writeln!(
            app.out,
            "Dry run: would write a {}-byte repeat rule to {}",
            update.recurrence_rule.len(),
            args.id
        )?;
        return Ok(());
    }
    store.apply_repeat_rule(&args.id, &update)?;
    writeln!(app.out, "Applied repeat rule to {}", args.id)?;
    Ok(())
}
