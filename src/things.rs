use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Things auth token required (set THINGS_AUTH_TOKEN or pass --auth-token)")]
    MissingAuthToken,
    #[error("No target task given")]
    MissingTarget,
    #[error("A title is required")]
    MissingTitle,
    #[error("Failed to launch {program}: {reason}")]
    Launch { program: String, reason: String },
}

/// Parameters for `things:///add`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOptions {
    pub title: String,
    pub notes: Option<String>,
    pub when: Option<String>,
    pub deadline: Option<String>,
    pub tags: Vec<String>,
    pub checklist_items: Vec<String>,
    pub list_id: Option<String>,
    pub list: Option<String>,
    pub heading: Option<String>,
    pub completed: bool,
    pub canceled: bool,
    pub reveal: bool,
}

/// Parameters for `things:///update`. `Some("")` clears a field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    pub id: String,
    pub auth_token: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub prepend_notes: Option<String>,
    pub append_notes: Option<String>,
    pub when: Option<String>,
    pub deadline: Option<String>,
    pub tags: Option<Vec<String>>,
    pub add_tags: Vec<String>,
    pub list_id: Option<String>,
    pub list: Option<String>,
    pub heading: Option<String>,
    pub completed: Option<bool>,
    pub canceled: Option<bool>,
    /// Replaces the whole checklist when set
    pub checklist_items: Option<Vec<String>>,
    pub prepend_checklist_items: Vec<String>,
    pub append_checklist_items: Vec<String>,
    pub creation_date: Option<String>,
    pub completion_date: Option<String>,
    pub duplicate: bool,
    pub reveal: bool,
}

/// Parameters for `things:///update-project`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateProjectOptions {
    pub id: String,
    pub auth_token: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub prepend_notes: Option<String>,
    pub append_notes: Option<String>,
    pub when: Option<String>,
    pub deadline: Option<String>,
    pub tags: Option<Vec<String>>,
    pub add_tags: Vec<String>,
    pub area_id: Option<String>,
    pub area: Option<String>,
    /// New to-dos appended to the project
    pub todos: Vec<String>,
    pub completed: bool,
    pub canceled: bool,
    pub creation_date: Option<String>,
    pub completion_date: Option<String>,
    pub duplicate: bool,
    pub reveal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddAreaOptions {
    pub title: String,
    pub tags: Vec<String>,
}

/// One outbound instruction. The app acknowledges nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Add(AddOptions),
    Update(UpdateOptions),
    UpdateProject(UpdateProjectOptions),
    AddArea(AddAreaOptions),
    Trash(Vec<String>),
}

impl Dispatch {
    pub fn label(&self) -> &'static str {
        match self {
            Dispatch::Add(_) => "add",
            Dispatch::Update(_) => "update",
            Dispatch::UpdateProject(_) => "update-project",
            Dispatch::AddArea(_) => "add-area",
            Dispatch::Trash(_) => "trash",
        }
    }
}

/// Outbound mutation channel
pub trait Channel {
    fn dispatch(&mut self, dispatch: &Dispatch) -> Result<(), ChannelError>;
}

/// Sends dispatches to the running Things app via `open -g` and `osascript`
#[derive(Debug, Default)]
pub struct ThingsChannel;

impl Channel for ThingsChannel {
    fn dispatch(&mut self, dispatch: &Dispatch) -> Result<(), ChannelError> {
        match dispatch {
            Dispatch::Add(options) => launch("open", &["-g", add_url(options).as_str()]),
            Dispatch::Update(options) => launch("open", &["-g", update_url(options)?.as_str()]),
            Dispatch::UpdateProject(options) => {
                launch("open", &["-g", update_project_url(options)?.as_str()])
            }
            Dispatch::AddArea(options) => launch("osascript", &["-e", add_area_script(options)?.as_str()]),
            Dispatch::Trash(ids) => launch("osascript", &["-e", trash_script(ids)?.as_str()]),
        }?;
        info!(kind = dispatch.label(), "dispatched to Things");
        Ok(())
    }
}

fn launch(program: &str, args: &[&str]) -> Result<(), ChannelError> {
    debug!(program, "launching");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| ChannelError::Launch {
            program: program.to_string(),
            reason: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(ChannelError::Launch {
            program: program.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

pub fn add_url(options: &AddOptions) -> String {
    let mut params = Vec::new();
    push(&mut params, "title", Some(options.title.as_str()));
    push(&mut params, "notes", options.notes.as_deref());
    push(&mut params, "when", options.when.as_deref());
    push(&mut params, "deadline", options.deadline.as_deref());
    if !options.tags.is_empty() {
        params.push(("tags", options.tags.join(",")));
    }
    if !options.checklist_items.is_empty() {
        params.push(("checklist-items", options.checklist_items.join("\n")));
    }
    push(&mut params, "list-id", options.list_id.as_deref());
    push(&mut params, "list", options.list.as_deref());
    push(&mut params, "heading", options.heading.as_deref());
    push_flag(&mut params, "completed", options.completed);
    push_flag(&mut params, "canceled", options.canceled);
    push_flag(&mut params, "reveal", options.reveal);
    build_url("add", &params)
}

pub fn update_url(options: &UpdateOptions) -> Result<String, ChannelError> {
    if options.auth_token.trim().is_empty() {
        return Err(ChannelError::MissingAuthToken);
    }
    if options.id.trim().is_empty() {
        return Err(ChannelError::MissingTarget);
    }
    let mut params = vec![
        ("auth-token", options.auth_token.clone()),
        ("id", options.id.clone()),
    ];
    push(&mut params, "title", options.title.as_deref());
    push(&mut params, "notes", options.notes.as_deref());
    push(&mut params, "prepend-notes", options.prepend_notes.as_deref());
    push(&mut params, "append-notes", options.append_notes.as_deref());
    push(&mut params, "when", options.when.as_deref());
    push(&mut params, "deadline", options.deadline.as_deref());
    if let Some(tags) = &options.tags {
        params.push(("tags", tags.join(",")));
    }
    if !options.add_tags.is_empty() {
        params.push(("add-tags", options.add_tags.join(",")));
    }
    push(&mut params, "list-id", options.list_id.as_deref());
    push(&mut params, "list", options.list.as_deref());
    push(&mut params, "heading", options.heading.as_deref());
    if let Some(completed) = options.completed {
        params.push(("completed", completed.to_string()));
    }
    if let Some(canceled) = options.canceled {
        params.push(("canceled", canceled.to_string()));
    }
    if let Some(items) = &options.checklist_items {
        params.push(("checklist-items", items.join("\n")));
    }
    if !options.prepend_checklist_items.is_empty() {
        params.push(("prepend-checklist-items", options.prepend_checklist_items.join("\n")));
    }
    if !options.append_checklist_items.is_empty() {
        params.push(("append-checklist-items", options.append_checklist_items.join("\n")));
    }
    push(&mut params, "creation-date", options.creation_date.as_deref());
    push(&mut params, "completion-date", options.completion_date.as_deref());
    push_flag(&mut params, "duplicate", options.duplicate);
    push_flag(&mut params, "reveal", options.reveal);
    Ok(build_url("update", &params))
}

pub fn update_project_url(options: &UpdateProjectOptions) -> Result<String, ChannelError> {
    if options.auth_token.trim().is_empty() {
        return Err(ChannelError::MissingAuthToken);
    }
    if options.id.trim().is_empty() {
        return Err(ChannelError::MissingTarget);
    }
    let mut params = vec![
        ("auth-token", options.auth_token.clone()),
        ("id", options.id.clone()),
    ];
    push(&mut params, "title", options.title.as_deref());
    push(&mut params, "notes", options.notes.as_deref());
    push(&mut params, "prepend-notes", options.prepend_notes.as_deref());
    push(&mut params, "append-notes", options.append_notes.as_deref());
    push(&mut params, "when", options.when.as_deref());
    push(&mut params, "deadline", options.deadline.as_deref());
    if let Some(tags) = &options.tags {
        params.push(("tags", tags.join(",")));
    }
    if !options.add_tags.is_empty() {
        params.push(("add-tags", options.add_tags.join(",")));
    }
    // An ID wins over a title
    match (&options.area_id, &options.area) {
        (Some(id), _) => params.push(("area-id", id.clone())),
        (None, Some(title)) => params.push(("area", title.clone())),
        (None, None) => {}
    }
    if !options.todos.is_empty() {
        params.push(("to-dos", options.todos.join("\n")));
    }
    // The app rejects completed and canceled together; canceled wins
    if options.canceled {
        params.push(("canceled", "true".to_string()));
    } else {
        push_flag(&mut params, "completed", options.completed);
    }
    push(&mut params, "creation-date", options.creation_date.as_deref());
    push(&mut params, "completion-date", options.completion_date.as_deref());
    push_flag(&mut params, "duplicate", options.duplicate);
    push_flag(&mut params, "reveal", options.reveal);
    Ok(build_url("update-project", &params))
}

/// AppleScript that creates an area, tagged when tags are given
pub fn add_area_script(options: &AddAreaOptions) -> Result<String, ChannelError> {
    let title = options.title.trim();
    if title.is_empty() {
        return Err(ChannelError::MissingTitle);
    }
    let mut properties = format!("name:\"{}\"", escape_applescript(title));
    if !options.tags.is_empty() {
        let tags = escape_applescript(&options.tags.join(", "));
        properties.push_str(&format!(", tag names:\"{tags}\""));
    }
    Ok(format!(
        "tell application \"Things3\"\n\tmake new area with properties {{{properties}}}\nend tell"
    ))
}

/// AppleScript that moves each to-do to the Trash
pub fn trash_script(ids: &[String]) -> Result<String, ChannelError> {
    if ids.is_empty() {
        return Err(ChannelError::MissingTarget);
    }
    let list = ids
        .iter()
        .map(|id| format!("\"{}\"", escape_applescript(id)))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!(
        "tell application \"Things3\"\n\trepeat with todoID in {{{list}}}\n\t\tdelete to do id todoID\n\tend repeat\nend tell"
    ))
}

fn push(params: &mut Vec<(&'static str, String)>, key: &'static str, value: Option<&str>) {
    if let Some(value) = value {
        params.push((key, value.to_string()));
    }
}

fn push_flag(params: &mut Vec<(&'static str, String)>, key: &'static str, set: bool) {
    if set {
        params.push((key, "true".to_string()));
    }
}

fn build_url(command: &str, params: &[(&'static str, String)]) -> String {
    let query = params
        .iter()
        .map(|(key, value)| format!("{key}={}", percent_encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("things:///{command}?{query}")
}

/// Encode everything outside the RFC 3986 unreserved set
pub fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn escape_applescript(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encode_handles_spaces_and_unicode() {
        assert_eq!(percent_encode("a b&c"), "a%20b%26c");
        assert_eq!(percent_encode("café"), "caf%C3%A9");
        assert_eq!(percent_encode("x-y_z.~"), "x-y_z.~");
    }

    #[test]
    fn add_url_joins_tags_and_checklist() {
        let url = add_url(&AddOptions {
            title: "Buy milk".into(),
            tags: vec!["errand".into(), "home".into()],
            checklist_items: vec!["oat".into(), "soy".into()],
            when: Some("today".into()),
            ..AddOptions::default()
        });
        assert_eq!(
            url,
            "things:///add?title=Buy%20milk&when=today&tags=errand%2Chome&checklist-items=oat%0Asoy"
        );
    }

    #[test]
    fn update_url_requires_token_and_id() {
        let mut options = UpdateOptions {
            id: "ABC".into(),
            ..UpdateOptions::default()
        };
        assert!(matches!(update_url(&options), Err(ChannelError::MissingAuthToken)));
        options.auth_token = "tok".into();
        options.deadline = Some(String::new());
        options.completed = Some(true);
        assert_eq!(
            update_url(&options).unwrap(),
            "things:///update?auth-token=tok&id=ABC&deadline=&completed=true"
        );
        options.id.clear();
        assert!(matches!(update_url(&options), Err(ChannelError::MissingTarget)));
    }

    #[test]
    fn update_url_carries_checklist_and_dates() {
        let options = UpdateOptions {
            id: "ABC".into(),
            auth_token: "tok".into(),
            checklist_items: Some(vec!["one".into(), "two".into()]),
            append_checklist_items: vec!["three".into()],
            creation_date: Some("2025-01-02".into()),
            duplicate: true,
            ..UpdateOptions::default()
        };
        assert_eq!(
            update_url(&options).unwrap(),
            "things:///update?auth-token=tok&id=ABC&checklist-items=one%0Atwo\
             &append-checklist-items=three&creation-date=2025-01-02&duplicate=true"
        );
    }

    #[test]
    fn update_project_url_prefers_area_id_and_cancel() {
        let options = UpdateProjectOptions {
            id: "P1".into(),
            auth_token: "tok".into(),
            area_id: Some("AREA".into()),
            area: Some("Home".into()),
            todos: vec!["a".into(), "b".into()],
            completed: true,
            canceled: true,
            ..UpdateProjectOptions::default()
        };
        assert_eq!(
            update_project_url(&options).unwrap(),
            "things:///update-project?auth-token=tok&id=P1&area-id=AREA&to-dos=a%0Ab&canceled=true"
        );
        let anonymous = UpdateProjectOptions {
            auth_token: "tok".into(),
            ..UpdateProjectOptions::default()
        };
        assert!(matches!(update_project_url(&anonymous), Err(ChannelError::MissingTarget)));
    }

    #[test]
    fn add_area_script_names_and_tags_the_area() {
        let script = add_area_script(&AddAreaOptions {
            title: "Home \"Base\"".into(),
            tags: vec!["a".into(), "b".into()],
        })
        .unwrap();
        assert!(script.contains("make new area with properties {name:\"Home \\\"Base\\\"\", tag names:\"a, b\"}"));
        assert!(matches!(
            add_area_script(&AddAreaOptions::default()),
            Err(ChannelError::MissingTitle)
        ));
    }

    #[test]
    fn trash_script_quotes_ids() {
        let script = trash_script(&["A1".to_string(), "B\"2".to_string()]).unwrap();
        assert!(script.contains("repeat with todoID in {\"A1\", \"B\\\"2\"}"));
        assert!(script.contains("delete to do id todoID"));
        assert!(matches!(trash_script(&[]), Err(ChannelError::MissingTarget)));
    }
}
