//! Argument lists for the `task` CLI
//!
//! Everything here is pure so the exact invocations can be tested without a
//! task binary.

use crate::queue::{Credentials, NewTask, TaskEdit, TaskModification, TaskOperation};

const NO_CONFIRM: &str = "rc.confirmation=off";

/// One `task` invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskCommand {
    pub args: Vec<String>,
    /// Bulk operations keep going when a single task fails
    pub continue_on_error: bool,
}

impl TaskCommand {
    fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            continue_on_error: false,
        }
    }

    fn tolerant(mut self) -> Self {
        self.continue_on_error = true;
        self
    }
}

/// Point the workspace at the user's sync replica
pub fn config_commands(credentials: &Credentials, sync_origin: &str) -> Vec<TaskCommand> {
    [
        ("sync.encryption_secret", credentials.encryption_secret.as_str()),
        ("sync.server.origin", sync_origin),
        ("sync.server.client_id", credentials.client_id.as_str()),
    ]
    .into_iter()
    .map(|(key, value)| TaskCommand::new(["config", key, value, NO_CONFIRM]))
    .collect()
}

pub fn sync_command() -> TaskCommand {
    TaskCommand::new(["sync"])
}

/// Every task in the replica as a JSON array
pub fn export_command() -> TaskCommand {
    TaskCommand::new(["export"])
}

/// Commands performing `operation`, in order
pub fn operation_commands(operation: &TaskOperation) -> Vec<TaskCommand> {
    match operation {
        TaskOperation::AddTask(task) => add_commands(task),
        TaskOperation::EditTask(edit) => vec![edit_command(edit)],
        TaskOperation::ModifyTask(modification) => modify_commands(modification),
        TaskOperation::CompleteTask(task) => vec![done_command(&task.task_uuid)],
        TaskOperation::CompleteTasks(tasks) => tasks
            .task_uuids
            .iter()
            .map(|uuid| done_command(uuid).tolerant())
            .collect(),
        TaskOperation::DeleteTask(task) => vec![delete_command(&task.task_uuid)],
        TaskOperation::DeleteTasks(tasks) => tasks
            .task_uuids
            .iter()
            .map(|uuid| delete_command(uuid).tolerant())
            .collect(),
    }
}

fn add_commands(task: &NewTask) -> Vec<TaskCommand> {
    let mut args = vec!["add".to_string(), task.description.clone()];

    push_attr(&mut args, "project", task.project.as_deref());
    push_attr(&mut args, "priority", task.priority.as_deref());
    push_attr(&mut args, "due", task.due.as_deref());
    push_attr(&mut args, "start", task.start.as_deref());
    push_attr(&mut args, "end", task.end.as_deref());
    // recur is only accepted on tasks with a due date
    if non_empty(task.due.as_deref()).is_some() {
        push_attr(&mut args, "recur", task.recur.as_deref());
    }
    if !task.depends.is_empty() {
        args.push(format!("depends:{}", task.depends.join(",")));
    }
    args.extend(
        task.tags
            .iter()
            .filter(|tag| !tag.trim().is_empty())
            .map(|tag| format!("+{}", tag.trim().replace(' ', "_"))),
    );

    let mut commands = vec![TaskCommand::new(args)];
    commands.extend(
        task.annotations
            .iter()
            .filter(|annotation| !annotation.description.trim().is_empty())
            .map(|annotation| {
                TaskCommand::new([
                    NO_CONFIRM,
                    "+LATEST",
                    "annotate",
                    annotation.description.as_str(),
                ])
            }),
    );
    commands
}

fn edit_command(edit: &TaskEdit) -> TaskCommand {
    let mut args = vec![edit.task_id.clone(), "modify".to_string()];

    push_attr(&mut args, "description", edit.description.as_deref());
    push_attr(&mut args, "project", edit.project.as_deref());
    push_attr(&mut args, "start", edit.start.as_deref());
    push_attr(&mut args, "entry", edit.entry.as_deref());
    if let Some(wait) = non_empty(edit.wait.as_deref()) {
        // Dates without a time wait until the start of that day
        if wait.contains('T') {
            args.push(format!("wait:{wait}"));
        } else {
            args.push(format!("wait:{wait}T00:00:00"));
        }
    }
    push_attr(&mut args, "end", edit.end.as_deref());
    if !edit.depends.is_empty() {
        args.push(format!("depends:{}", edit.depends.join(",")));
    }
    push_attr(&mut args, "due", edit.due.as_deref());
    push_attr(&mut args, "recur", edit.recur.as_deref());
    args.extend(tag_changes(&edit.tags));
    args.push(NO_CONFIRM.to_string());

    TaskCommand::new(args)
}

fn modify_commands(modification: &TaskModification) -> Vec<TaskCommand> {
    let id = modification.task_id.as_str();
    let mut changes = Vec::new();

    // Present-but-empty values clear the attribute
    if let Some(description) = &modification.description {
        changes.push(format!("description:{description}"));
    }
    for (name, value) in [
        ("project", &modification.project),
        ("priority", &modification.priority),
        ("due", &modification.due),
    ] {
        if let Some(value) = value {
            changes.push(format!("{name}:{value}"));
        }
    }
    changes.extend(tag_changes(&modification.tags));

    let mut commands = Vec::new();
    if !changes.is_empty() {
        let mut args = vec![id.to_string(), "modify".to_string()];
        args.extend(changes);
        args.push(NO_CONFIRM.to_string());
        commands.push(TaskCommand::new(args));
    }

    match modification.status.as_deref() {
        Some("completed") => commands.push(done_command(id)),
        Some("deleted") => commands.push(delete_command(id)),
        _ => {}
    }

    commands
}

fn done_command(task: &str) -> TaskCommand {
    TaskCommand::new([task, "done", NO_CONFIRM])
}

fn delete_command(task: &str) -> TaskCommand {
    TaskCommand::new([task, "delete", NO_CONFIRM])
}

/// `+tag` adds, `-tag` removes, bare tags are added
fn tag_changes(tags: &[String]) -> impl Iterator<Item = String> + '_ {
    tags.iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty() && *tag != "+" && *tag != "-")
        .map(|tag| {
            if tag.starts_with('+') || tag.starts_with('-') {
                tag.replace(' ', "_")
            } else {
                format!("+{}", tag.replace(' ', "_"))
            }
        })
}

fn push_attr(args: &mut Vec<String>, name: &str, value: Option<&str>) {
    if let Some(value) = non_empty(value) {
        args.push(format!("{name}:{value}"));
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{Annotation, TaskRef, TaskRefs};

    fn args(command: &TaskCommand) -> Vec<&str> {
        command.args.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_config_commands() {
        let credentials = Credentials {
            email: "alice@example.com".into(),
            client_id: "client-a".into(),
            encryption_secret: "s3cret".into(),
        };
        let commands = config_commands(&credentials, "http://sync:8080");

        assert_eq!(commands.len(), 3);
        assert_eq!(
            args(&commands[0]),
            ["config", "sync.encryption_secret", "s3cret", "rc.confirmation=off"]
        );
        assert_eq!(
            args(&commands[1]),
            ["config", "sync.server.origin", "http://sync:8080", "rc.confirmation=off"]
        );
        assert_eq!(
            args(&commands[2]),
            ["config", "sync.server.client_id", "client-a", "rc.confirmation=off"]
        );
    }

    #[test]
    fn test_add_arguments() {
        let task = NewTask {
            description: "Water the plants".into(),
            project: Some("home".into()),
            priority: Some("H".into()),
            due: Some("2026-10-20".into()),
            recur: Some("weekly".into()),
            tags: vec!["garden work".into(), " ".into()],
            annotations: vec![Annotation {
                entry: None,
                description: "use rain water".into(),
            }],
            ..Default::default()
        };

        let commands = operation_commands(&TaskOperation::AddTask(task));
        assert_eq!(
            args(&commands[0]),
            [
                "add",
                "Water the plants",
                "project:home",
                "priority:H",
                "due:2026-10-20",
                "recur:weekly",
                "+garden_work"
            ]
        );
        assert_eq!(
            args(&commands[1]),
            ["rc.confirmation=off", "+LATEST", "annotate", "use rain water"]
        );
    }

    #[test]
    fn test_recur_requires_due() {
        let task = NewTask {
            description: "Stretch".into(),
            recur: Some("daily".into()),
            ..Default::default()
        };

        let commands = operation_commands(&TaskOperation::AddTask(task));
        assert_eq!(args(&commands[0]), ["add", "Stretch"]);
    }

    #[test]
    fn test_edit_arguments() {
        let edit = TaskEdit {
            task_id: "8f14e45f".into(),
            description: Some("Renamed".into()),
            wait: Some("2026-11-01".into()),
            depends: vec!["a1".into(), "b2".into()],
            tags: vec!["urgent".into(), "-later".into()],
            ..Default::default()
        };

        let commands = operation_commands(&TaskOperation::EditTask(edit));
        assert_eq!(
            args(&commands[0]),
            [
                "8f14e45f",
                "modify",
                "description:Renamed",
                "wait:2026-11-01T00:00:00",
                "depends:a1,b2",
                "+urgent",
                "-later",
                "rc.confirmation=off"
            ]
        );
    }

    #[test]
    fn test_modify_with_status() {
        let modification = TaskModification {
            task_id: "7".into(),
            project: Some(String::new()),
            status: Some("completed".into()),
            ..Default::default()
        };

        let commands = operation_commands(&TaskOperation::ModifyTask(modification));
        assert_eq!(commands.len(), 2);
        assert_eq!(args(&commands[0]), ["7", "modify", "project:", "rc.confirmation=off"]);
        assert_eq!(args(&commands[1]), ["7", "done", "rc.confirmation=off"]);

        let deleted = TaskModification {
            task_id: "7".into(),
            status: Some("deleted".into()),
            ..Default::default()
        };
        let commands = operation_commands(&TaskOperation::ModifyTask(deleted));
        assert_eq!(commands.len(), 1);
        assert_eq!(args(&commands[0]), ["7", "delete", "rc.confirmation=off"]);
    }

    #[test]
    fn test_complete_and_delete() {
        let single = operation_commands(&TaskOperation::CompleteTask(TaskRef {
            task_uuid: "u1".into(),
        }));
        assert_eq!(args(&single[0]), ["u1", "done", "rc.confirmation=off"]);
        assert!(!single[0].continue_on_error);

        let bulk = operation_commands(&TaskOperation::DeleteTasks(TaskRefs {
            task_uuids: vec!["u1".into(), "u2".into()],
        }));
        assert_eq!(bulk.len(), 2);
        assert_eq!(args(&bulk[1]), ["u2", "delete", "rc.confirmation=off"]);
        assert!(bulk.iter().all(|c| c.continue_on_error));
    }
}
