use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, warn};

use super::commands::{
    TaskCommand, config_commands, export_command, operation_commands, sync_command,
};
use super::export::{Task, TaskReader, parse_export};
use crate::queue::{Credentials, ExecError, Job, JobExecutor};

/// Runs jobs through the `task` CLI.
///
/// Each job gets a throwaway workspace: the user's replica is pulled with
/// `task sync`, the operation is applied, and the result is synced back.
/// Reads pull the replica the same way and `task export` it.
#[derive(Debug, Clone)]
pub struct TaskCli {
    task_bin: PathBuf,
    sync_origin: Option<String>,
}

impl TaskCli {
    pub fn new(task_bin: impl Into<PathBuf>, sync_origin: Option<String>) -> Self {
        Self {
            task_bin: task_bin.into(),
            sync_origin,
        }
    }

    /// Run one command in `workspace` and return its stdout
    async fn run(&self, workspace: &Path, command: &TaskCommand) -> Result<Vec<u8>, ExecError> {
        let rendered = self.render(command);
        debug!(command = %rendered, "Running task command");

        let output = Command::new(&self.task_bin)
            .args(&command.args)
            .current_dir(workspace)
            .env("TASKDATA", workspace.join("data"))
            .env("TASKRC", workspace.join(".taskrc"))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExecError::Spawn {
                command: rendered.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(ExecError::CommandFailed {
                command: rendered,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Command line for logs and errors, with config values hidden
    fn render(&self, command: &TaskCommand) -> String {
        let mut parts = vec![self.task_bin.display().to_string()];
        let is_config = command.args.first().is_some_and(|arg| arg == "config");
        for (i, arg) in command.args.iter().enumerate() {
            if is_config && i == 2 {
                parts.push("<value>".to_string());
            } else {
                parts.push(arg.clone());
            }
        }
        parts.join(" ")
    }

    /// Fresh workspace holding the user's synced replica
    async fn prepare_workspace(&self, credentials: &Credentials) -> Result<TempDir, ExecError> {
        let origin = self
            .sync_origin
            .as_deref()
            .ok_or(ExecError::NotConfigured("sync server origin"))?;

        let workspace = tempfile::Builder::new()
            .prefix("taskwarrior-")
            .tempdir()
            .map_err(ExecError::Workspace)?;
        let dir = workspace.path();
        tokio::fs::create_dir_all(dir.join("data"))
            .await
            .map_err(ExecError::Workspace)?;
        tokio::fs::write(dir.join(".taskrc"), b"")
            .await
            .map_err(ExecError::Workspace)?;

        for command in config_commands(credentials, origin) {
            self.run(dir, &command).await?;
        }
        self.run(dir, &sync_command()).await?;

        Ok(workspace)
    }
}

#[async_trait]
impl JobExecutor for TaskCli {
    async fn execute(&self, job: &Job) -> Result<(), ExecError> {
        let workspace = self.prepare_workspace(&job.credentials).await?;
        let dir = workspace.path();

        let mut failed = Vec::new();
        for command in operation_commands(&job.operation) {
            match self.run(dir, &command).await {
                Ok(_) => {}
                Err(e) if command.continue_on_error => {
                    warn!(job_id = %job.id, error = %e, "Task command failed, continuing");
                    failed.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        self.run(dir, &sync_command()).await?;

        if failed.is_empty() {
            Ok(())
        } else {
            Err(ExecError::CommandFailed {
                command: job.name().to_string(),
                status: format!("{} of the tasks failed", failed.len()),
                stderr: failed.join("; "),
            })
        }
    }
}

#[async_trait]
impl TaskReader for TaskCli {
    async fn fetch_tasks(&self, credentials: &Credentials) -> Result<Vec<Task>, ExecError> {
        let workspace = self.prepare_workspace(credentials).await?;
        let output = self.run(workspace.path(), &export_command()).await?;
        parse_export(&output, Utc::now())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::queue::{Credentials, TaskOperation, TaskRef, TaskRefs};
    use std::os::unix::fs::PermissionsExt;

    fn credentials() -> Credentials {
        Credentials {
            email: "alice@example.com".into(),
            client_id: "client-a".into(),
            encryption_secret: "s3cret".into(),
        }
    }

    /// Fake `task` that logs its arguments and fails on `fail-me`
    fn fake_task_bin(dir: &Path) -> (PathBuf, PathBuf) {
        let log = dir.join("calls.log");
        let script = dir.join("task");
        let body = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$*\" >> '{}'\ncase \"$*\" in *fail-me*) echo 'no such task' >&2; exit 1;; export) cat '{}';; esac\nexit 0\n",
            log.display(),
            dir.join("export.json").display()
        );
        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        (script, log)
    }

    #[tokio::test]
    async fn test_executes_full_sequence() {
        let temp_dir = TempDir::new().unwrap();
        let (bin, log) = fake_task_bin(temp_dir.path());
        let cli = TaskCli::new(bin, Some("http://sync:8080".into()));

        let job = Job::new(
            credentials(),
            TaskOperation::CompleteTask(TaskRef {
                task_uuid: "u1".into(),
            }),
        );
        cli.execute(&job).await.unwrap();

        let calls = std::fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(
            calls,
            [
                "config sync.encryption_secret s3cret rc.confirmation=off",
                "config sync.server.origin http://sync:8080 rc.confirmation=off",
                "config sync.server.client_id client-a rc.confirmation=off",
                "sync",
                "u1 done rc.confirmation=off",
                "sync",
            ]
        );

        // Bulk operations run every task and report the failures
        let job = Job::new(
            credentials(),
            TaskOperation::DeleteTasks(TaskRefs {
                task_uuids: vec!["fail-me".into(), "u2".into()],
            }),
        );
        let err = cli.execute(&job).await.unwrap_err();
        assert!(err.to_string().contains("no such task"));

        let calls = std::fs::read_to_string(&log).unwrap();
        assert!(calls.contains("u2 delete rc.confirmation=off"));
        assert!(calls.ends_with("sync\n"));

        // Single operations stop at the first failure
        let job = Job::new(
            credentials(),
            TaskOperation::DeleteTask(TaskRef {
                task_uuid: "fail-me".into(),
            }),
        );
        assert!(matches!(
            cli.execute(&job).await,
            Err(ExecError::CommandFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_requires_sync_origin() {
        let cli = TaskCli::new("task", None);
        let job = Job::new(
            credentials(),
            TaskOperation::CompleteTask(TaskRef {
                task_uuid: "u1".into(),
            }),
        );
        assert!(matches!(
            cli.execute(&job).await,
            Err(ExecError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_tasks_exports_synced_replica() {
        let temp_dir = TempDir::new().unwrap();
        let (bin, log) = fake_task_bin(temp_dir.path());
        std::fs::write(
            temp_dir.path().join("export.json"),
            r#"[{"id":1,"description":"Water the plants","status":"pending","uuid":"u1","priority":"M"},
                {"id":2,"description":"Pay rent","status":"pending","uuid":"u2","due":"20200101T000000Z"}]"#,
        )
        .unwrap();
        let cli = TaskCli::new(bin, Some("http://sync:8080".into()));

        let tasks = cli.fetch_tasks(&credentials()).await.unwrap();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].priority, "M");
        assert_eq!(tasks[1].status, "overdue");

        let calls = std::fs::read_to_string(&log).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(calls[3..], ["sync", "export"]);
    }

    #[tokio::test]
    async fn test_fetch_tasks_requires_sync_origin() {
        let cli = TaskCli::new("task", None);
        assert!(matches!(
            cli.fetch_tasks(&credentials()).await,
            Err(ExecError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_render_hides_config_values() {
        let cli = TaskCli::new("task", None);
        let rendered = cli.render(&config_commands(&credentials(), "http://sync")[0]);
        assert_eq!(rendered, "task config sync.encryption_secret <value> rc.confirmation=off");
    }
}
