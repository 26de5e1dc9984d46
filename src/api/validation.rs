//! Request validation for task mutations
//!
//! Checks run before a job is admitted, so a rejected request never reaches
//! the queue.

use thiserror::Error;

use crate::queue::{NewTask, TaskEdit, TaskModification, TaskRef, TaskRefs};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RequestValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("task cannot depend on itself: {0}")]
    SelfDependency(String),
}

impl From<RequestValidationError> for super::error::ApiError {
    fn from(value: RequestValidationError) -> Self {
        super::error::ApiError::InvalidPayload(value.to_string())
    }
}

pub fn validate_new_task(task: &NewTask) -> Result<(), RequestValidationError> {
    require("description", &task.description)
}

pub fn validate_edit(edit: &TaskEdit) -> Result<(), RequestValidationError> {
    require("taskid", &edit.task_id)?;
    validate_dependencies(&edit.depends, &edit.task_id)
}

pub fn validate_modification(modification: &TaskModification) -> Result<(), RequestValidationError> {
    require("taskid", &modification.task_id)
}

pub fn validate_task_ref(task: &TaskRef) -> Result<(), RequestValidationError> {
    require("taskuuid", &task.task_uuid)
}

pub fn validate_task_refs(tasks: &TaskRefs) -> Result<(), RequestValidationError> {
    if tasks.task_uuids.iter().all(|uuid| uuid.trim().is_empty()) {
        return Err(RequestValidationError::MissingField("taskuuids"));
    }
    Ok(())
}

/// A task may not list itself among its dependencies
pub fn validate_dependencies(depends: &[String], task: &str) -> Result<(), RequestValidationError> {
    match depends.iter().find(|dep| dep.trim() == task.trim()) {
        Some(dep) => Err(RequestValidationError::SelfDependency(dep.clone())),
        None => Ok(()),
    }
}

fn require(field: &'static str, value: &str) -> Result<(), RequestValidationError> {
    if value.trim().is_empty() {
        Err(RequestValidationError::MissingField(field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_fields() {
        assert_eq!(
            validate_new_task(&NewTask::default()),
            Err(RequestValidationError::MissingField("description"))
        );
        assert!(
            validate_new_task(&NewTask {
                description: "Buy milk".into(),
                ..Default::default()
            })
            .is_ok()
        );

        assert_eq!(
            validate_modification(&TaskModification::default()),
            Err(RequestValidationError::MissingField("taskid"))
        );
        assert_eq!(
            validate_task_ref(&TaskRef {
                task_uuid: " ".into()
            }),
            Err(RequestValidationError::MissingField("taskuuid"))
        );
        assert_eq!(
            validate_task_refs(&TaskRefs { task_uuids: vec![] }),
            Err(RequestValidationError::MissingField("taskuuids"))
        );
    }

    #[test]
    fn test_self_dependency() {
        let edit = TaskEdit {
            task_id: "a1".into(),
            depends: vec!["b2".into(), "a1".into()],
            ..Default::default()
        };
        assert_eq!(
            validate_edit(&edit),
            Err(RequestValidationError::SelfDependency("a1".into()))
        );

        assert!(validate_dependencies(&["b2".to_string()], "a1").is_ok());
        assert!(validate_dependencies(&[], "a1").is_ok());
    }
}
