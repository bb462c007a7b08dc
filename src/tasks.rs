// Task Manager - follow-up work items derived from referral transitions.
//
// Tasks are opened by coordinator logic only, never directly by a user;
// nurses close them explicitly, and booking closes reschedule tasks
// implicitly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::referral::types::{NewTask, Task, TaskKind, TaskStatus};
use crate::storage::{ReferralStore, StoreError};

#[derive(Clone)]
pub struct TaskManager {
    store: Arc<dyn ReferralStore>,
}

impl TaskManager {
    pub fn new(store: Arc<dyn ReferralStore>) -> Self {
        Self { store }
    }

    /// Open a new task unconditionally.
    pub async fn open_task(
        &self,
        referral_id: Uuid,
        kind: TaskKind,
        due_at: Option<DateTime<Utc>>,
        assigned_to: &str,
    ) -> Result<Task, StoreError> {
        let task = self
            .store
            .insert_task(NewTask {
                referral_id,
                kind,
                due_at,
                assigned_to: assigned_to.to_string(),
            })
            .await?;
        tracing::info!(
            referral_id = %referral_id,
            task_id = %task.id,
            kind = %kind,
            assigned_to = %task.assigned_to,
            "opened follow-up task"
        );
        Ok(task)
    }

    /// Open a task unless one of the same kind is already OPEN for the
    /// referral. Returns `None` when an existing task made this a no-op.
    pub async fn open_task_if_none(
        &self,
        referral_id: Uuid,
        kind: TaskKind,
        due_at: Option<DateTime<Utc>>,
        assigned_to: &str,
    ) -> Result<Option<Task>, StoreError> {
        let open = self
            .store
            .list_open_tasks(Some(referral_id), Some(kind))
            .await?;
        if !open.is_empty() {
            tracing::debug!(
                referral_id = %referral_id,
                kind = %kind,
                "open task already exists, not opening another"
            );
            return Ok(None);
        }
        Ok(Some(self.open_task(referral_id, kind, due_at, assigned_to).await?))
    }

    /// Close every OPEN task of a kind for a referral. Idempotent when
    /// none are open. Returns how many were closed.
    pub async fn close_open_tasks(
        &self,
        referral_id: Uuid,
        kind: TaskKind,
    ) -> Result<usize, StoreError> {
        let open = self
            .store
            .list_open_tasks(Some(referral_id), Some(kind))
            .await?;
        for task in &open {
            self.store.update_task_status(task.id, TaskStatus::Done).await?;
        }
        if !open.is_empty() {
            tracing::info!(
                referral_id = %referral_id,
                kind = %kind,
                closed = open.len(),
                "closed stale follow-up tasks"
            );
        }
        Ok(open.len())
    }

    /// Close one task by id. NotFound if absent; closing a DONE task is a
    /// no-op.
    pub async fn close_task(&self, task_id: Uuid) -> Result<Task, StoreError> {
        let task = self.store.get_task(task_id).await?;
        if task.status == TaskStatus::Done {
            return Ok(task);
        }
        self.store.update_task_status(task_id, TaskStatus::Done).await
    }

    /// OPEN tasks, optionally narrowed by referral and kind.
    pub async fn open_tasks(
        &self,
        referral_id: Option<Uuid>,
        kind: Option<TaskKind>,
    ) -> Result<Vec<Task>, StoreError> {
        self.store.list_open_tasks(referral_id, kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;

    fn manager() -> (TaskManager, crate::storage::memory::DemoSeed) {
        let (store, seed) = InMemoryStore::with_demo_data();
        (TaskManager::new(Arc::new(store)), seed)
    }

    #[tokio::test]
    async fn test_open_if_none_is_idempotent() {
        let (tasks, seed) = manager();
        let referral = seed.cardiology_referral;

        let first = tasks
            .open_task_if_none(referral, TaskKind::Reschedule, None, "Nursing Station")
            .await
            .unwrap();
        assert!(first.is_some());

        let second = tasks
            .open_task_if_none(referral, TaskKind::Reschedule, None, "Nursing Station")
            .await
            .unwrap();
        assert!(second.is_none());

        let open = tasks
            .open_tasks(Some(referral), Some(TaskKind::Reschedule))
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn test_close_open_tasks_idempotent() {
        let (tasks, seed) = manager();
        let referral = seed.cardiology_referral;

        tasks
            .open_task(referral, TaskKind::Reschedule, None, "Nursing Station")
            .await
            .unwrap();
        assert_eq!(tasks.close_open_tasks(referral, TaskKind::Reschedule).await.unwrap(), 1);
        assert_eq!(tasks.close_open_tasks(referral, TaskKind::Reschedule).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_task_semantics() {
        let (tasks, seed) = manager();
        let task = tasks
            .open_task(seed.cardiology_referral, TaskKind::Transport, None, "Volunteer Drivers")
            .await
            .unwrap();

        let closed = tasks.close_task(task.id).await.unwrap();
        assert_eq!(closed.status, TaskStatus::Done);

        // Closing again is a no-op, not an error.
        let again = tasks.close_task(task.id).await.unwrap();
        assert_eq!(again.status, TaskStatus::Done);

        // Missing ids surface NotFound.
        let err = tasks.close_task(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }
}
