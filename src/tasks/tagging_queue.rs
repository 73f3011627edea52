use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::ai::ImageTagger;
use crate::db::entities::{image, prelude::Image};
use crate::services::analysis_service;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Tagging queue is full")]
    Full,
    #[error("Tagging worker has stopped")]
    Closed,
}

/// Lifecycle of one tagging task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Completed { tags_added: Vec<String> },
    Failed { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TaggingTask {
    pub id: Uuid,
    pub image_id: i32,
    #[serde(skip)]
    pub user_id: i32,
    #[serde(flatten)]
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct TaggingJob {
    task_id: Uuid,
    image_id: i32,
}

type TaskMap = Arc<DashMap<Uuid, TaggingTask>>;

/// Finished tasks stay visible this long after their last update.
const FINISHED_TASK_RETENTION_SECS: i64 = 60 * 60;
/// Upper bound on finished tasks kept, oldest evicted first.
const MAX_FINISHED_TASKS: usize = 1000;

/// Bounded queue of AI tagging jobs served by a single worker task.
///
/// Finished task records are pruned after [`FINISHED_TASK_RETENTION_SECS`].
#[derive(Clone)]
pub struct TaggingQueue {
    sender: mpsc::Sender<TaggingJob>,
    tasks: TaskMap,
}

impl TaggingQueue {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(db: DatabaseConnection, tagger: Arc<ImageTagger>, capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let tasks: TaskMap = Arc::new(DashMap::new());
        tokio::spawn(run_worker(db, tagger, tasks.clone(), receiver));
        info!(capacity, "Tagging queue started.");
        Self { sender, tasks }
    }

    pub fn enqueue(&self, user_id: i32, image: &image::Model) -> Result<Uuid, QueueError> {
        let task_id = Uuid::new_v4();
        let now = Utc::now();
        self.tasks.insert(
            task_id,
            TaggingTask {
                id: task_id,
                image_id: image.id,
                user_id,
                state: TaskState::Queued,
                created_at: now,
                updated_at: now,
            },
        );

        let job = TaggingJob { task_id, image_id: image.id };
        match self.sender.try_send(job) {
            Ok(()) => {
                info!(%task_id, image_id = image.id, "Queued image for AI tagging.");
                Ok(task_id)
            }
            Err(e) => {
                self.tasks.remove(&task_id);
                let err = match e {
                    mpsc::error::TrySendError::Full(_) => QueueError::Full,
                    mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
                };
                warn!(image_id = image.id, error = %err, "Could not queue image for AI tagging.");
                Err(err)
            }
        }
    }

    /// A task, visible only to the user who queued it.
    pub fn get(&self, task_id: Uuid, user_id: i32) -> Option<TaggingTask> {
        self.tasks
            .get(&task_id)
            .filter(|task| task.user_id == user_id)
            .map(|task| task.value().clone())
    }

    /// The user's tasks, newest first.
    pub fn list_for_user(&self, user_id: i32) -> Vec<TaggingTask> {
        let mut tasks: Vec<TaggingTask> = self
            .tasks
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tasks
    }
}

fn set_state(tasks: &TaskMap, task_id: Uuid, state: TaskState) {
    if let Some(mut task) = tasks.get_mut(&task_id) {
        task.state = state;
        task.updated_at = Utc::now();
    }
}

async fn run_worker(
    db: DatabaseConnection,
    tagger: Arc<ImageTagger>,
    tasks: TaskMap,
    mut receiver: mpsc::Receiver<TaggingJob>,
) {
    while let Some(job) = receiver.recv().await {
        set_state(&tasks, job.task_id, TaskState::Running);

        let state = match Image::find_by_id(job.image_id).one(&db).await {
            Ok(Some(image)) => match analysis_service::analyze_and_tag(&db, &tagger, &image).await {
                Ok(added) => {
                    info!(task_id = %job.task_id, image_id = job.image_id, added = added.len(), "AI tagging completed.");
                    TaskState::Completed {
                        tags_added: added.into_iter().map(|t| t.name).collect(),
                    }
                }
                Err(e) => {
                    error!(task_id = %job.task_id, image_id = job.image_id, error = %e, "AI tagging failed.");
                    TaskState::Failed { error: e.to_string() }
                }
            },
            Ok(None) => {
                warn!(task_id = %job.task_id, image_id = job.image_id, "Image was deleted before tagging.");
                TaskState::Failed { error: "Image no longer exists".to_string() }
            }
            Err(e) => {
                error!(task_id = %job.task_id, error = %e, "Failed to load image for tagging.");
                TaskState::Failed { error: format!("Database error: {e}") }
            }
        };
        set_state(&tasks, job.task_id, state);
        prune_finished(
            &tasks,
            Utc::now(),
            TimeDelta::seconds(FINISHED_TASK_RETENTION_SECS),
            MAX_FINISHED_TASKS,
        );
    }
    info!("Tagging worker stopped.");
}

impl TaskState {
    fn is_finished(&self) -> bool {
        matches!(self, TaskState::Completed { .. } | TaskState::Failed { .. })
    }
}

/// Drops finished tasks older than `retention`, then the oldest finished
/// ones beyond `max_finished`. Queued and running tasks are never touched.
fn prune_finished(tasks: &TaskMap, now: DateTime<Utc>, retention: TimeDelta, max_finished: usize) {
    let cutoff = now - retention;
    tasks.retain(|_, task| !(task.state.is_finished() && task.updated_at < cutoff));

    let mut finished: Vec<(DateTime<Utc>, Uuid)> = tasks
        .iter()
        .filter(|entry| entry.state.is_finished())
        .map(|entry| (entry.updated_at, entry.id))
        .collect();
    if finished.len() <= max_finished {
        return;
    }
    finished.sort();
    let excess = finished.len() - max_finished;
    for (_, task_id) in finished.into_iter().take(excess) {
        tasks.remove(&task_id);
    }
    debug!(evicted = excess, "Pruned finished tagging tasks.");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::testing::ScriptedBackend;
    use crate::db::services::{image_service, tag_service, user_service};
    use crate::db::test_support::memory_db;
    use std::time::Duration;
    use tempfile::tempdir;

    async fn wait_for_finish(queue: &TaggingQueue, task_id: Uuid, user_id: i32) -> TaggingTask {
        for _ in 0..200 {
            let task = queue.get(task_id, user_id).unwrap();
            if matches!(task.state, TaskState::Completed { .. } | TaskState::Failed { .. }) {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} did not finish");
    }

    #[tokio::test]
    async fn test_queued_task_completes_and_tags_image() {
        let db = memory_db().await;
        let dir = tempdir().unwrap();
        let path = dir.path().join("1-1.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nrest").unwrap();

        let user = user_service::create_user(&db, "alice".into(), "a@example.com".into(), "h".into())
            .await
            .unwrap();
        let image = image_service::create_image(
            &db,
            image_service::NewImage {
                user_id: user.id,
                filename: "cat.png".into(),
                file_path: path.to_string_lossy().into_owned(),
                thumbnail_path: path.to_string_lossy().into_owned(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let backend = Arc::new(ScriptedBackend::new(vec![Ok("cat, sofa".into())]));
        let tagger = Arc::new(ImageTagger::new(backend, "vision".into()));
        let queue = TaggingQueue::start(db.clone(), tagger, 4);

        let task_id = queue.enqueue(user.id, &image).unwrap();
        let task = wait_for_finish(&queue, task_id, user.id).await;
        assert_eq!(
            task.state,
            TaskState::Completed { tags_added: vec!["cat".into(), "sofa".into()] }
        );
        assert_eq!(
            tag_service::used_tag_names(&db, user.id).await.unwrap(),
            vec!["cat".to_string(), "sofa".to_string()]
        );

        // Other users cannot see the task.
        assert!(queue.get(task_id, user.id + 1).is_none());
        assert_eq!(queue.list_for_user(user.id).len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_recorded() {
        let db = memory_db().await;
        let user = user_service::create_user(&db, "alice".into(), "a@example.com".into(), "h".into())
            .await
            .unwrap();
        let image = image_service::create_image(
            &db,
            image_service::NewImage {
                user_id: user.id,
                filename: "gone.png".into(),
                file_path: "/nonexistent/gone.png".into(),
                thumbnail_path: "/nonexistent/gone.png".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let backend = Arc::new(ScriptedBackend::new(vec![]));
        let tagger = Arc::new(ImageTagger::new(backend, "vision".into()));
        let queue = TaggingQueue::start(db, tagger, 4);

        let task_id = queue.enqueue(user.id, &image).unwrap();
        let task = wait_for_finish(&queue, task_id, user.id).await;
        assert!(matches!(task.state, TaskState::Failed { .. }));
    }

    fn task_at(state: TaskState, updated_at: DateTime<Utc>) -> TaggingTask {
        TaggingTask {
            id: Uuid::new_v4(),
            image_id: 1,
            user_id: 1,
            state,
            created_at: updated_at,
            updated_at,
        }
    }

    #[test]
    fn test_prune_drops_expired_and_excess_finished_tasks() {
        let now = Utc::now();
        let tasks: TaskMap = Arc::new(DashMap::new());
        let insert = |task: TaggingTask| {
            let id = task.id;
            tasks.insert(id, task);
            id
        };

        let expired = insert(task_at(TaskState::Failed { error: "x".into() }, now - TimeDelta::hours(2)));
        let old_queued = insert(task_at(TaskState::Queued, now - TimeDelta::hours(5)));
        let running = insert(task_at(TaskState::Running, now - TimeDelta::hours(3)));
        let oldest_done = insert(task_at(
            TaskState::Completed { tags_added: vec![] },
            now - TimeDelta::minutes(30),
        ));
        let middle_done = insert(task_at(
            TaskState::Completed { tags_added: vec![] },
            now - TimeDelta::minutes(20),
        ));
        let newest_done = insert(task_at(
            TaskState::Completed { tags_added: vec![] },
            now - TimeDelta::minutes(10),
        ));

        prune_finished(&tasks, now, TimeDelta::hours(1), 2);

        assert!(!tasks.contains_key(&expired));
        assert!(!tasks.contains_key(&oldest_done));
        assert!(tasks.contains_key(&middle_done));
        assert!(tasks.contains_key(&newest_done));
        assert!(tasks.contains_key(&old_queued));
        assert!(tasks.contains_key(&running));
        assert_eq!(tasks.len(), 4);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(TaskState::Completed { tags_added: vec!["a".into()] }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "completed", "tags_added": ["a"]}));
        let json = serde_json::to_value(TaskState::Queued).unwrap();
        assert_eq!(json, serde_json::json!({"status": "queued"}));
    }
}
