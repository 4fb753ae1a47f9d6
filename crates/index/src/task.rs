//! Task Registry: single-process map from opaque task ids to indexing-job
//! state, with broadcast-based progress subscription.

use sleuth_core::{Error, Result, Stage, Statistics, Task, TaskId, TaskState};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One broadcast message per task state change. Carries the full snapshot
/// rather than a diff so a subscriber never has to reconstruct state from a
/// sequence of partial updates.
#[derive(Debug, Clone)]
pub struct TaskEvent(pub Task);

struct TaskEntry {
  task: Task,
  sender: broadcast::Sender<TaskEvent>,
}

/// Thread-safe map from [`TaskId`] to task state, shared across the process
/// for the lifetime of all in-flight and completed indexing jobs.
#[derive(Default)]
pub struct TaskRegistry {
  tasks: Mutex<HashMap<TaskId, TaskEntry>>,
}

impl TaskRegistry {
  pub fn new() -> Self {
    Self { tasks: Mutex::new(HashMap::new()) }
  }

  /// Register a new task in `pending` state and return its id.
  pub fn create(&self) -> TaskId {
    let task_id = TaskId(uuid::Uuid::now_v7().to_string());
    let task = Task {
      task_id: task_id.clone(),
      state: TaskState::Pending,
      progress: 0,
      stage: Stage::Parsing,
      message: "queued".to_string(),
      statistics: None,
      error: None,
    };
    let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    self.tasks.lock().expect("task registry lock poisoned").insert(task_id.clone(), TaskEntry { task, sender });
    debug!(%task_id, "task created");
    task_id
  }

  /// Update progress/stage/message on a running task, moving it to `running`
  /// on its first update.
  pub fn update(&self, task_id: &TaskId, progress: u8, stage: Stage, message: &str) -> Result<()> {
    self.mutate(task_id, |task| {
      task.state = TaskState::Running;
      task.progress = progress;
      task.stage = stage;
      task.message = message.to_string();
    })
  }

  /// Transition a task to `completed` with final statistics.
  pub fn complete(&self, task_id: &TaskId, statistics: Statistics) -> Result<()> {
    self.mutate(task_id, |task| {
      task.state = TaskState::Completed;
      task.progress = 100;
      task.message = "completed".to_string();
      task.statistics = Some(statistics);
    })
  }

  /// Transition a task to `failed` with an error message.
  pub fn fail(&self, task_id: &TaskId, error: &str) -> Result<()> {
    self.mutate(task_id, |task| {
      task.state = TaskState::Failed;
      task.message = "failed".to_string();
      task.error = Some(error.to_string());
    })
  }

  /// Current snapshot of a task.
  pub fn get(&self, task_id: &TaskId) -> Result<Task> {
    let tasks = self.tasks.lock().expect("task registry lock poisoned");
    tasks.get(task_id).map(|entry| entry.task.clone()).ok_or_else(|| Error::TaskNotFound(task_id.0.clone()))
  }

  /// Current snapshot plus a fresh event receiver, obtained atomically so no
  /// event sent between the snapshot read and the subscribe call is missed.
  pub fn subscribe(&self, task_id: &TaskId) -> Result<(Task, broadcast::Receiver<TaskEvent>)> {
    let tasks = self.tasks.lock().expect("task registry lock poisoned");
    let entry = tasks.get(task_id).ok_or_else(|| Error::TaskNotFound(task_id.0.clone()))?;
    Ok((entry.task.clone(), entry.sender.subscribe()))
  }

  fn mutate(&self, task_id: &TaskId, f: impl FnOnce(&mut Task)) -> Result<()> {
    let mut tasks = self.tasks.lock().expect("task registry lock poisoned");
    let entry = tasks.get_mut(task_id).ok_or_else(|| Error::TaskNotFound(task_id.0.clone()))?;
    f(&mut entry.task);
    // No active receivers is the common case; `send` returning an error here
    // just means nobody is currently polling this task, not a failure.
    let _ = entry.sender.send(TaskEvent(entry.task.clone()));
    Ok(())
  }
}

/// Reports indexer progress back into a [`TaskRegistry`] without giving the
/// indexer a direct dependency on channels or subscribers.
pub trait ProgressSink: Send + Sync {
  fn report(&self, progress: u8, stage: Stage, message: &str);
}

pub struct RegistryProgressSink<'a> {
  registry: &'a TaskRegistry,
  task_id: TaskId,
}

impl<'a> RegistryProgressSink<'a> {
  pub fn new(registry: &'a TaskRegistry, task_id: TaskId) -> Self {
    Self { registry, task_id }
  }
}

impl ProgressSink for RegistryProgressSink<'_> {
  fn report(&self, progress: u8, stage: Stage, message: &str) {
    if let Err(err) = self.registry.update(&self.task_id, progress, stage, message) {
      tracing::warn!(task_id = %self.task_id, %err, "failed to report progress for vanished task");
    }
  }
}
