//! Handle for background loops.

use tokio::task::JoinHandle;

/// Handle to a spawned periodic task. The task is aborted when the handle
/// is dropped.
#[derive(Debug)]
pub struct TaskHandle {
    task: JoinHandle<()>,
}

impl TaskHandle {
    /// Wrap a spawned task.
    pub fn new(task: JoinHandle<()>) -> Self {
        Self { task }
    }

    /// Stop the task.
    pub fn stop(self) {
        drop(self);
    }

    /// Whether the task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drop_aborts() {
        let handle = TaskHandle::new(tokio::spawn(std::future::pending::<()>()));
        assert!(!handle.is_finished());
        handle.stop();
    }

    #[tokio::test]
    async fn test_finished_task() {
        let handle = TaskHandle::new(tokio::spawn(async {}));
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(handle.is_finished());
    }
}
