//! Background maintenance tasks of a lookup pipeline.

use tokio::task::JoinHandle;
use tracing::debug;

/// Owns the spawned maintenance tasks; aborts them on shutdown or drop
#[derive(Debug, Default)]
pub struct MaintenanceHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    pub(crate) fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self { tasks }
    }

    /// Number of tasks still running
    pub fn running(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }

    pub fn shutdown(mut self) {
        self.abort_all();
    }

    fn abort_all(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        debug!("Maintenance tasks stopped");
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        if !self.tasks.is_empty() {
            self.abort_all();
        }
    }
}
