//! Supervisión de tareas en segundo plano
//!
//! Todas las tareas que no bloquean la respuesta (loop de entrega, worker de
//! retención, cálculos de ETA) se lanzan desde aquí. Al apagar se cancela el
//! token compartido y se espera a que terminen.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

#[derive(Clone, Default)]
pub struct BackgroundTasks {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token que reciben los loops periódicos
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[cfg(test)]
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::debug!(task = name, "Lanzando tarea en segundo plano");
        self.tracker.spawn(task);
    }

    #[cfg(test)]
    pub fn active(&self) -> usize {
        self.tracker.len()
    }

    /// Esperar a que terminen las tareas en curso sin cancelar los loops
    #[cfg(test)]
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.tracker.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }

    /// Cancelar y esperar a todas las tareas, con un límite de tiempo
    pub async fn shutdown(&self, timeout: Duration) {
        self.cancel.cancel();
        self.tracker.close();

        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => tracing::info!("✅ Tareas en segundo plano finalizadas"),
            Err(_) => tracing::warn!(
                pending = self.tracker.len(),
                "⚠️ Tiempo de espera agotado al detener tareas en segundo plano"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_shutdown_cancels_and_waits() {
        let tasks = BackgroundTasks::new();
        let stopped = Arc::new(AtomicBool::new(false));

        let token = tasks.token();
        let flag = stopped.clone();
        tasks.spawn("loop", async move {
            token.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });

        assert_eq!(tasks.active(), 1);
        tasks.shutdown(Duration::from_secs(1)).await;
        assert!(stopped.load(Ordering::SeqCst));
        assert!(tasks.is_shutting_down());
    }

    #[tokio::test]
    async fn test_wait_idle_returns_once_jobs_finish() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("job", async {
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        assert!(tasks.wait_idle(Duration::from_secs(1)).await);
        assert_eq!(tasks.active(), 0);
    }
}
