use std::any::Any;
use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::Result;

/// Relaunches long-running tasks after a cooldown when they fail.
///
/// A task fails by returning `Err` or by panicking. Each launch calls the
/// factory again, so every relaunch starts from a clean initial state.
/// Supervision ends when the task returns `Ok(())` or shutdown is signalled.
#[derive(Clone)]
pub struct Supervisor {
    cooldown: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Supervisor {
    pub fn new(cooldown: Duration, shutdown: watch::Receiver<bool>) -> Self {
        Self { cooldown, shutdown }
    }

    /// Run `task` on its own tokio task, relaunching it on failure
    pub fn supervise<F, Fut>(&self, name: impl Into<String>, task: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let name = name.into();
        let cooldown = self.cooldown;
        let mut shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut launches: u64 = 0;

            loop {
                if *shutdown.borrow() {
                    break;
                }

                launches += 1;
                info!(task = %name, launch = launches, "Starting supervised task");
                let mut handle = tokio::spawn(task());

                let outcome = tokio::select! {
                    joined = &mut handle => joined,
                    _ = wait_for_shutdown(&mut shutdown) => {
                        handle.abort();
                        info!(task = %name, "Supervised task stopped by shutdown");
                        break;
                    }
                };

                match outcome {
                    Ok(Ok(())) => {
                        info!(task = %name, "Supervised task finished");
                        break;
                    }
                    Ok(Err(e)) => {
                        error!(task = %name, error = %e, "Supervised task failed");
                    }
                    Err(join_err) if join_err.is_panic() => {
                        let message = panic_message(join_err.into_panic());
                        error!(task = %name, panic = %message, "Supervised task panicked");
                    }
                    Err(join_err) => {
                        warn!(task = %name, error = %join_err, "Supervised task was cancelled");
                        break;
                    }
                }

                warn!(
                    task = %name,
                    cooldown_secs = cooldown.as_secs(),
                    "Relaunching task after cooldown"
                );
                tokio::select! {
                    _ = tokio::time::sleep(cooldown) => {}
                    _ = wait_for_shutdown(&mut shutdown) => break,
                }
            }
        })
    }
}

/// Resolve once shutdown is signalled. Never resolves if the sender is gone.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
