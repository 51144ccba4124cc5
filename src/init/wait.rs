// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tower::BoxError;
use tracing::error;

pub type TaskResult = Result<(), BoxError>;

/// Wait for the first task to finish and return its result
pub async fn wait_for_any_task(tasks: &mut JoinSet<TaskResult>) -> TaskResult {
    match tasks.join_next().await {
        None => Ok(()),
        Some(res) => res?,
    }
}

pub async fn wait_for_tasks_with_timeout(
    tasks: &mut JoinSet<TaskResult>,
    timeout: Duration,
) -> TaskResult {
    wait_for_tasks_with_deadline(tasks, Instant::now() + timeout).await
}

/// Wait for every task, keeping the last failure. Tasks still running at the
/// deadline are aborted.
pub async fn wait_for_tasks_with_deadline(
    tasks: &mut JoinSet<TaskResult>,
    stop_at: Instant,
) -> TaskResult {
    let mut result = Ok(());
    loop {
        match timeout_at(stop_at, tasks.join_next()).await {
            Err(_) => {
                tasks.abort_all();
                result = Err("timed out waiting for tasks to complete".into());
                break;
            }
            Ok(None) => break,
            Ok(Some(Ok(Ok(())))) => {}
            Ok(Some(Ok(Err(e)))) => result = Err(e),
            Ok(Some(Err(e))) => error!(error = %e, "Failed to join with task"),
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_failure_is_returned() {
        let mut tasks = JoinSet::new();
        tasks.spawn(async { Ok(()) });
        tasks.spawn(async { Err::<(), BoxError>("exporter failed".into()) });

        let res = wait_for_tasks_with_timeout(&mut tasks, Duration::from_secs(5)).await;
        assert_eq!(res.unwrap_err().to_string(), "exporter failed");
        assert!(tasks.is_empty());
    }

    #[tokio::test]
    async fn test_deadline_aborts_stuck_tasks() {
        let mut tasks = JoinSet::new();
        tasks.spawn(async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        let res = wait_for_tasks_with_timeout(&mut tasks, Duration::from_millis(20)).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_wait_for_any_on_empty_set() {
        let mut tasks = JoinSet::new();
        assert!(wait_for_any_task(&mut tasks).await.is_ok());
    }
}
