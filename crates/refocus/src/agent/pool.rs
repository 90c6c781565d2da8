//! Bounded worker pool for independent runs.
//!
//! Runs share no mutable state, so the pool is just a semaphore in front of
//! a `join_all`. Cancelling one job (its own deadline) never touches the
//! others.

use super::config::PoolConfig;
use futures::future::join_all;
use std::future::Future;
use tokio::sync::Semaphore;
use tracing::debug;

/// Run `f` over every job with at most `config.concurrency` in flight.
///
/// Results come back in job order, whatever order the jobs finish in.
///
/// ```ignore
/// let results = run_pool(tasks, PoolConfig::with_concurrency(8), |task| async move {
///     RunLoop::new(&client, &tools, config.clone()).run(&task.prompt, &task.dir).await
/// })
/// .await;
/// ```
pub async fn run_pool<J, T, F, Fut>(jobs: Vec<J>, config: PoolConfig, f: F) -> Vec<T>
where
    F: Fn(J) -> Fut,
    Fut: Future<Output = T>,
{
    let permits = config.concurrency.max(1);
    let semaphore = Semaphore::new(permits);
    debug!("Pool starting: {} job(s), concurrency={permits}", jobs.len());

    let semaphore = &semaphore;
    let f = &f;
    join_all(jobs.into_iter().enumerate().map(|(index, job)| async move {
        // The semaphore is never closed, so acquiring only waits.
        let _permit = semaphore.acquire().await.ok();
        debug!("Pool job {index} started");
        f(job).await
    }))
    .await
}
