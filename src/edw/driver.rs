//! Runs benchmark queries against a ready warehouse cluster, one at a time
//! or through a bounded worker pool.

use crate::config::EdwConfig;
use crate::core::error::ProvisionError;
use crate::core::resource::ResourceHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use strum::{Display, EnumString};
use tokio::sync::Semaphore;

pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Concurrent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTask {
    pub id: String,
    pub query: String,
    /// Identifier of the cluster the query is meant for.
    pub cluster: String,
}

impl QueryTask {
    pub fn new(
        id: impl Into<String>,
        query: impl Into<String>,
        cluster: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            cluster: cluster.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryResult {
    pub task_id: String,
    /// Position of the task in the submitted batch.
    pub index: usize,
    pub duration: Duration,
    pub success: bool,
    pub error: Option<String>,
}

impl QueryResult {
    fn succeeded(index: usize, task_id: String, duration: Duration) -> Self {
        Self {
            task_id,
            index,
            duration,
            success: true,
            error: None,
        }
    }

    fn failed(index: usize, task_id: String, duration: Duration, error: String) -> Self {
        Self {
            task_id,
            index,
            duration,
            success: false,
            error: Some(error),
        }
    }
}

/// Results of one batch, ordered by input position.
#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub results: Vec<QueryResult>,
    pub wall_time: Duration,
}

impl QueryReport {
    pub fn get(&self, task_id: &str) -> Option<&QueryResult> {
        self.results.iter().find(|r| r.task_id == task_id)
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn total_query_time(&self) -> Duration {
        self.results.iter().map(|r| r.duration).sum()
    }
}

/// Executes one query. Blocks until the query finishes.
pub trait QueryRunner: Send + Sync {
    fn run(&self, cluster: &ResourceHandle, task: &QueryTask) -> anyhow::Result<()>;
}

pub struct QueryExecutionDriver {
    runner: Arc<dyn QueryRunner>,
    mode: ExecutionMode,
    concurrency: usize,
    query_timeout: Option<Duration>,
}

impl QueryExecutionDriver {
    pub fn new(runner: Arc<dyn QueryRunner>, mode: ExecutionMode, concurrency: usize) -> Self {
        Self {
            runner,
            mode,
            concurrency: concurrency.max(1),
            query_timeout: None,
        }
    }

    /// Driver with the execution mode, pool size and query timeout from the
    /// `[edw]` config section.
    pub fn from_config(runner: Arc<dyn QueryRunner>, config: &EdwConfig) -> Self {
        Self::new(
            runner,
            config.query_execution_mode,
            config.cluster_concurrency,
        )
        .with_query_timeout(config.query_timeout())
    }

    /// Record a query as failed once it runs longer than `timeout`.
    ///
    /// The query itself is not interrupted and keeps its worker slot until it
    /// returns.
    pub fn with_query_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.query_timeout = timeout;
        self
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Number of queries allowed in flight at once.
    pub fn pool_size(&self) -> usize {
        match self.mode {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Concurrent => self.concurrency,
        }
    }

    /// Run every task and collect one result per task.
    ///
    /// Individual query failures are recorded, never returned. Only a cluster
    /// that is not ready aborts the batch, before anything runs.
    pub async fn execute(
        &self,
        cluster: &ResourceHandle,
        tasks: Vec<QueryTask>,
    ) -> Result<QueryReport, ProvisionError> {
        if !cluster.state().is_usable() {
            return Err(ProvisionError::NotReady {
                name: cluster.name().to_string(),
                state: cluster.state(),
            });
        }

        let pool_size = self.pool_size();
        tracing::info!(
            "Running {} queries on '{}' in {} mode (pool size {})",
            tasks.len(),
            cluster.name(),
            self.mode,
            pool_size
        );

        let started = Instant::now();
        let cluster = Arc::new(cluster.clone());
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let mut results = Vec::with_capacity(tasks.len());
        let mut in_flight = Vec::with_capacity(tasks.len());

        for (index, task) in tasks.into_iter().enumerate() {
            // Permits are taken in input order, so dispatch follows input order.
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                results.push(QueryResult::failed(
                    index,
                    task.id,
                    Duration::ZERO,
                    "worker pool closed".into(),
                ));
                continue;
            };

            let task_id = task.id.clone();
            let timed_out_id = task.id.clone();
            let runner = Arc::clone(&self.runner);
            let cluster = Arc::clone(&cluster);
            let query_timeout = self.query_timeout;

            let worker = tokio::spawn(async move {
                let work = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    run_query(runner.as_ref(), &cluster, index, task)
                });
                match query_timeout {
                    Some(limit) => match tokio::time::timeout(limit, work).await {
                        Ok(joined) => joined,
                        Err(_) => Ok(QueryResult::failed(
                            index,
                            timed_out_id,
                            limit,
                            format!("query timed out after {limit:?}"),
                        )),
                    },
                    None => work.await,
                }
            });
            in_flight.push((index, task_id, worker));
        }

        for (index, task_id, worker) in in_flight {
            let result = match worker.await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) | Err(e) => QueryResult::failed(
                    index,
                    task_id,
                    Duration::ZERO,
                    format!("query worker failed: {e}"),
                ),
            };
            if let Some(error) = &result.error {
                tracing::warn!("Query {} failed: {}", result.task_id, error);
            }
            results.push(result);
        }
        results.sort_by_key(|r| r.index);

        let report = QueryReport {
            results,
            wall_time: started.elapsed(),
        };
        tracing::info!(
            "Finished {} queries in {:?}: {} succeeded, {} failed",
            report.results.len(),
            report.wall_time,
            report.succeeded(),
            report.failed()
        );
        Ok(report)
    }
}

fn run_query(
    runner: &dyn QueryRunner,
    cluster: &ResourceHandle,
    index: usize,
    task: QueryTask,
) -> QueryResult {
    if task.cluster != cluster.name() {
        return QueryResult::failed(
            index,
            task.id,
            Duration::ZERO,
            format!(
                "query targets cluster '{}' but ran against '{}'",
                task.cluster,
                cluster.name()
            ),
        );
    }

    let start = Instant::now();
    let outcome = runner.run(cluster, &task);
    let duration = start.elapsed();
    match outcome {
        Ok(()) => {
            tracing::debug!("Query {} finished in {:?}", task.id, duration);
            QueryResult::succeeded(index, task.id, duration)
        }
        Err(e) => QueryResult::failed(index, task.id, duration, format!("{e:#}")),
    }
}
