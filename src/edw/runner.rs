use super::driver::{QueryRunner, QueryTask};
use super::ClusterConnection;
use crate::config::EdwConfig;
use crate::core::command::CommandRunner;
use crate::core::resource::ResourceHandle;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Runs each query through an external SQL client.
///
/// The client argv may contain `{cluster}`, `{database}` and `{user}`
/// placeholders. The query text is appended as the last argument.
pub struct CommandQueryRunner {
    client: Vec<String>,
    connection: ClusterConnection,
    runner: Arc<dyn CommandRunner>,
}

impl CommandQueryRunner {
    pub fn new(
        client: Vec<String>,
        connection: ClusterConnection,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            client,
            connection,
            runner,
        }
    }

    /// Runner for the client command configured as `edw.client_command`.
    pub fn from_config(
        config: &EdwConfig,
        connection: ClusterConnection,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self::new(config.client_command.clone(), connection, runner)
    }

    pub fn argv(&self, task: &QueryTask) -> Vec<String> {
        let database = self.connection.database.as_deref().unwrap_or_default();
        let user = self.connection.user.as_deref().unwrap_or_default();
        self.client
            .iter()
            .map(|arg| {
                arg.replace("{cluster}", &self.connection.cluster_identifier)
                    .replace("{database}", database)
                    .replace("{user}", user)
            })
            .chain(std::iter::once(task.query.clone()))
            .collect()
    }
}

impl QueryRunner for CommandQueryRunner {
    fn run(&self, _cluster: &ResourceHandle, task: &QueryTask) -> Result<()> {
        if self.client.is_empty() {
            anyhow::bail!("no query client command configured");
        }
        self.runner
            .run(&self.argv(task))?
            .ensure_success()
            .with_context(|| format!("query {} failed", task.id))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::{CommandInvocation, MockCommandRunner};
    use crate::core::resource::{LifecycleState, ResourceKind, ResourceSpec};

    fn connection() -> ClusterConnection {
        ClusterConnection {
            cluster_identifier: "edw-1".into(),
            database: Some("tpch".into()),
            user: Some("bench".into()),
            password: None,
        }
    }

    fn client() -> Vec<String> {
        ["psql", "-h", "{cluster}", "-d", "{database}", "-U", "{user}", "-c"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn cluster() -> ResourceHandle {
        let mut handle = ResourceHandle::new(
            ResourceSpec::builder(ResourceKind::DataWarehouseCluster, "edw-1").build(),
        );
        handle.set_state(LifecycleState::Ready);
        handle
    }

    fn invocation(argv: &[String], exit_code: i32, stderr: &str) -> CommandInvocation {
        CommandInvocation {
            argv: argv.to_vec(),
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    #[test]
    fn test_argv_substitutes_connection() {
        let runner = CommandQueryRunner::new(
            client(),
            connection(),
            Arc::new(MockCommandRunner::new()),
        );
        let task = QueryTask::new("q1", "select count(*) from lineitem", "edw-1");
        assert_eq!(
            runner.argv(&task),
            vec![
                "psql",
                "-h",
                "edw-1",
                "-d",
                "tpch",
                "-U",
                "bench",
                "-c",
                "select count(*) from lineitem"
            ]
        );
    }

    #[test]
    fn test_client_from_config() {
        let config = EdwConfig {
            client_command: client(),
            ..EdwConfig::default()
        };
        let runner = CommandQueryRunner::from_config(
            &config,
            connection(),
            Arc::new(MockCommandRunner::new()),
        );
        let argv = runner.argv(&QueryTask::new("q1", "select 1", "edw-1"));
        assert_eq!(argv[0], "psql");
        assert_eq!(argv[2], "edw-1");
        assert_eq!(argv.last().map(String::as_str), Some("select 1"));
    }

    #[test]
    fn test_successful_query() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .withf(|argv| argv.last().map(String::as_str) == Some("select 1"))
            .times(1)
            .returning(|argv| Ok(invocation(argv, 0, "")));
        let runner = CommandQueryRunner::new(client(), connection(), Arc::new(mock));

        runner
            .run(&cluster(), &QueryTask::new("q1", "select 1", "edw-1"))
            .unwrap();
    }

    #[test]
    fn test_failed_query_reports_stderr() {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .returning(|argv| Ok(invocation(argv, 1, "relation \"nope\" does not exist")));
        let runner = CommandQueryRunner::new(client(), connection(), Arc::new(mock));

        let err = runner
            .run(&cluster(), &QueryTask::new("q2", "select * from nope", "edw-1"))
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("query q2 failed"));
        assert!(message.contains("does not exist"));
    }

    #[test]
    fn test_empty_client_is_an_error() {
        let runner = CommandQueryRunner::new(
            Vec::new(),
            connection(),
            Arc::new(MockCommandRunner::new()),
        );
        assert!(runner
            .run(&cluster(), &QueryTask::new("q1", "select 1", "edw-1"))
            .is_err());
    }
}
