//! CNI exec client
//!
//! Runs plugin binaries as subprocesses. Mirrors what a container runtime
//! does: the parent environment is inherited, `CNI_*` variables are set,
//! the configuration goes to stdin and the result comes back on stdout.

use crate::error::CniError;
use crate::executor_trait::PluginExecutor;
use crate::models::{CniCommand, CniErrorReply, RuntimeEnv};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Plugin executor backed by binaries on disk
#[derive(Debug, Clone)]
pub struct ExecPluginExecutor {
    search_path: Vec<PathBuf>,
}

impl ExecPluginExecutor {
    /// Create an executor searching `search_path` (in order) for plugin binaries
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    /// Directories searched for plugins, also exported as `CNI_PATH`
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Locate the binary for `plugin`
    ///
    /// Plugin names are bare file names; anything containing a path
    /// separator is rejected.
    pub fn find_plugin(&self, plugin: &str) -> Result<PathBuf, CniError> {
        if plugin.is_empty() || plugin.contains('/') || plugin.contains('\\') {
            return Err(CniError::InvalidConfig(format!(
                "invalid plugin name {plugin:?}"
            )));
        }
        self.search_path
            .iter()
            .map(|dir| dir.join(plugin))
            .find(|candidate| is_file(candidate))
            .ok_or_else(|| CniError::PluginNotFound {
                plugin: plugin.to_string(),
                paths: self.search_path.clone(),
            })
    }

    fn cni_path(&self) -> String {
        self.search_path
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(":")
    }
}

fn is_file(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

/// Turn a failed plugin's output into the most specific error available
fn plugin_failure(plugin: &str, status: String, stdout: &[u8], stderr: &[u8]) -> CniError {
    for stream in [stdout, stderr] {
        if let Ok(reply) = serde_json::from_slice::<CniErrorReply>(stream) {
            if reply.code != 0 || !reply.msg.is_empty() {
                return CniError::Plugin {
                    plugin: plugin.to_string(),
                    reply,
                };
            }
        }
    }
    CniError::Exit {
        plugin: plugin.to_string(),
        status,
        stderr: String::from_utf8_lossy(stderr).trim().to_string(),
    }
}

#[async_trait::async_trait]
impl PluginExecutor for ExecPluginExecutor {
    async fn exec_plugin(
        &self,
        plugin: &str,
        command: CniCommand,
        config: &[u8],
        env: &RuntimeEnv,
    ) -> Result<Vec<u8>, CniError> {
        let binary = self.find_plugin(plugin)?;
        debug!(
            "Executing {} {} for container {} ifname {}",
            binary.display(),
            command,
            env.container_id,
            env.ifname
        );

        let exec_err = |source: std::io::Error| CniError::Exec {
            plugin: plugin.to_string(),
            source,
        };

        let mut child = Command::new(&binary)
            .env("CNI_COMMAND", command.as_str())
            .env("CNI_CONTAINERID", &env.container_id)
            .env("CNI_NETNS", &env.netns)
            .env("CNI_IFNAME", &env.ifname)
            .env("CNI_ARGS", env.args_string())
            .env("CNI_PATH", self.cni_path())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(exec_err)?;

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(config).await {
                Ok(()) => {}
                // plugin exited without reading its config; its exit status and reply decide
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("Plugin {} closed stdin early", plugin);
                }
                Err(e) => return Err(exec_err(e)),
            }
            // closing stdin signals end of config
            drop(stdin);
        }

        let output = child.wait_with_output().await.map_err(exec_err)?;
        if !output.status.success() {
            return Err(plugin_failure(
                plugin,
                output.status.to_string(),
                &output.stdout,
                &output.stderr,
            ));
        }

        debug!("Plugin {} {} succeeded", plugin, command);
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_plugin_rejects_paths() {
        let executor = ExecPluginExecutor::new(vec![PathBuf::from("/opt/cni/bin")]);
        assert!(matches!(
            executor.find_plugin("../bridge"),
            Err(CniError::InvalidConfig(_))
        ));
        assert!(matches!(executor.find_plugin(""), Err(CniError::InvalidConfig(_))));
    }

    #[test]
    fn test_find_plugin_searches_in_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        std::fs::write(second.path().join("bridge"), b"").unwrap();
        let executor = ExecPluginExecutor::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        assert_eq!(executor.find_plugin("bridge").unwrap(), second.path().join("bridge"));
        assert!(matches!(
            executor.find_plugin("macvlan"),
            Err(CniError::PluginNotFound { .. })
        ));
        assert_eq!(
            executor.cni_path(),
            format!("{}:{}", first.path().display(), second.path().display())
        );
    }

    #[test]
    fn test_plugin_failure_prefers_structured_reply() {
        let stdout = br#"{"cniVersion":"1.0.0","code":7,"msg":"invalid config","details":"missing master"}"#;
        let err = plugin_failure("macvlan", "exit status: 1".to_string(), stdout, b"");
        match err {
            CniError::Plugin { reply, .. } => {
                assert_eq!(reply.code, 7);
                assert_eq!(reply.to_string(), "invalid config; missing master");
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = plugin_failure("macvlan", "exit status: 2".to_string(), b"garbage", b"boom\n");
        assert!(matches!(err, CniError::Exit { ref stderr, .. } if stderr == "boom"));
    }
}
