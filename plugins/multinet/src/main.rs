//! multinet CNI meta-plugin
//!
//! Invoked by the container runtime through the CNI exec protocol. Reads the
//! `CNI_*` environment and the network configuration on stdin, hands the
//! command to the delegate engine, and writes the result (or a CNI error) to
//! stdout.

mod error;

use crate::error::PluginError;
use cluster_client::KubeClusterClient;
use cni_client::{CniCommand, CniErrorReply, ExecPluginExecutor};
use delegate_engine::{
    CheckpointResourceProvider, CmdArgs, DelegateEngine, NetConf, logging, version_info,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Version reported when the configuration names none
const FALLBACK_CNI_VERSION: &str = "1.0.0";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let mut stdin = Vec::new();
    let read = std::io::stdin().read_to_end(&mut stdin);
    let cni_version = requested_version(&stdin);

    let outcome = match read {
        Ok(_) => run(&stdin).await,
        Err(e) => Err(PluginError::Stdin(e)),
    };
    match outcome {
        Ok(output) => {
            if let Some(output) = output {
                println!("{output}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            let reply = CniErrorReply {
                cni_version,
                code: err.code(),
                msg: err.to_string(),
                details: String::new(),
            };
            match serde_json::to_string(&reply) {
                Ok(json) => println!("{json}"),
                Err(_) => println!("{{\"code\":{},\"msg\":{:?}}}", reply.code, reply.msg),
            }
            ExitCode::FAILURE
        }
    }
}

/// `cniVersion` of the configuration, if it parses at all
fn requested_version(stdin: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(stdin)
        .ok()
        .and_then(|v| v.get("cniVersion")?.as_str().map(String::from))
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| FALLBACK_CNI_VERSION.to_string())
}

fn env_var(name: &'static str) -> Result<String, PluginError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(PluginError::MissingEnv(name))
}

fn parse_command(raw: &str) -> Result<CniCommand, PluginError> {
    match raw {
        "ADD" => Ok(CniCommand::Add),
        "DEL" => Ok(CniCommand::Del),
        "CHECK" => Ok(CniCommand::Check),
        other => Err(PluginError::UnknownCommand(other.to_string())),
    }
}

/// Plugin search path: `CNI_PATH` entries, then the configured binary directory
fn search_path(cni_path: Option<&str>, bin_dir: PathBuf) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = cni_path
        .unwrap_or_default()
        .split(':')
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .collect();
    if !dirs.contains(&bin_dir) {
        dirs.push(bin_dir);
    }
    dirs
}

/// Kubernetes client for the command
///
/// DEL carries on without cluster access so the cached chain can still be
/// torn down.
async fn connect_cluster(
    command: CniCommand,
    kubeconfig: Option<&Path>,
) -> Result<Option<KubeClusterClient>, PluginError> {
    let Some(path) = kubeconfig else {
        debug!("No kubeconfig configured, running without cluster access");
        return Ok(None);
    };
    match KubeClusterClient::from_kubeconfig(Some(path)).await {
        Ok(client) => Ok(Some(client)),
        Err(e) if command == CniCommand::Del => {
            warn!("Continuing DEL without cluster access: {}", e);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

async fn run(stdin: &[u8]) -> Result<Option<String>, PluginError> {
    let command = env_var("CNI_COMMAND")?;
    if command == "VERSION" {
        let reply = version_info(&requested_version(stdin));
        return Ok(Some(serde_json::to_string(&reply)?));
    }
    let command = parse_command(&command)?;

    let conf = NetConf::load(stdin)?;
    if let Err(e) = logging::init(&conf.logging) {
        eprintln!("{e}");
    }

    let args = CmdArgs {
        container_id: env_var("CNI_CONTAINERID")?,
        netns: match command {
            CniCommand::Del => std::env::var("CNI_NETNS").unwrap_or_default(),
            CniCommand::Add | CniCommand::Check => env_var("CNI_NETNS")?,
        },
        ifname: env_var("CNI_IFNAME")?,
        args: std::env::var("CNI_ARGS").unwrap_or_default(),
    };
    info!(
        "{} container {} netns {} ifname {}",
        command, args.container_id, args.netns, args.ifname
    );

    let cni_path = std::env::var("CNI_PATH").ok();
    let executor = ExecPluginExecutor::new(search_path(cni_path.as_deref(), conf.bin_dir.clone()));
    let cluster = connect_cluster(command, conf.kubeconfig.as_deref()).await?;

    let mut engine = DelegateEngine::new(
        conf,
        Arc::new(executor),
        Arc::new(CheckpointResourceProvider::default()),
    );
    if let Some(cluster) = cluster {
        engine = engine.with_cluster(Arc::new(cluster));
    }

    match command {
        CniCommand::Add => {
            let outcome = engine.cmd_add(&args).await?;
            Ok(Some(serde_json::to_string(&outcome.result)?))
        }
        CniCommand::Del => {
            engine.cmd_del(&args).await?;
            Ok(None)
        }
        CniCommand::Check => {
            engine.cmd_check(&args).await?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("ADD").unwrap(), CniCommand::Add);
        assert_eq!(parse_command("CHECK").unwrap(), CniCommand::Check);
        assert!(matches!(parse_command("GC"), Err(PluginError::UnknownCommand(_))));
        assert_eq!(PluginError::UnknownCommand("GC".into()).code(), 4);
    }

    #[test]
    fn test_search_path_appends_bin_dir_once() {
        let dirs = search_path(Some("/opt/cni/bin:/usr/libexec/cni:"), PathBuf::from("/opt/cni/bin"));
        assert_eq!(dirs, [PathBuf::from("/opt/cni/bin"), PathBuf::from("/usr/libexec/cni")]);
        let dirs = search_path(None, PathBuf::from("/opt/cni/bin"));
        assert_eq!(dirs, [PathBuf::from("/opt/cni/bin")]);
    }

    #[tokio::test]
    async fn test_unreadable_kubeconfig_only_fails_add_and_check() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("kubeconfig");

        let cluster = connect_cluster(CniCommand::Del, Some(missing.as_path())).await.unwrap();
        assert!(cluster.is_none());
        for command in [CniCommand::Add, CniCommand::Check] {
            let outcome = connect_cluster(command, Some(missing.as_path())).await;
            assert!(matches!(outcome, Err(PluginError::Cluster(_))));
        }
        assert!(connect_cluster(CniCommand::Add, None).await.unwrap().is_none());
    }

    #[test]
    fn test_requested_version() {
        assert_eq!(requested_version(br#"{"cniVersion":"0.4.0"}"#), "0.4.0");
        assert_eq!(requested_version(b""), FALLBACK_CNI_VERSION);
        assert_eq!(requested_version(br#"{"cniVersion":""}"#), FALLBACK_CNI_VERSION);
    }
}
