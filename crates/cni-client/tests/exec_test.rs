//! Exec protocol tests against a shell-script plugin.

#![cfg(unix)]

use cni_client::{CniCommand, CniError, CniResult, ExecPluginExecutor, PluginExecutor, RuntimeEnv};
use std::os::unix::fs::PermissionsExt;

const FAKE_PLUGIN: &str = r#"#!/bin/sh
config=$(cat)
case "$CNI_COMMAND" in
ADD)
    printf '{"cniVersion":"1.0.0","interfaces":[{"name":"%s","sandbox":"%s"}],"dns":{"domain":"%s"}}' \
        "$CNI_IFNAME" "$CNI_NETNS" "$CNI_ARGS"
    ;;
DEL)
    printf '{"cniVersion":"1.0.0","code":11,"msg":"try again later"}'
    exit 1
    ;;
*)
    echo "unexpected $CNI_COMMAND" >&2
    exit 3
    ;;
esac
"#;

const EARLY_EXIT_PLUGIN: &str = r#"#!/bin/sh
printf '{"cniVersion":"1.0.0","code":7,"msg":"bad config"}'
exit 1
"#;

// A single test keeps script creation and execution on one thread.
#[tokio::test]
async fn test_exec_protocol_round() {
    let dir = tempfile::tempdir().unwrap();
    let plugin = dir.path().join("fake");
    std::fs::write(&plugin, FAKE_PLUGIN).unwrap();
    std::fs::set_permissions(&plugin, std::fs::Permissions::from_mode(0o755)).unwrap();
    let early = dir.path().join("early");
    std::fs::write(&early, EARLY_EXIT_PLUGIN).unwrap();
    std::fs::set_permissions(&early, std::fs::Permissions::from_mode(0o755)).unwrap();

    let executor = ExecPluginExecutor::new(vec![dir.path().to_path_buf()]);
    let mut env = RuntimeEnv::new("container-1", "/var/run/netns/test", "net1");
    env.args.push(("K8S_POD_NAME".to_string(), "web".to_string()));
    let config = br#"{"cniVersion":"1.0.0","name":"fake-net","type":"fake"}"#;

    let stdout = executor
        .exec_plugin("fake", CniCommand::Add, config, &env)
        .await
        .expect("ADD should succeed");
    let result = CniResult::from_slice(&stdout).unwrap();
    assert_eq!(result.interfaces[0].name, "net1");
    assert_eq!(result.interfaces[0].sandbox, "/var/run/netns/test");
    assert_eq!(result.dns.domain, "K8S_POD_NAME=web");

    let err = executor
        .exec_plugin("fake", CniCommand::Del, config, &env)
        .await
        .unwrap_err();
    match err {
        CniError::Plugin { plugin, reply } => {
            assert_eq!(plugin, "fake");
            assert_eq!(reply.code, 11);
            assert_eq!(reply.msg, "try again later");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let err = executor
        .exec_plugin("fake", CniCommand::Check, config, &env)
        .await
        .unwrap_err();
    assert!(matches!(err, CniError::Exit { ref stderr, .. } if stderr == "unexpected CHECK"));

    // larger than a pipe buffer, so the write fails once the plugin is gone
    let padding = "x".repeat(1 << 20);
    let big_config = format!(r#"{{"cniVersion":"1.0.0","name":"early","type":"early","pad":"{padding}"}}"#);
    let err = executor
        .exec_plugin("early", CniCommand::Add, big_config.as_bytes(), &env)
        .await
        .unwrap_err();
    match err {
        CniError::Plugin { reply, .. } => {
            assert_eq!(reply.code, 7);
            assert_eq!(reply.msg, "bad config");
        }
        other => panic!("unexpected error {other:?}"),
    }
}
