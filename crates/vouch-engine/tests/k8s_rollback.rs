//! Kubernetes rollback against a scripted kubectl on PATH.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use vouch_core::{CommandSpec, Request, RiskTier};
use vouch_engine::rollback::{self, CaptureOptions, RestoreOptions};

const FAKE_KUBECTL: &str = r#"#!/bin/sh
set -eu
cmd="$1"; shift
case "$cmd" in
  get)
    kind="$1"; name="$2"
    echo "kind: $kind"
    echo "metadata:"
    echo "  name: $name"
    ;;
  apply)
    echo "apply $*" >> "$KUBECTL_LOG"
    ;;
  *)
    ;;
esac
"#;

#[tokio::test]
async fn kubernetes_capture_and_restore_with_fake_kubectl() {
    let project = tempfile::tempdir().unwrap();
    let work = project.path().join("work");
    let bin = project.path().join("bin");
    std::fs::create_dir_all(&work).unwrap();
    std::fs::create_dir_all(&bin).unwrap();

    let kubectl = bin.join("kubectl");
    std::fs::write(&kubectl, FAKE_KUBECTL).unwrap();
    std::fs::set_permissions(&kubectl, std::fs::Permissions::from_mode(0o755)).unwrap();

    let log_path = project.path().join("kubectl.log");
    std::env::set_var("KUBECTL_LOG", &log_path);
    let path = std::env::var("PATH").unwrap_or_default();
    std::env::set_var("PATH", format!("{}:{path}", bin.display()));

    let request = Request::new(
        project.path().to_string_lossy(),
        "sess",
        "agent",
        CommandSpec::shell("kubectl delete deployment myapp", work.to_string_lossy()),
        RiskTier::Dangerous,
    );

    let data = rollback::capture(&request, &CaptureOptions::default())
        .await
        .unwrap()
        .expect("kubernetes capture");
    let k8s = data.kubernetes.as_ref().expect("k8s strategy");
    assert_eq!(k8s.manifests.len(), 1);
    assert_eq!(k8s.manifests[0], "k8s/deployment-myapp.yaml");

    let manifest = std::fs::read_to_string(data.rollback_path.join(&k8s.manifests[0])).unwrap();
    assert!(manifest.contains("kind: deployment"));
    assert!(manifest.contains("name: myapp"));

    let loaded = rollback::load(Path::new(&data.rollback_path)).unwrap();
    rollback::restore(&loaded, &RestoreOptions::default())
        .await
        .unwrap();

    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("apply"), "kubectl apply was invoked: {log}");
}
