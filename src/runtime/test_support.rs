//! Fake `gcloud` binaries for tests that spawn real processes

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SCRIPT: &str = r#"#!/bin/sh
case "$1" in
  auth)
    if [ "$2" = "list" ]; then
      echo '__ACCOUNTS__'
      exit 0
    fi
    ;;
  config)
    echo 'demo-project'
    exit 0
    ;;
  version)
    echo 'Google Cloud SDK 999.0.0'
    echo 'core 2026.01.01'
    exit 0
    ;;
  projects)
    for arg in "$@"; do
      if [ "$arg" = "--format=json" ]; then
        echo '['
        echo '  {"projectId": "demo-project", "name": "Demo"}'
        echo ']'
        exit 0
      fi
    done
    echo 'PROJECT_ID    NAME'
    echo 'demo-project  Demo'
    exit 0
    ;;
  storage)
    echo 'ERROR: (gcloud.storage.ls) You do not currently have an active account selected.' >&2
    exit 1
    ;;
  compute)
    echo "ERROR: (gcloud.compute.instances.describe) NOT_FOUND: The resource 'vm-1' was not found" >&2
    exit 1
    ;;
  flaky)
    if [ -f "$2" ]; then
      echo 'recovered'
      exit 0
    fi
    : > "$2"
    echo 'ERROR: (gcloud.flaky) HTTPError 503: Service Unavailable' >&2
    exit 1
    ;;
  sleep)
    exec sleep "$2"
    ;;
  forking)
    echo 'started'
    sleep "$2"
    echo 'finished'
    exit 0
    ;;
  stubborn)
    trap '' TERM
    echo 'started'
    sleep "$2"
    exit 0
    ;;
  env)
    echo "$FAKE_VALUE"
    exit 0
    ;;
  pwd)
    pwd
    exit 0
    ;;
  explode)
    echo 'something strange happened' >&2
    echo 'and then it stopped' >&2
    exit 7
    ;;
esac
echo "ERROR: unknown command $1" >&2
exit 2
"#;

const ACTIVE_ACCOUNTS: &str = concat!(
    r#"[{"account": "dev@example.com", "status": "ACTIVE"}, "#,
    r#"{"account": "ops@example.com", "status": ""}]"#,
);

/// Executable shell script standing in for `gcloud`
pub(crate) struct FakeGcloud {
    dir: TempDir,
    path: PathBuf,
}

impl FakeGcloud {
    /// Script whose `auth list` reports an active account
    pub(crate) fn signed_in() -> Self {
        Self::with_accounts(ACTIVE_ACCOUNTS)
    }

    /// Script whose `auth list` reports no credentials at all
    pub(crate) fn signed_out() -> Self {
        Self::with_accounts("[]")
    }

    fn with_accounts(accounts: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gcloud");
        {
            let mut file = fs::File::create(&path).unwrap();
            file.write_all(SCRIPT.replace("__ACCOUNTS__", accounts).as_bytes())
                .unwrap();
            file.sync_all().unwrap();
        }
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        Self { dir, path }
    }

    pub(crate) fn binary(&self) -> String {
        self.path.display().to_string()
    }

    /// Scratch directory that lives as long as the script
    pub(crate) fn dir(&self) -> &Path {
        self.dir.path()
    }
}
