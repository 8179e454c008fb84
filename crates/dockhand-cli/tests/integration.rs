#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn dockhand(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("dockhand").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("DOCKHAND_SETTINGS")
        .env_remove("DOCKHAND_GATEWAY_TOKEN");
    cmd
}

fn write_settings(dir: &TempDir, yaml: &str) {
    let path = dir.path().join("settings/settings.yaml");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, yaml).unwrap();
}

// ---------------------------------------------------------------------------
// dockhand init
// ---------------------------------------------------------------------------

#[test]
fn init_writes_default_settings() {
    let dir = TempDir::new().unwrap();
    dockhand(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("created:"));

    let path = dir.path().join("settings/settings.yaml");
    let data = std::fs::read_to_string(path).unwrap();
    let value: serde_yaml::Value = serde_yaml::from_str(&data).unwrap();
    assert_eq!(value["docker"]["retries"], serde_yaml::Value::from(6));
    assert_eq!(value["server"]["port"], serde_yaml::Value::from(3141));
}

#[test]
fn init_keeps_existing_settings() {
    let dir = TempDir::new().unwrap();
    write_settings(&dir, "policy:\n  admins: [7]\n");

    dockhand(&dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("exists:"));

    let data = std::fs::read_to_string(dir.path().join("settings/settings.yaml")).unwrap();
    assert!(data.contains("admins: [7]"));
}

#[test]
fn settings_flag_overrides_location() {
    let dir = TempDir::new().unwrap();
    dockhand(&dir)
        .args(["--settings", "conf/bot.yaml", "init"])
        .assert()
        .success();
    assert!(dir.path().join("conf/bot.yaml").is_file());
    assert!(!dir.path().join("settings/settings.yaml").exists());
}

// ---------------------------------------------------------------------------
// dockhand config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_warns_on_empty_policy() {
    let dir = TempDir::new().unwrap();
    write_settings(&dir, "runtime:\n  type: http\n  endpoint: http://127.0.0.1:2375\n");

    dockhand(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("policy grants no permissions"));
}

#[test]
fn config_validate_fails_on_bad_endpoint() {
    let dir = TempDir::new().unwrap();
    write_settings(
        &dir,
        "policy:\n  admins: [1]\nruntime:\n  type: http\n  endpoint: 127.0.0.1:2375\n",
    );

    dockhand(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"))
        .stderr(predicate::str::contains("settings validation found errors"));
}

#[test]
fn config_validate_json() {
    let dir = TempDir::new().unwrap();
    write_settings(
        &dir,
        "policy:\n  admins: [1]\nruntime:\n  type: http\n  endpoint: http://127.0.0.1:2375\n",
    );

    let output = dockhand(&dir)
        .args(["--json", "config", "validate"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["warnings"], serde_json::json!([]));
}

#[test]
fn config_show_masks_gateway_token() {
    let dir = TempDir::new().unwrap();
    write_settings(&dir, "server:\n  gateway_token: hunter2\n");

    dockhand(&dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("time_before_retry: 5"))
        .stdout(predicate::str::contains("hunter2").not());
}

#[test]
fn missing_settings_points_at_init() {
    let dir = TempDir::new().unwrap();
    dockhand(&dir)
        .args(["config", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("dockhand init"));
}

// ---------------------------------------------------------------------------
// dockhand start / stop / restart
// ---------------------------------------------------------------------------

#[test]
fn unauthorized_actor_is_refused_without_touching_docker() {
    let dir = TempDir::new().unwrap();
    write_settings(
        &dir,
        "runtime:\n  type: cli\n  binary: /nonexistent/dockhand-test-docker\n",
    );

    dockhand(&dir)
        .args(["start", "plex", "--actor", "42"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("You are not allowed to use this command"))
        .stderr(predicate::str::contains("request ended with unauthorized"));
}

#[test]
fn unreachable_docker_is_reported() {
    let dir = TempDir::new().unwrap();
    write_settings(
        &dir,
        "policy:\n  admins: [1]\nruntime:\n  type: cli\n  binary: /nonexistent/dockhand-test-docker\n",
    );

    dockhand(&dir)
        .args(["stop", "plex", "--actor", "1"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("cannot be reached"));
}

#[cfg(unix)]
mod fake_docker {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// A `docker` stand-in with one unit, `plex`, whose running state lives
    /// in a marker file next to the script.
    const SCRIPT: &str = r#"#!/bin/sh
dir="$(dirname "$0")"
echo "$@" >> "$dir/calls.log"
case "$1" in
  ps)
    if [ -f "$dir/plex.up" ]; then status="Up 1 second"; else status="Exited (0) 1 hour ago"; fi
    echo "{\"ID\":\"a1\",\"Names\":\"plex\",\"Status\":\"$status\",\"Section\":\"media\"}"
    ;;
  start)
    touch "$dir/plex.up"
    echo "$2"
    ;;
  stop)
    rm -f "$dir/plex.up"
    echo "$2"
    ;;
esac
"#;

    fn setup(running: bool) -> TempDir {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("docker");
        std::fs::write(&script, SCRIPT).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        if running {
            std::fs::write(dir.path().join("plex.up"), "").unwrap();
        }
        write_settings(
            &dir,
            &format!(
                "policy:\n  admins: [1]\n  user_start_permissions:\n    2: [media]\n\
                 docker:\n  retries: 2\n  time_before_retry: 0\n\
                 runtime:\n  type: cli\n  binary: {}\n",
                script.display()
            ),
        );
        dir
    }

    fn calls(dir: &TempDir) -> String {
        std::fs::read_to_string(dir.path().join("calls.log")).unwrap_or_default()
    }

    #[test]
    fn admin_starts_stopped_unit() {
        let dir = setup(false);
        dockhand(&dir)
            .args(["start", "plex", "--actor", "1", "--mention", "<@1>"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Processing your request to start `plex`..."))
            .stdout(predicate::str::contains("<@1> plex has been started"));
        assert!(calls(&dir).contains("start a1"));
    }

    #[test]
    fn section_grant_allows_start_but_not_stop() {
        let dir = setup(false);
        dockhand(&dir)
            .args(["start", "plex", "--actor", "2"])
            .assert()
            .success();

        dockhand(&dir)
            .args(["stop", "plex", "--actor", "2"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("You are not allowed to use this command"));
        assert!(!calls(&dir).contains("stop a1"));
    }

    #[test]
    fn starting_running_unit_makes_no_mutation() {
        let dir = setup(true);
        dockhand(&dir)
            .args(["start", "plex", "--actor", "1"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("plex is already running"));
        assert!(!calls(&dir).contains("start a1"));
    }

    #[test]
    fn unknown_unit_is_reported() {
        let dir = setup(false);
        dockhand(&dir)
            .args(["stop", "lidarr", "--actor", "1"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("***lidarr***"));
    }

    #[test]
    fn json_outcome() {
        let dir = setup(true);
        let output = dockhand(&dir)
            .args(["--json", "stop", "plex", "--actor", "1"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value["outcome"]["kind"], "success");
        assert_eq!(value["message"], "plex has been stopped");
    }

    // -----------------------------------------------------------------------
    // dockhand list
    // -----------------------------------------------------------------------

    #[test]
    fn list_groups_units_by_section() {
        let dir = setup(false);
        dockhand(&dir)
            .args(["list", "--actor", "2"])
            .assert()
            .success()
            .stdout(predicate::str::contains("SECTION"))
            .stdout(predicate::str::contains("media"))
            .stdout(predicate::str::contains("plex"));
    }

    #[test]
    fn list_for_stranger_is_empty() {
        let dir = setup(false);
        dockhand(&dir)
            .args(["list", "--actor", "99"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No units available to actor 99."));
    }
}
