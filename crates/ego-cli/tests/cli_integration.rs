//! CLI subprocess integration tests.
//!
//! These tests invoke the `ego` binary against a fake runtime installation
//! whose `ego-host` is a shell script recording how it was launched.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const MARKER: &[u8; 16] = b"EGO_OEINFO_SLOT\0";

const FAKE_HOST: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$EDG_TEST_OUT/args"
printf '%s\n' "FOO=${FOO-unset}" "EDG_BAR=${EDG_BAR-unset}" "EDG_EGO_PREMAIN=${EDG_EGO_PREMAIN-unset}" > "$EDG_TEST_OUT/env"
if [ -n "$EDG_TEST_STDERR" ]; then
    echo "$EDG_TEST_STDERR" >&2
fi
exit ${EDG_TEST_EXIT:-0}
"#;

struct Fixture {
    root: tempfile::TempDir,
    work: tempfile::TempDir,
    out: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let bin = root.path().join("bin");
        let share = root.path().join("share");
        fs::create_dir_all(&bin).unwrap();
        fs::create_dir_all(&share).unwrap();

        let host = bin.join("ego-host");
        fs::write(&host, FAKE_HOST).unwrap();
        fs::set_permissions(&host, fs::Permissions::from_mode(0o755)).unwrap();
        fs::write(share.join("ego-enclave"), b"enclave image").unwrap();
        fs::copy(env!("CARGO_BIN_EXE_ego-bundle"), share.join("ego-bundle")).unwrap();

        Self {
            root,
            work: tempfile::tempdir().unwrap(),
            out: tempfile::tempdir().unwrap(),
        }
    }

    fn ego(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_ego"));
        cmd.current_dir(self.work.path())
            .env("EGO_ROOT", self.root.path())
            .env("EDG_TEST_OUT", self.out.path())
            .env_remove("OE_SIMULATION")
            .env_remove("EGO_LOG");
        cmd
    }

    fn write_program(&self, name: &str) -> PathBuf {
        let mut data = b"\x7fELF fake program ".to_vec();
        data.extend_from_slice(MARKER);
        data.extend_from_slice(&[0u8; 512]);
        data.extend_from_slice(b"trailing code");
        let path = self.work.path().join(name);
        fs::write(&path, data).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn signed_program(&self, name: &str) -> PathBuf {
        let path = self.write_program(name);
        let output = self.ego().args(["sign", name]).output().unwrap();
        assert!(output.status.success(), "sign failed: {}", stderr(&output));
        path
    }

    fn recorded(&self, file: &str) -> String {
        fs::read_to_string(self.out.path().join(file)).unwrap_or_default()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn cli_version_exits_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_ego"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("ego"));
}

#[test]
fn cli_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_ego"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    for name in [
        "sign", "run", "marblerun", "signerid", "uniqueid", "env", "install", "bundle",
    ] {
        assert!(text.contains(name), "help must list '{name}': {text}");
    }
}

#[test]
fn cli_prints_banner_on_stderr() {
    let f = Fixture::new();
    let output = f.ego().arg("--help").output().unwrap();
    assert!(stderr(&output).starts_with("EGo v"));
}

#[test]
fn cli_sign_without_config_fails_and_creates_nothing() {
    let f = Fixture::new();
    let output = f.ego().arg("sign").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(entries(f.work.path()).is_empty());
}

#[test]
fn cli_sign_missing_file_prints_usage() {
    let f = Fixture::new();
    let output = f.ego().args(["sign", "nonexistent"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ego sign"));
    assert!(entries(f.work.path()).is_empty());
}

#[test]
fn cli_sign_without_marker_reports_missing_section() {
    let f = Fixture::new();
    fs::write(f.work.path().join("plain"), b"no metadata here").unwrap();
    let output = f.ego().args(["sign", "plain"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("ego-go build"));
    assert_eq!(entries(f.work.path()), vec!["plain".to_owned()]);
}

#[test]
fn cli_sign_generates_key_and_config() {
    let f = Fixture::new();
    f.signed_program("app");
    assert_eq!(
        entries(f.work.path()),
        vec!["app", "enclave.json", "private.pem", "public.pem"]
    );
    let mode = fs::metadata(f.work.path().join("private.pem"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn cli_signerid_matches_for_program_and_key() {
    let f = Fixture::new();
    f.signed_program("app");

    let from_program = f.ego().args(["signerid", "app"]).output().unwrap();
    let from_key = f.ego().args(["signerid", "public.pem"]).output().unwrap();
    assert!(from_program.status.success(), "{}", stderr(&from_program));
    assert!(from_key.status.success(), "{}", stderr(&from_key));

    let id = stdout(&from_program).trim().to_owned();
    assert_eq!(id.len(), 64);
    assert_eq!(id, stdout(&from_key).trim());
}

#[test]
fn cli_signerid_rejects_garbage() {
    let f = Fixture::new();
    fs::write(f.work.path().join("junk"), b"not a key").unwrap();
    let output = f.ego().args(["signerid", "junk"]).output().unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("OE_CRYPTO_ERROR"));
}

#[test]
fn cli_json_uniqueid_output() {
    let f = Fixture::new();
    f.signed_program("app");
    let output = f.ego().args(["--json", "uniqueid", "app"]).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["unique_id"].as_str().unwrap().len(), 64);
}

#[test]
fn cli_run_forwards_exit_code_and_filters_env() {
    let f = Fixture::new();
    f.signed_program("app");
    let output = f
        .ego()
        .args(["run", "app", "--flag", "value"])
        .env("FOO", "leak")
        .env("EDG_BAR", "kept")
        .env("EDG_EGO_PREMAIN", "1")
        .env("EDG_TEST_EXIT", "42")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(42), "{}", stderr(&output));

    let args: Vec<String> = f.recorded("args").lines().map(str::to_owned).collect();
    assert_eq!(args.len(), 4);
    assert!(args[0].ends_with("ego-enclave"));
    assert!(args[1].ends_with("app"));
    assert_eq!(&args[2..], ["--flag", "value"]);

    let env = f.recorded("env");
    assert!(env.contains("FOO=unset"));
    assert!(env.contains("EDG_BAR=kept"));
    assert!(env.contains("EDG_EGO_PREMAIN=0"));
}

#[test]
fn cli_run_unsigned_never_spawns_host() {
    let f = Fixture::new();
    f.write_program("app");
    let output = f.ego().args(["run", "app"]).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("ERROR: failed to load the binary"));
    assert!(!f.out.path().join("args").exists());
}

#[test]
fn cli_run_device_failure_suggests_simulation() {
    let f = Fixture::new();
    f.signed_program("app");
    let output = f
        .ego()
        .args(["run", "app"])
        .env("EDG_TEST_STDERR", "[host] Failed to open Intel SGX device")
        .env("EDG_TEST_EXIT", "1")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let err = stderr(&output);
    assert!(err.contains("ERROR: failed to open Intel SGX device"), "{err}");
    assert!(err.contains("OE_SIMULATION=1"), "{err}");
}

#[test]
fn cli_marblerun_requires_marble_env() {
    let f = Fixture::new();
    f.signed_program("app");
    let output = f
        .ego()
        .args(["marblerun", "app"])
        .env("EDG_MARBLE_COORDINATOR_ADDR", "localhost:2001")
        .env_remove("EDG_MARBLE_TYPE")
        .env_remove("EDG_MARBLE_DNS_NAMES")
        .env_remove("EDG_MARBLE_UUID_FILE")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("EDG_MARBLE_TYPE"));
    assert!(!f.out.path().join("args").exists());
}

#[test]
fn cli_marblerun_sets_premain() {
    let f = Fixture::new();
    f.signed_program("app");
    let output = f
        .ego()
        .args(["marblerun", "app"])
        .env("EDG_MARBLE_COORDINATOR_ADDR", "localhost:2001")
        .env("EDG_MARBLE_TYPE", "backend")
        .env("EDG_MARBLE_DNS_NAMES", "localhost")
        .env("EDG_MARBLE_UUID_FILE", "uuid")
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    assert!(f.recorded("env").contains("EDG_EGO_PREMAIN=1"));
}

#[test]
fn cli_env_sets_toolchain_variables() {
    let f = Fixture::new();
    let output = f
        .ego()
        .args(["env", "/bin/sh", "-c", "echo $CGO_ENABLED $GOROOT"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let go = f.root.path().join("go");
    assert_eq!(stdout(&output).trim(), format!("1 {}", go.display()));
}

#[test]
fn cli_env_forwards_exit_code() {
    let f = Fixture::new();
    let output = f
        .ego()
        .args(["env", "/bin/sh", "-c", "exit 5"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn cli_bundle_runs_without_installation() {
    let f = Fixture::new();
    f.signed_program("app");
    let output = f.ego().args(["bundle", "app"]).output().unwrap();
    assert!(output.status.success(), "{}", stderr(&output));

    let bundle = f.work.path().join("app-bundle");
    let mode = fs::metadata(&bundle).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o755);

    let output = Command::new(&bundle)
        .arg("hello")
        .env("EDG_TEST_OUT", f.out.path())
        .env("EDG_TEST_EXIT", "7")
        .env_remove("EGO_ROOT")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(7), "{}", stderr(&output));
    let args: Vec<String> = f.recorded("args").lines().map(str::to_owned).collect();
    assert!(args[0].ends_with("ego-enclave"));
    assert_eq!(args.last().map(String::as_str), Some("hello"));
}

#[test]
fn cli_bundle_missing_program_prints_usage() {
    let f = Fixture::new();
    let output = f.ego().args(["bundle", "missing"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("ego bundle"));
}

#[test]
fn cli_json_install_lists_components() {
    let f = Fixture::new();
    let os_release = f.work.path().join("os-release");
    fs::write(&os_release, "ID=ubuntu\nVERSION_ID=\"20.04\"\n").unwrap();
    let output = f
        .ego()
        .args(["--json", "install"])
        .env("EGO_OS_RELEASE", &os_release)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["outcome"], "listed");
    let names: Vec<&str> = json["components"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"sgx-driver"));
    assert!(names.contains(&"libsgx-dcap"));
}

#[test]
fn cli_json_install_keeps_stdout_parseable() {
    let f = Fixture::new();
    let os_release = f.work.path().join("os-release");
    fs::write(&os_release, "ID=ubuntu\nVERSION_ID=\"20.04\"\n").unwrap();
    let output = f
        .ego()
        .args(["--json", "install", "libsgx-dcap"])
        .env("EGO_OS_RELEASE", &os_release)
        .output()
        .unwrap();
    // Non-root runs stop at the privilege check. Root runs reach the
    // confirmation, which declines because stdin is not a terminal.
    assert_eq!(output.status.code(), Some(1), "{}", stderr(&output));
    let out = stdout(&output);
    assert!(!out.contains("The following commands"));
    if !out.trim().is_empty() {
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(json["outcome"], "declined");
        assert!(stderr(&output).contains("The following commands will be executed"));
    }
}

#[test]
fn cli_install_unsupported_os_fails() {
    let f = Fixture::new();
    let os_release = f.work.path().join("os-release");
    fs::write(&os_release, "ID=fedora\nVERSION_ID=39\n").unwrap();
    let output = f
        .ego()
        .arg("install")
        .env("EGO_OS_RELEASE", &os_release)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn cli_completions_bash() {
    let output = Command::new(env!("CARGO_BIN_EXE_ego"))
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("ego"));
}
