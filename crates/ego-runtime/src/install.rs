//! Driver and runtime component installation.
//!
//! The catalogue is data (`data/components.toml`), keyed by the `ID` and
//! `VERSION_ID` of `/etc/os-release`. Planning is pure; only [`execute`]
//! touches the system, and it does so through the [`ProcessRunner`] seam.

use crate::runner::{Invocation, ProcessRunner};
use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const OS_RELEASE_PATH: &str = "/etc/os-release";

const BUILTIN_CATALOGUE: &str = include_str!("../data/components.toml");

/// Operating system identity as reported by `os-release(5)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsInfo {
    pub id: String,
    pub version_id: String,
}

impl OsInfo {
    pub fn parse(os_release: &str) -> Self {
        let mut id = String::new();
        let mut version_id = String::new();
        for line in os_release.lines() {
            let Some((key, value)) = line.trim().split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key {
                "ID" => id = value.to_owned(),
                "VERSION_ID" => version_id = value.to_owned(),
                _ => {}
            }
        }
        Self { id, version_id }
    }

    pub fn detect(path: &Path) -> Result<Self, RuntimeError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }
}

impl std::fmt::Display for OsInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.id.is_empty() {
            return f.write_str("unknown");
        }
        write!(f, "{} {}", self.id, self.version_id)
    }
}

/// One installable component: a description and the shell commands installing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub description: String,
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Release {
    os: String,
    version: String,
    #[serde(default)]
    component: Vec<Component>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Catalogue {
    release: Vec<Release>,
}

impl Catalogue {
    pub fn builtin() -> Result<Self, RuntimeError> {
        Self::parse(BUILTIN_CATALOGUE)
    }

    pub fn parse(text: &str) -> Result<Self, RuntimeError> {
        Ok(toml::from_str(text)?)
    }

    /// Components installable on `os`, in catalogue order.
    pub fn available(&self, os: &OsInfo) -> Result<&[Component], RuntimeError> {
        self.release
            .iter()
            .find(|r| r.os == os.id && r.version == os.version_id)
            .map(|r| r.component.as_slice())
            .ok_or_else(|| RuntimeError::UnsupportedOs(os.to_string()))
    }

    /// Resolve `name` for `os`.
    pub fn plan(&self, os: &OsInfo, name: &str) -> Result<&Component, RuntimeError> {
        let available = self.available(os)?;
        available
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| RuntimeError::UnknownComponent {
                name: name.to_owned(),
                available: available
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Run the component's commands in order through `sh -c`, stopping at the first failure.
pub fn execute(
    component: &Component,
    env: &[(String, String)],
    runner: &dyn ProcessRunner,
) -> Result<(), RuntimeError> {
    info!("installing {}", component.name);
    for command in &component.commands {
        debug!("install step: {command}");
        let exit = runner.run(&Invocation {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_owned(), command.clone()],
            env: env.to_vec(),
        })?;
        if !exit.success() {
            return Err(RuntimeError::InstallStepFailed {
                command: command.clone(),
                code: exit.code,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRunner;

    const FOCAL: &str = r#"NAME="Ubuntu"
VERSION="20.04.6 LTS (Focal Fossa)"
ID=ubuntu
ID_LIKE=debian
VERSION_ID="20.04"
"#;

    fn focal() -> OsInfo {
        OsInfo::parse(FOCAL)
    }

    #[test]
    fn parse_os_release() {
        let os = focal();
        assert_eq!(os.id, "ubuntu");
        assert_eq!(os.version_id, "20.04");
        assert_eq!(os.to_string(), "ubuntu 20.04");
    }

    #[test]
    fn parse_empty_os_release() {
        let os = OsInfo::parse("");
        assert_eq!(os.to_string(), "unknown");
    }

    #[test]
    fn detect_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("os-release");
        std::fs::write(&path, "ID='ubuntu'\nVERSION_ID=22.04\n").unwrap();
        let os = OsInfo::detect(&path).unwrap();
        assert_eq!(os.version_id, "22.04");
    }

    #[test]
    fn builtin_catalogue_covers_supported_releases() {
        let catalogue = Catalogue::builtin().unwrap();
        for version in ["18.04", "20.04", "22.04"] {
            let os = OsInfo {
                id: "ubuntu".to_owned(),
                version_id: version.to_owned(),
            };
            let components = catalogue.available(&os).unwrap();
            assert!(!components.is_empty(), "{version}");
            assert!(components.iter().all(|c| !c.commands.is_empty()));
            assert!(components.iter().any(|c| c.name == "libsgx-dcap"));
        }
    }

    #[test]
    fn unsupported_os_is_rejected() {
        let catalogue = Catalogue::builtin().unwrap();
        let os = OsInfo::parse("ID=fedora\nVERSION_ID=39\n");
        assert!(matches!(
            catalogue.available(&os),
            Err(RuntimeError::UnsupportedOs(s)) if s == "fedora 39"
        ));
    }

    #[test]
    fn unknown_component_lists_available() {
        let catalogue = Catalogue::builtin().unwrap();
        let err = catalogue.plan(&focal(), "nope").unwrap_err();
        match err {
            RuntimeError::UnknownComponent { name, available } => {
                assert_eq!(name, "nope");
                assert!(available.contains("sgx-driver"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn plan_finds_component() {
        let catalogue = Catalogue::builtin().unwrap();
        let c = catalogue.plan(&focal(), "az-dcap-client").unwrap();
        assert!(c.commands.iter().any(|cmd| cmd.contains("az-dcap-client")));
    }

    #[test]
    fn execute_runs_commands_through_shell() {
        let component = Component {
            name: "demo".to_owned(),
            description: "demo".to_owned(),
            commands: vec!["true".to_owned(), "echo hi".to_owned()],
        };
        let runner = MockRunner::new();
        execute(&component, &[], &runner).unwrap();

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[1].program, PathBuf::from("/bin/sh"));
        assert_eq!(invocations[1].args, ["-c", "echo hi"]);
    }

    #[test]
    fn execute_stops_at_first_failure() {
        let component = Component {
            name: "demo".to_owned(),
            description: "demo".to_owned(),
            commands: vec!["a".to_owned(), "b".to_owned(), "c".to_owned()],
        };
        let runner = MockRunner::new();
        runner.push_exit(0, &[]);
        runner.push_exit(100, &["E: Unable to locate package"]);

        let err = execute(&component, &[], &runner).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::InstallStepFailed { ref command, code: 100 } if command == "b"
        ));
        assert_eq!(runner.invocation_count(), 2);
    }

    #[test]
    fn catalogue_rejects_malformed_toml() {
        assert!(matches!(
            Catalogue::parse("release = 3"),
            Err(RuntimeError::Catalogue(_))
        ));
    }
}
