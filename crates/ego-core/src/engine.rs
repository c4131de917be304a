use crate::bundle::{pack_payload, write_bundle, BUNDLE_SUFFIX};
use crate::signer::{self, SignResult, SignTarget};
use crate::CoreError;
use ed25519_dalek::VerifyingKey;
use ego_runtime::install::{self, Catalogue};
use ego_runtime::{
    run_enclave, run_enclave_marblerun, Component, Invocation, OsInfo, OsRunner, ProcessRunner,
    RuntimeLayout,
};
use ego_schema::{inspect, parse_key_pem, signer_id_of, verify_program, SignerId, UniqueId};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entry point for every `ego` operation.
///
/// Holds the runtime installation, the working directory that relative paths
/// and generated files resolve against, a snapshot of the caller environment,
/// and the process runner used for every spawn.
pub struct Engine {
    layout: RuntimeLayout,
    work_dir: PathBuf,
    env: Vec<(String, String)>,
    runner: Arc<dyn ProcessRunner>,
}

/// The process environment, skipping entries that are not valid UTF-8.
pub fn caller_env() -> Vec<(String, String)> {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct BundleResult {
    pub program: PathBuf,
    pub output: PathBuf,
    pub signed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InstallOutcome {
    /// No component named; these are available.
    Listed { os: String, components: Vec<Component> },
    Declined { component: String },
    Installed { component: String },
}

impl Engine {
    /// Engine for the current process: OS runner and the real environment.
    pub fn new(layout: RuntimeLayout, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            layout,
            work_dir: work_dir.into(),
            env: caller_env(),
            runner: Arc::new(OsRunner),
        }
    }

    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    #[must_use]
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn layout(&self) -> &RuntimeLayout {
        &self.layout
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.work_dir.join(path)
    }

    pub fn sign(&self, arg: Option<&Path>) -> Result<SignResult, CoreError> {
        let target = SignTarget::resolve(arg, &self.work_dir)?;
        debug!("sign target: {target:?}");
        signer::sign(&target, &self.work_dir)
    }

    /// Run a signed program in standalone mode; returns the program's exit code.
    pub fn run(&self, program: &Path, args: &[String]) -> Result<i32, CoreError> {
        self.layout.require_launch_binaries()?;
        let code = run_enclave(
            &self.resolve(program),
            args,
            &self.layout.host_binary(),
            &self.layout.enclave_binary(),
            &self.env,
            self.runner.as_ref(),
        )?;
        Ok(code)
    }

    /// Run a signed program as a Marblerun Marble.
    pub fn marblerun(&self, program: &Path) -> Result<i32, CoreError> {
        self.layout.require_launch_binaries()?;
        let code = run_enclave_marblerun(
            &self.resolve(program),
            &self.layout.host_binary(),
            &self.layout.enclave_binary(),
            &self.env,
            self.runner.as_ref(),
        )?;
        Ok(code)
    }

    /// Signer ID of a signed program or of a PEM key (private or public).
    pub fn signer_id(&self, path: &Path) -> Result<SignerId, CoreError> {
        let path = self.resolve(path);
        let bytes = fs::read(&path)?;
        let invalid = |reason: String| CoreError::InvalidIdentityInput {
            path: path.clone(),
            reason,
        };

        if matches!(inspect(&bytes), Ok(state) if state.is_signed()) {
            let section = verify_program(&bytes).map_err(|e| invalid(e.to_string()))?;
            let key = VerifyingKey::from_bytes(&section.public_key)
                .map_err(|e| invalid(e.to_string()))?;
            return Ok(signer_id_of(&key));
        }

        let text = String::from_utf8(bytes).map_err(|_| invalid("not a PEM file".to_owned()))?;
        let key = parse_key_pem(&text).map_err(|e| invalid(e.to_string()))?;
        Ok(signer_id_of(&key))
    }

    /// Unique ID of a signed program.
    pub fn unique_id(&self, path: &Path) -> Result<UniqueId, CoreError> {
        let bytes = fs::read(self.resolve(path))?;
        let section = verify_program(&bytes)?;
        Ok(UniqueId::from_bytes(section.unique_id))
    }

    /// Run `command` with the runtime toolchain on `PATH`.
    pub fn env_command(&self, command: &str, args: &[String]) -> Result<i32, CoreError> {
        let toolchain = self.layout.toolchain_dir();
        let toolchain_bin = toolchain.join("bin");

        let mut env: Vec<(String, String)> = self
            .env
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "PATH" | "GOROOT" | "CGO_ENABLED"))
            .cloned()
            .collect();
        let path = match self.env.iter().find(|(k, _)| k == "PATH") {
            Some((_, old)) if !old.is_empty() => format!("{}:{old}", toolchain_bin.display()),
            _ => toolchain_bin.display().to_string(),
        };
        env.push(("PATH".to_owned(), path));
        env.push(("GOROOT".to_owned(), toolchain.display().to_string()));
        env.push(("CGO_ENABLED".to_owned(), "1".to_owned()));

        // Bare names are looked up in the toolchain first, like a shell would with the new PATH.
        let program = if command.contains('/') {
            self.resolve(Path::new(command))
        } else {
            let candidate = toolchain_bin.join(command);
            if candidate.is_file() {
                candidate
            } else {
                PathBuf::from(command)
            }
        };

        let exit = self.runner.run(&Invocation {
            program,
            args: args.to_vec(),
            env,
        })?;
        Ok(exit.code)
    }

    /// Components installable on `os`.
    pub fn available_components(&self, os: &OsInfo) -> Result<Vec<Component>, CoreError> {
        Ok(Catalogue::builtin()?.available(os)?.to_vec())
    }

    /// List components, or install `component` after `confirm` approves its commands.
    pub fn install(
        &self,
        os: &OsInfo,
        component: Option<&str>,
        confirm: &mut dyn FnMut(&str) -> bool,
    ) -> Result<InstallOutcome, CoreError> {
        let catalogue = Catalogue::builtin()?;
        let Some(name) = component else {
            return Ok(InstallOutcome::Listed {
                os: os.to_string(),
                components: catalogue.available(os)?.to_vec(),
            });
        };

        let planned = catalogue.plan(os, name)?;
        if !confirm(&planned.commands.join("\n")) {
            info!("installation of {name} declined");
            return Ok(InstallOutcome::Declined {
                component: name.to_owned(),
            });
        }
        install::execute(planned, &self.env, self.runner.as_ref())?;
        Ok(InstallOutcome::Installed {
            component: name.to_owned(),
        })
    }

    /// Bundle `program` with the installed runtime into one executable.
    ///
    /// Without `output`, the artifact is `<program name>-bundle` in the working directory.
    pub fn bundle(&self, program: &Path, output: Option<&Path>) -> Result<BundleResult, CoreError> {
        let program_path = self.resolve(program);
        let bytes = fs::read(&program_path)?;
        self.layout.require_launch_binaries()?;
        let stub_path = self.layout.bundle_loader();
        if !stub_path.is_file() {
            return Err(ego_runtime::RuntimeError::InstallationNotFound(stub_path).into());
        }

        let signed = matches!(inspect(&bytes), Ok(state) if state.is_signed());
        if !signed {
            warn!(
                "{} is not signed; the bundle will not run until it is",
                program_path.display()
            );
        }

        let output = match output {
            Some(path) => self.resolve(path),
            None => {
                let name = program_path
                    .file_name()
                    .map_or_else(|| "program".into(), |n| n.to_string_lossy().into_owned());
                self.work_dir.join(format!("{name}{BUNDLE_SUFFIX}"))
            }
        };

        let payload = pack_payload(
            &self.layout.host_binary(),
            &self.layout.enclave_binary(),
            &program_path,
        )?;
        write_bundle(&fs::read(&stub_path)?, &payload, &output)?;
        info!("bundled {} into {}", program_path.display(), output.display());

        Ok(BundleResult {
            program: program_path,
            output,
            signed,
        })
    }
}
