mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::EXIT_FAILURE;
use ego_core::Engine;
use ego_runtime::install::OS_RELEASE_PATH;
use ego_runtime::RuntimeLayout;
use std::path::PathBuf;
use std::process::ExitCode;

const GIT_COMMIT: &str = match option_env!("EGO_GIT_COMMIT") {
    Some(commit) => commit,
    None => "0000000000000000000000000000000000000000",
};

#[derive(Debug, Parser)]
#[command(
    name = "ego",
    version,
    about = "Sign, run, and bundle Go programs for SGX enclaves"
)]
struct Cli {
    /// Root of the EGo runtime installation (defaults to the installation of this executable).
    #[arg(long, env = "EGO_ROOT", global = true)]
    root: Option<PathBuf>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Sign an executable built with ego-go.
    #[command(long_about = "Sign an executable built with ego-go. \
Executables must be signed before they can be run in an enclave.

  ego sign <executable>
    Generates a key pair (private.pem, public.pem) and a default enclave.json
    in the current directory and signs the executable.

  ego sign
    Signs the executable configured by enclave.json in the current directory.

  ego sign <config.json>
    Signs an executable according to the given configuration.")]
    Sign {
        /// Executable or signing configuration (*.json).
        target: Option<PathBuf>,
    },
    /// Run a signed executable in standalone mode.
    #[command(long_about = "Run a signed executable in an enclave. Arguments after the \
executable are passed to it.

Only environment variables starting with EDG_ are readable inside the enclave.
Set OE_SIMULATION=1 to run in simulation mode.")]
    Run {
        /// Signed executable.
        program: PathBuf,
        /// Arguments for the executable.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run a signed executable as a Marblerun Marble.
    #[command(long_about = "Run a signed executable as a Marblerun Marble. Requires a running \
Marblerun Coordinator.

Only environment variables starting with EDG_ are readable inside the enclave; the
Coordinator's manifest may add or override them.

Required environment variables:
  EDG_MARBLE_COORDINATOR_ADDR   address of the Coordinator
  EDG_MARBLE_TYPE               Marble type as declared in the manifest
  EDG_MARBLE_DNS_NAMES          alternative DNS names for the Marble's TLS certificate
  EDG_MARBLE_UUID_FILE          where the Marble stores its UUID

Set OE_SIMULATION=1 to run in simulation mode.")]
    Marblerun {
        /// Signed executable.
        program: PathBuf,
    },
    /// Print the SignerID of a signed executable or a key file.
    Signerid {
        /// Signed executable, private.pem, or public.pem.
        path: PathBuf,
    },
    /// Print the UniqueID of a signed executable.
    Uniqueid {
        /// Signed executable.
        path: PathBuf,
    },
    /// Run a command in the EGo environment.
    #[command(long_about = "Run a command with the EGo toolchain on PATH, GOROOT set, and \
cgo enabled. For example, `ego env make` builds a project that uses a Makefile.")]
    Env {
        /// Command and its arguments.
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true
        )]
        command: Vec<String>,
    },
    /// Install drivers and other components.
    #[command(long_about = "Install drivers and other components. The available components \
depend on the operating system and its version; run `ego install` without a component to \
list them.")]
    Install {
        /// Component to install.
        component: Option<String>,
        /// Do not ask for confirmation.
        #[arg(short, long, default_value_t = false)]
        yes: bool,
        #[arg(long, hide = true, env = "EGO_OS_RELEASE", default_value = OS_RELEASE_PATH)]
        os_release: PathBuf,
    },
    /// Bundle a signed executable with the current EGo runtime into a single executable.
    #[command(long_about = "Bundle a signed executable with the current EGo runtime into a \
single executable that runs on systems without EGo installed.

The SGX driver and libraries still need to be installed on the target system.
Without an output name, the bundle is written to <executable>-bundle in the current
directory.")]
    Bundle {
        /// Signed executable.
        program: PathBuf,
        /// Output file.
        output: Option<PathBuf>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    eprintln!("EGo v{} ({GIT_COMMIT})", env!("CARGO_PKG_VERSION"));
    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("EGO_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let work_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("error: cannot determine working directory: {e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let layout = cli
        .root
        .clone()
        .map_or_else(RuntimeLayout::discover, RuntimeLayout::new);
    tracing::debug!("runtime root: {}", layout.root().display());
    let engine = Engine::new(layout, work_dir);
    let json = cli.json;

    let result = match cli.command {
        Commands::Sign { target } => commands::sign::run::<Cli>(&engine, target.as_deref(), json),
        Commands::Run { program, args } => commands::run::run(&engine, &program, &args),
        Commands::Marblerun { program } => commands::marblerun::run::<Cli>(&engine, &program),
        Commands::Signerid { path } => commands::signerid::run(&engine, &path, json),
        Commands::Uniqueid { path } => commands::uniqueid::run(&engine, &path, json),
        Commands::Env { command } => commands::env::run(&engine, &command),
        Commands::Install {
            component,
            yes,
            os_release,
        } => commands::install::run(&engine, component.as_deref(), yes, &os_release, json),
        Commands::Bundle { program, output } => {
            commands::bundle::run::<Cli>(&engine, &program, output.as_deref(), json)
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
