use super::{json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use console::Style;
use dialoguer::Confirm;
use ego_core::{Engine, InstallOutcome};
use ego_runtime::OsInfo;
use std::io::{stderr, stdin, IsTerminal};
use std::path::Path;

pub fn run(
    engine: &Engine,
    component: Option<&str>,
    assume_yes: bool,
    os_release: &Path,
    json: bool,
) -> Result<u8, String> {
    let os = OsInfo::detect(os_release)
        .map_err(|e| format!("cannot detect the operating system: {e}"))?;
    if let Some(name) = component {
        if !is_root() {
            return Err(format!(
                "installing components requires root privileges; try: sudo ego install {name}"
            ));
        }
    }

    let mut confirm = |commands: &str| {
        let listing = format!("The following commands will be executed:\n\n{commands}\n");
        if json {
            eprintln!("{listing}");
        } else {
            println!("{listing}");
        }
        if assume_yes {
            return true;
        }
        if !(stdin().is_terminal() && stderr().is_terminal()) {
            eprintln!("not a terminal; pass --yes to install without confirmation");
            return false;
        }
        Confirm::new()
            .with_prompt("Continue installation?")
            .default(false)
            .interact()
            .unwrap_or(false)
    };

    let outcome = engine
        .install(&os, component, &mut confirm)
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&outcome)?);
    }
    match outcome {
        InstallOutcome::Listed { os, components } => {
            if !json {
                println!("Components available for {os}:\n");
                let name_style = Style::new().bold();
                for c in &components {
                    println!("  {:<24} {}", name_style.apply_to(&c.name), c.description);
                }
                println!("\nInstall a component with: sudo ego install <component>");
            }
            Ok(EXIT_SUCCESS)
        }
        InstallOutcome::Declined { .. } => Ok(EXIT_FAILURE),
        InstallOutcome::Installed { component } => {
            if !json {
                println!("installed {component}");
            }
            Ok(EXIT_SUCCESS)
        }
    }
}

#[allow(unsafe_code)]
fn is_root() -> bool {
    // SAFETY: geteuid has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}
