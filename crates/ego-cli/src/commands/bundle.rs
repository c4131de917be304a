use super::{json_pretty, print_usage, spin_fail, spin_ok, spinner, EXIT_SUCCESS, EXIT_USAGE};
use clap::CommandFactory;
use ego_core::Engine;
use std::path::Path;

pub fn run<C: CommandFactory>(
    engine: &Engine,
    program: &Path,
    output: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let pb = if json {
        None
    } else {
        Some(spinner("bundling..."))
    };

    let result = match engine.bundle(program, output) {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("bundled {}", r.output.display()));
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "bundle failed");
            }
            if e.is_not_found() {
                eprintln!("error: {e}");
                print_usage::<C>("bundle");
                return Ok(EXIT_USAGE);
            }
            return Err(e.to_string());
        }
    };

    if json {
        println!("{}", json_pretty(&result)?);
    }
    Ok(EXIT_SUCCESS)
}
