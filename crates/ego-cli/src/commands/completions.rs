use super::EXIT_SUCCESS;
use clap::CommandFactory;
use clap_complete::Shell;
use std::io::Write;

/// Print the completion script for `shell` on stdout.
pub fn run<C: CommandFactory>(shell: Shell) -> Result<u8, String> {
    let mut out = std::io::stdout().lock();
    write_script::<C>(shell, &mut out);
    out.flush()
        .map_err(|e| format!("cannot write completions: {e}"))?;
    Ok(EXIT_SUCCESS)
}

/// Completions are registered under the command's own name, so the
/// generated script matches the installed `ego` binary.
fn write_script<C: CommandFactory>(shell: Shell, out: &mut dyn Write) {
    let mut cmd = C::command();
    let name = cmd.get_name().to_owned();
    clap_complete::generate(shell, &mut cmd, name, out);
}
