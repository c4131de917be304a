use super::exit_code;
use ego_core::{install_interrupt_handler, Engine};

pub fn run(engine: &Engine, command: &[String]) -> Result<u8, String> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| "no command given".to_owned())?;
    install_interrupt_handler();
    let code = engine
        .env_command(program, args)
        .map_err(|e| e.to_string())?;
    Ok(exit_code(code))
}
