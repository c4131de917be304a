use super::{json_pretty, print_usage, report_failure, EXIT_SUCCESS, EXIT_USAGE};
use clap::CommandFactory;
use ego_core::{CoreError, Engine};
use ego_schema::SchemaError;
use std::path::Path;

pub fn run<C: CommandFactory>(
    engine: &Engine,
    target: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let result = match engine.sign(target) {
        Ok(result) => result,
        Err(CoreError::Schema(SchemaError::NoMetadataSection)) => {
            return Err("the metadata section is missing in the binary\n\
                 Maybe the binary was not built with 'ego-go build'?"
                .to_owned());
        }
        Err(e) if e.is_not_found() || matches!(e, CoreError::NoProgram) => {
            eprintln!("error: {e}");
            print_usage::<C>("sign");
            return Ok(EXIT_USAGE);
        }
        Err(e) => return Ok(report_failure(&e)),
    };

    if json {
        println!("{}", json_pretty(&result)?);
    } else {
        for path in &result.generated {
            println!("created {}", path.display());
        }
        println!("signed {}", result.program.display());
    }
    Ok(EXIT_SUCCESS)
}
