use super::{json_pretty, report_failure, EXIT_SUCCESS};
use ego_core::Engine;
use std::path::Path;

pub fn run(engine: &Engine, path: &Path, json: bool) -> Result<u8, String> {
    let id = match engine.signer_id(path) {
        Ok(id) => id,
        Err(e) => return Ok(report_failure(&e)),
    };
    if json {
        let payload = serde_json::json!({
            "path": path,
            "signer_id": id,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{id}");
    }
    Ok(EXIT_SUCCESS)
}
