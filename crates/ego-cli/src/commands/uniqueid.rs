use super::{json_pretty, EXIT_SUCCESS};
use ego_core::Engine;
use std::path::Path;

pub fn run(engine: &Engine, path: &Path, json: bool) -> Result<u8, String> {
    let id = engine.unique_id(path).map_err(|e| e.to_string())?;
    if json {
        let payload = serde_json::json!({
            "path": path,
            "unique_id": id,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{id}");
    }
    Ok(EXIT_SUCCESS)
}
