//! Which caller environment variables reach the enclave.
//!
//! Only `EDG_`-prefixed variables are forwarded, plus the few control
//! variables the host runtime itself reads. Everything else stays outside.

/// Variables with this prefix are visible inside the enclave.
pub const ENCLAVE_ENV_PREFIX: &str = "EDG_";

/// Set to `1` to run without isolation-capable hardware. Read by the host runtime.
pub const SIMULATION_VAR: &str = "OE_SIMULATION";

/// Control variables of the host runtime forwarded as-is.
pub const RUNTIME_PASSTHROUGH: &[&str] = &[SIMULATION_VAR, "OE_LOG_LEVEL"];

/// Selects the enclave premain: `0` standalone, `1` Marblerun. Always set by the launcher.
pub const PREMAIN_VAR: &str = "EDG_EGO_PREMAIN";

pub fn is_propagated(name: &str) -> bool {
    name != PREMAIN_VAR
        && (name.starts_with(ENCLAVE_ENV_PREFIX) || RUNTIME_PASSTHROUGH.contains(&name))
}

/// Filter a caller environment down to the propagation set, sorted by name.
pub fn propagated_env<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut out: Vec<(String, String)> = vars
        .into_iter()
        .filter(|(k, _)| is_propagated(k))
        .collect();
    out.sort_by(|a, b| a.0.cmp(&b.0));
    out.dedup_by(|a, b| a.0 == b.0);
    out
}

pub fn simulation_requested(env: &[(String, String)]) -> bool {
    env.iter()
        .any(|(k, v)| k == SIMULATION_VAR && v.trim() == "1")
}
