//! Host platform (linux for example) utility functions

use std::env;
use std::path::PathBuf;

/// Environment variable giving the root of the software installation.
pub const SW_ROOT_ENV_VAR: &str = "TARSUS_SW_ROOT";

/// Get the software root directory from the environment.
///
/// All session and parameter paths are resolved relative to this directory.
pub fn get_tarsus_sw_root() -> Result<PathBuf, env::VarError> {
    Ok(PathBuf::from(env::var(SW_ROOT_ENV_VAR)?))
}

/// Get a short description of the host, used when logging execution info.
pub fn get_host_desc() -> String {
    format!(
        "{} ({})",
        env::consts::OS,
        env::consts::ARCH
    )
}
