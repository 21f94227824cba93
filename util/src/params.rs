//! # Parameter file loading
//!
//! Executables keep their tunable values in TOML files under the `params`
//! directory of the software root, one file per executable plus shared ones
//! like `net.toml`. Any `Deserialize` struct can be loaded, so each module
//! defines its own parameter struct and pulls it in as a nested table.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable (TARSUS_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot load the parameter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file into `P`.
///
/// `param_file_name` is relative to `$TARSUS_SW_ROOT/params`.
pub fn load<P>(param_file_name: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned,
{
    let mut path = crate::host::get_tarsus_sw_root().map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");
    path.push(param_file_name);

    let params_str = fs::read_to_string(path).map_err(LoadError::FileLoadError)?;

    Ok(toml::from_str(&params_str)?)
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------
