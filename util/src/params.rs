//! Generic parameters functions

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use serde::de::DeserializeOwned;
use std::fs::read_to_string;
use std::path::Path;
use thiserror::Error;
use toml;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// An error that occurs during loading of a parameter file.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("The software root environment variable (SWAY_SW_ROOT) is not set")]
    SwRootNotSet,

    #[error("Cannot load the parmeter file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the parameter file: {0}")]
    DeserialiseError(toml::de::Error)
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Load a parameter file
///
/// The file path is relative to the "$SWAY_SW_ROOT/params" directory
pub fn load<P>(param_file_path: &str) -> Result<P, LoadError> 
where
    P: DeserializeOwned
{
    // Get the params dir
    let mut path = crate::host::get_sw_root()
        .map_err(|_| LoadError::SwRootNotSet)?;
    path.push("params");
    path.push(param_file_path);

    load_path(path)
}

/// Load a parameter file from an explicit path.
pub fn load_path<P, F>(path: F) -> Result<P, LoadError>
where
    P: DeserializeOwned,
    F: AsRef<Path>
{
    // Load the file into a string
    let params_str = match read_to_string(path) {
        Ok(s) => s,
        Err(e) => return Err(LoadError::FileLoadError(e))
    };

    parse(params_str.as_str())
}

/// Parse the parameter struct from a TOML string.
pub fn parse<P>(params_str: &str) -> Result<P, LoadError>
where
    P: DeserializeOwned
{
    toml::from_str(params_str).map_err(LoadError::DeserialiseError)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestParams {
        gain: f64,
        limits: [f64; 3]
    }

    #[test]
    fn test_parse() {
        let p: TestParams = parse("gain = 0.6\nlimits = [0.1, 0.2, 0.3]").unwrap();
        assert_eq!(p, TestParams { gain: 0.6, limits: [0.1, 0.2, 0.3] });

        match parse::<TestParams>("gain = \"fast\"") {
            Err(LoadError::DeserialiseError(_)) => (),
            r => panic!("Expected a deserialise error, got {:?}", r)
        }
    }

    #[test]
    fn test_load_path_missing() {
        match load_path::<TestParams, _>("/definitely/not/a/params.toml") {
            Err(LoadError::FileLoadError(_)) => (),
            r => panic!("Expected a file load error, got {:?}", r)
        }
    }
}
