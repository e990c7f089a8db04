//! Platform specific location of the Firefox data directory.

use std::path::PathBuf;

use homedir::my_home;

use super::LocateError;

/// Resolve the directory that holds `profiles.ini` and the profile folders.
pub fn browser_base_dir() -> Result<PathBuf, LocateError> {
    if cfg!(target_os = "windows") {
        let appdata = std::env::var_os("APPDATA").ok_or_else(|| {
            LocateError::UnsupportedPlatform("APPDATA is not set".to_string())
        })?;
        Ok(PathBuf::from(appdata).join("Mozilla").join("Firefox"))
    } else if cfg!(target_os = "macos") {
        Ok(home_dir()?
            .join("Library")
            .join("Application Support")
            .join("Firefox"))
    } else if cfg!(unix) {
        Ok(home_dir()?.join(".mozilla").join("firefox"))
    } else {
        Err(LocateError::UnsupportedPlatform(
            std::env::consts::OS.to_string(),
        ))
    }
}

fn home_dir() -> Result<PathBuf, LocateError> {
    my_home()
        .map_err(|err| {
            LocateError::UnsupportedPlatform(format!("cannot resolve home directory: {err:?}"))
        })?
        .ok_or_else(|| LocateError::UnsupportedPlatform("home directory is empty".to_string()))
}
