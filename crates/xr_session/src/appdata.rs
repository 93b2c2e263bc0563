//! App data directories for the XR session driver
//
// Logs and the default settings file live under the platform data directory
// (e.g. ~/.local/share/pulsar_xr on Linux).

use std::path::PathBuf;

use anyhow::anyhow;
use directories::ProjectDirs;

pub struct AppDataPaths {
    pub appdata_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub config_file: PathBuf,
}

pub fn resolve() -> anyhow::Result<AppDataPaths> {
    let proj_dirs = ProjectDirs::from("com", "Pulsar", "Pulsar_XR")
        .ok_or_else(|| anyhow!("could not determine app data directory"))?;
    let appdata_dir = proj_dirs.data_dir().to_path_buf();

    Ok(AppDataPaths {
        logs_dir: appdata_dir.join("logs"),
        config_file: appdata_dir.join("configs").join("xr_session.toml"),
        appdata_dir,
    })
}
