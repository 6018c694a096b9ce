// OS abstraction layer for acape - Unix implementation
// (c) 2024 Ross Younger

use super::AbstractPlatform;
use crate::config::BASE_CONFIG_FILENAME;

use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
/// OS abstraction layer for Unix-like platforms
pub struct Platform {}

impl AbstractPlatform for Platform {
    fn user_config_dir() -> Option<PathBuf> {
        // home directory for now
        let home = dirs::home_dir();
        if home.is_none() {
            warn!("could not determine home directory");
        }
        home
    }

    fn user_config_path() -> Option<PathBuf> {
        // ~/.<filename> for now
        let mut d = Self::user_config_dir()?;
        d.push(format!(".{BASE_CONFIG_FILENAME}"));
        Some(d)
    }

    fn system_config_path() -> Option<PathBuf> {
        // /etc/<filename> for now
        let mut p = PathBuf::new();
        p.push("/etc");
        p.push(BASE_CONFIG_FILENAME);
        Some(p)
    }

    fn is_privileged() -> bool {
        nix::unistd::geteuid().is_root()
    }
}
