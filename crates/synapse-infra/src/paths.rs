use std::path::{Path, PathBuf};

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `SYNAPSE_DATA_DIR` environment variable
/// 2. `~/.synapse`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SYNAPSE_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".synapse");
    }

    PathBuf::from(".synapse")
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_path_joins_file_name() {
        assert_eq!(
            config_path(Path::new("/home/user/.synapse")),
            PathBuf::from("/home/user/.synapse/config.toml")
        );
    }

    #[test]
    fn resolve_data_dir_from_env() {
        // SAFETY: no other test in this crate reads or writes SYNAPSE_DATA_DIR.
        unsafe {
            std::env::set_var("SYNAPSE_DATA_DIR", "/tmp/test-synapse");
        }
        let dir = resolve_data_dir();
        assert_eq!(dir, PathBuf::from("/tmp/test-synapse"));
        unsafe {
            std::env::remove_var("SYNAPSE_DATA_DIR");
        }
    }
}
