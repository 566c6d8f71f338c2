use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "lexchat";

/// Filesystem locations the server reads config from and writes logs to.
/// The database is not here: its location is always `DATABASE_URL`.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub project_root: PathBuf,
    pub user_data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub secrets_path: PathBuf,
}

impl AppPaths {
    /// `LEXCHAT_ROOT` and `LEXCHAT_DATA_DIR` win over discovery.
    pub fn new() -> Self {
        let project_root = env_path("LEXCHAT_ROOT").unwrap_or_else(discover_project_root);
        let user_data_dir = env_path("LEXCHAT_DATA_DIR").unwrap_or_else(|| {
            if cfg!(debug_assertions) {
                project_root.clone()
            } else {
                platform_data_dir()
            }
        });
        Self::with_data_dir(project_root, user_data_dir)
    }

    /// Creates the data and log directories if they are missing.
    pub fn with_data_dir(project_root: PathBuf, user_data_dir: PathBuf) -> Self {
        let log_dir = user_data_dir.join("logs");
        if let Err(err) = fs::create_dir_all(&log_dir) {
            eprintln!("Cannot create log directory {}: {}", log_dir.display(), err);
        }

        AppPaths {
            secrets_path: user_data_dir.join("secrets.yaml"),
            project_root,
            user_data_dir,
            log_dir,
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    env::var_os(name)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// The crate directory when it carries a `config.yml`, else the working
/// directory.
fn discover_project_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    if manifest_dir.join("config.yml").is_file() {
        return manifest_dir.to_path_buf();
    }
    env::current_dir().unwrap_or_else(|_| manifest_dir.to_path_buf())
}

fn platform_data_dir() -> PathBuf {
    let home = env_path("HOME")
        .or_else(|| env_path("USERPROFILE"))
        .unwrap_or_else(|| PathBuf::from("."));

    match env::consts::OS {
        "windows" => env_path("LOCALAPPDATA").unwrap_or(home).join("LexChat"),
        "macos" => home.join("Library/Application Support/LexChat"),
        _ => env_path("XDG_DATA_HOME")
            .unwrap_or_else(|| home.join(".local/share"))
            .join(APP_DIR_NAME),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_live_under_the_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("data");

        let paths = AppPaths::with_data_dir(dir.path().to_path_buf(), data.clone());

        assert_eq!(paths.log_dir, data.join("logs"));
        assert_eq!(paths.secrets_path, data.join("secrets.yaml"));
        assert!(paths.log_dir.is_dir());
    }

    #[test]
    fn unset_env_variable_yields_none() {
        assert_eq!(env_path("LEXCHAT_TEST_UNSET_VARIABLE"), None);
    }
}
