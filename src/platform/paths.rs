use directories::ProjectDirs;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Per-user locations for the store and log files.
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    pub fn new() -> Result<Self> {
        let project_dirs = ProjectDirs::from("dev", "chatrelay", "ChatRelay")
            .ok_or_else(|| Error::platform("Failed to determine application directories"))?;

        Ok(Self::with_data_dir(project_dirs.data_dir()))
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    pub fn database_file(&self) -> PathBuf {
        self.data_dir.join("chatrelay.db")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn ensure_dirs_exist(&self) -> Result<()> {
        std::fs::create_dir_all(self.data_dir())?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_under_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let paths = AppPaths::with_data_dir(temp_dir.path().join("relay"));

        assert_eq!(paths.database_file(), temp_dir.path().join("relay").join("chatrelay.db"));
        paths.ensure_dirs_exist().unwrap();
        assert!(paths.logs_dir().is_dir());
    }
}
