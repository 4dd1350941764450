pub mod error;
pub mod multitext;
pub mod properties;
pub mod models_lexicon;
pub mod db;
pub mod lexicon_sort;
pub mod lift_merger;
pub mod lift_import;
pub mod app_settings;
pub mod logger;

use std::fs::create_dir_all;
use std::path::PathBuf;

use anyhow::{Context, Result};
use app_dirs::{get_app_root, AppDataType, AppInfo};

pub const APP_INFO: AppInfo = AppInfo{name: "lexicon", author: "profound-labs"};

/// The lexicon data directory: `LEXICON_DIR` when set, otherwise the
/// platform's user data directory. Created if missing.
pub fn get_create_lexicon_dir() -> Result<PathBuf> {
    let p = match std::env::var("LEXICON_DIR") {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => get_app_root(AppDataType::UserData, &APP_INFO)
            .context("Can't determine the user data directory")?,
    };
    if !p.exists() {
        create_dir_all(&p)
            .with_context(|| format!("Can't create lexicon dir: {}", p.display()))?;
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_lexicon_dir_from_env() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("lexicon-data");
        unsafe {
            std::env::set_var("LEXICON_DIR", &target);
        }
        let p = get_create_lexicon_dir().unwrap();
        unsafe {
            std::env::remove_var("LEXICON_DIR");
        }
        assert_eq!(p, target);
        assert!(p.is_dir());
    }
}
