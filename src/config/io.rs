use std::env::current_exe;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use directories_next::ProjectDirs;
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{debug, info, warn};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::config::types::Config;
use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = "vitals-monitor.json";

/// `<exe dir>/<exe name>.json`, used instead of the per-user file when it exists (e.g. when run from
/// a usb stick).
fn portable_config_path() -> Option<PathBuf> {
    let mut path = current_exe()
        .map_err(|err| warn!("Failed to get current exe path: {:?}", err))
        .ok()?;

    if !path.set_extension("json") {
        warn!("Current exe has no file name: {}", path.to_string_lossy());
        return None;
    }

    match std::fs::metadata(&path) {
        Ok(attr) if attr.is_file() => Some(path),
        Ok(_) => None,
        Err(err) => {
            debug!("No portable config at {} ({})", path.to_string_lossy(), err);
            None
        },
    }
}

fn user_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "vitals-monitor", "vitals-monitor")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
}

fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, ConfigError> {
    explicit
        .or_else(portable_config_path)
        .or_else(user_config_path)
        .ok_or(ConfigError::NoConfigPath)
}

fn open_config_file(path: &Path) -> Result<std::fs::File, ConfigError> {
    if let Some(directory) = path.parent().filter(|directory| !directory.as_os_str().is_empty()) {
        std::fs::create_dir_all(directory)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    Ok(file)
}

/// Exclusive lock on the config file. Holding the guard marks this process as the running instance.
pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        self.rw_lock.try_write().map_err(|source| ConfigError::CanNotLock { source })
    }
}

/// Shared handle to the config file. The file stays open for the lifetime of the application.
#[derive(Clone)]
pub struct ConfigIO {
    file: Arc<Mutex<std::fs::File>>,
}

impl ConfigIO {
    /// Opens (creating if needed) the config file at `path`, or at the default location.
    pub fn new_sync(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = resolve_config_path(path)?;
        info!("Using config file {}", path.to_string_lossy());

        let file = open_config_file(&path)?;
        Ok(ConfigIO { file: Arc::new(Mutex::new(file)) })
    }

    pub fn locker(&mut self) -> Result<ConfigIOLocker, ConfigError> {
        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(self.clone_file()?),
        })
    }

    fn clone_file(&self) -> Result<std::fs::File, ConfigError> {
        let file = self.file.lock().expect("Failed to lock config file handle");
        Ok(file.try_clone()?)
    }

    pub async fn read(&self) -> Result<Config, ConfigError> {
        let mut file = File::from_std(self.clone_file()?);
        debug!("Reading config file");

        let mut content = vec![];
        file.rewind().await?;
        file.read_to_end(&mut content).await?;

        let content = std::str::from_utf8(&content)?;
        if content.trim().is_empty() {
            return Ok(Config::default());
        }

        Ok(serde_json::from_str(content)?)
    }

    pub async fn save(&self, config: Config) -> Result<(), ConfigError> {
        let mut file = File::from_std(self.clone_file()?);
        info!("Saving config");

        let content = serde_json::to_string_pretty(&config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
