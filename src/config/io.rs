use std::env::current_exe;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use directories_next::ProjectDirs;
use fd_lock::{RwLock, RwLockWriteGuard};
use log::{debug, info, warn};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::config::types::BridgeConfig;
use crate::error::ConfigError;

const CONFIG_FILE_NAME: &str = "gdx-bridge.json";

// gdx-bridge.json next to the executable, so a bridge on a usb stick carries its own settings
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            // F:\gdx-bridge.exe => F:\gdx-bridge.json
            if !path.set_extension("json") {
                warn!("current exe has no filename: {}", path.to_string_lossy());
                return None
            }

            Some(path)
        },
        Err(err) => {
            warn!("failed to get current exe path: {:?}", err);
            None
        },
    }
}

// gdx-bridge.json in an os dependent standard directory, such as %AppData% on windows
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("org", "gdx-bridge", "gdx-bridge").map(|dirs| {
        dirs.config_dir().join(CONFIG_FILE_NAME)
    })
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(path) = get_portable_config_path() {
        match std::fs::metadata(&path) {
            Ok(attr) => {
                if attr.is_file() {
                    return Ok(path);
                }
            }
            Err(err) => {
                debug!("No portable config at {}; Using local path instead. ({})", path.to_string_lossy(), err);
            },
        }
    }

    get_local_config_path().ok_or(ConfigError::NoConfigPath)
}

/// Exclusive lock on the config file. One bridge process owns the radio at a time.
pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        self.rw_lock.try_write().map_err(|source| ConfigError::CanNotLock { source })
    }
}

struct ConfigIOInner {
    path: PathBuf,
    file: std::fs::File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    pub fn new_sync() -> Result<Self, ConfigError> {
        Self::open(get_config_path()?)
    }

    pub fn open(path: PathBuf) -> Result<Self, ConfigError> {
        info!("Using config file {}", path.to_string_lossy());

        let directory = path.parent().ok_or(ConfigError::NoConfigPath)?;
        std::fs::create_dir_all(directory)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(&path)?;

        Ok(ConfigIO { inner: Arc::new(Mutex::new(ConfigIOInner { path, file })) })
    }

    fn lock_inner(&self) -> MutexGuard<'_, ConfigIOInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn path(&self) -> PathBuf {
        self.lock_inner().path.clone()
    }

    pub fn locker(&self) -> Result<ConfigIOLocker, ConfigError> {
        let inner = self.lock_inner();
        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(inner.file.try_clone()?),
        })
    }

    // The File returned from here should never be closed!
    fn get_file(&self) -> Result<File, ConfigError> {
        let file = self.lock_inner().file.try_clone()?;
        Ok(File::from_std(file))
    }

    pub async fn read(&self) -> Result<BridgeConfig, ConfigError> {
        let mut file = self.get_file()?;
        debug!("Reading config file");

        file.rewind().await?;
        let mut content = vec![];
        file.read_to_end(&mut content).await?;

        if content.iter().all(u8::is_ascii_whitespace) {
            return Ok(BridgeConfig::default());
        }

        let content = str::from_utf8(&content)?;
        Ok(serde_json::from_str(content)?)
    }

    pub async fn save(&self, config: &BridgeConfig) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;
        info!("Saving config");

        let content = serde_json::to_string_pretty(config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("gdx-bridge-test-{}", process::id()))
            .join(name)
    }

    #[tokio::test]
    async fn empty_file_reads_as_defaults() {
        let path = scratch_path("empty.json");
        let _ = std::fs::remove_file(&path);
        let config_io = ConfigIO::open(path.clone()).unwrap();
        assert_eq!(config_io.path(), path);
        assert_eq!(config_io.read().await.unwrap(), BridgeConfig::default());
    }

    #[tokio::test]
    async fn saved_config_is_read_back() {
        let path = scratch_path("saved.json");
        let _ = std::fs::remove_file(&path);
        let config_io = ConfigIO::open(path.clone()).unwrap();

        let config = BridgeConfig { poll_interval_ms: 50, ..BridgeConfig::default() };
        config_io.save(&config).await.unwrap();
        assert_eq!(config_io.read().await.unwrap(), config);

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"pollIntervalMs\": 50"));
    }

    #[tokio::test]
    async fn invalid_json_is_an_error() {
        let path = scratch_path("invalid.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        let config_io = ConfigIO::open(path.clone()).unwrap();
        assert!(matches!(config_io.read().await, Err(ConfigError::JsonError { .. })));
    }

    #[test]
    fn second_locker_can_not_lock() {
        let path = scratch_path("locked.json");
        let config_io = ConfigIO::open(path.clone()).unwrap();
        let mut first = config_io.locker().unwrap();
        let _guard = first.lock().unwrap();

        let other = ConfigIO::open(path).unwrap();
        let mut second = other.locker().unwrap();
        assert!(matches!(second.lock(), Err(ConfigError::CanNotLock { .. })));
    }
}
