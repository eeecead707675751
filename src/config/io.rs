use std::env::current_exe;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use directories_next::ProjectDirs;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use serde_json;
use fd_lock::{RwLock, RwLockWriteGuard};
use std::fs::OpenOptions;
use std::str;
use log::{info, warn};

use crate::config::types::Config;
use crate::error::ConfigError;

// creates a path to freedrum-bridge.json in the same directory as the executable
// this could be useful for usb sticks
fn get_portable_config_path() -> Option<PathBuf> {
    match current_exe() {
        Ok(mut path) => {
            // /mnt/usb/freedrum-bridge => /mnt/usb/freedrum-bridge.json
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

// creates a path to freedrum-bridge.json in an os dependent standard directory, such as
// ~/.config on linux.
fn get_local_config_path() -> Option<PathBuf> {
    ProjectDirs::from("com", "freedrum", "freedrum-bridge").map(|dirs| {
        dirs.config_dir().join("freedrum-bridge.json")
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
                info!("Could not read metadata of: {}; Using local path instead. ({:?})", path.to_string_lossy(), err);
            },
        }
    }

    match get_local_config_path() {
        None => Err(ConfigError::NoConfigPath),
        Some(path) => Ok(path),
    }
}

pub struct ConfigIOLocker {
    rw_lock: RwLock<std::fs::File>,
}

impl ConfigIOLocker {
    pub fn lock(&mut self) -> Result<RwLockWriteGuard<std::fs::File>, ConfigError> {
        match self.rw_lock.try_write() {
            Ok(guard) => Ok(guard),
            Err(source) => Err(ConfigError::CanNotLock { source }),
        }
    }
}

struct ConfigIOInner {
    file: std::fs::File,
}

#[derive(Clone)]
pub struct ConfigIO {
    inner: Arc<Mutex<ConfigIOInner>>,
}

impl ConfigIO {
    /// Open the config file at `path`, or at the default location when `path` is `None`.
    pub fn new_sync(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path,
            None => get_config_path()?,
        };
        info!("Using config file {}", path.to_string_lossy());

        if let Some(directory) = path.parent() {
            if !directory.as_os_str().is_empty() {
                std::fs::create_dir_all(directory)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .append(false)
            .create(true)
            .open(path)?;

        let inner = ConfigIOInner {
            file,
        };
        Ok(ConfigIO { inner: Arc::new(Mutex::new(inner)) })
    }

    // obtain an exclusive file lock so that this config file is used by only one bridge,
    // two bridges would fight over the same peripherals.
    pub fn locker(&mut self) -> Result<ConfigIOLocker, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");

        Ok(ConfigIOLocker {
            rw_lock: RwLock::new(inner.file.try_clone()?),
        })
    }

    // The File returned from here should never be closed!
    fn get_file(&self) -> Result<File, ConfigError> {
        let inner = self.inner.lock().expect("Failed to lock ConfigIO inner");
        let file = inner.file.try_clone()?; // std File
        Ok(File::from_std(file)) // tokio File
    }

    /// Read the config; `None` when the file is still empty.
    pub async fn read(&self) -> Result<Option<Config>, ConfigError> {
        let mut file = self.get_file()?;
        info!("Reading config file");

        let mut content = vec![];
        file.rewind().await?;
        file.read_to_end(&mut content).await?;

        if content.is_empty() {
            return Ok(None);
        }

        let content = str::from_utf8(&content)?;

        let mut config: Config = serde_json::from_str(content)?;
        config.normalize();
        Ok(Some(config))
    }

    pub async fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let mut file = self.get_file()?;
        info!("Saving config");

        let content = serde_json::to_string_pretty(config)?;
        file.rewind().await?;
        file.set_len(0).await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Read the config, writing the defaults first if the file is new.
    pub async fn load_or_init(&self) -> Result<Config, ConfigError> {
        match self.read().await? {
            Some(config) => Ok(config),
            None => {
                info!("Config file is empty, writing defaults");
                let config = Config::default();
                self.save(&config).await?;
                Ok(config)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(format!("freedrum-bridge-{}-{}.json", name, std::process::id()))
    }

    #[tokio::test]
    async fn empty_file_is_initialized_with_defaults() {
        let path = temp_path("init");
        let _ = fs::remove_file(&path);

        let config_io = ConfigIO::new_sync(Some(path.clone())).unwrap();
        let config = config_io.load_or_init().await.unwrap();
        assert_eq!(config, Config::default());

        let written: Config = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, Config::default());

        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn save_then_read() {
        let path = temp_path("save");
        let _ = fs::remove_file(&path);

        let config_io = ConfigIO::new_sync(Some(path.clone())).unwrap();
        let config = Config {
            debug: true,
            output: Some(PathBuf::from("/tmp/midi")),
            ..Config::default()
        };
        config_io.save(&config).await.unwrap();

        assert_eq!(config_io.read().await.unwrap(), Some(config));
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn second_lock_fails() {
        let path = temp_path("lock");
        let mut config_io = ConfigIO::new_sync(Some(path.clone())).unwrap();
        let mut first = config_io.locker().unwrap();
        let _guard = first.lock().unwrap();

        let mut other_io = ConfigIO::new_sync(Some(path.clone())).unwrap();
        let mut second = other_io.locker().unwrap();
        assert!(matches!(second.lock(), Err(ConfigError::CanNotLock { .. })));

        drop(_guard);
        fs::remove_file(&path).unwrap();
    }
}
