use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;

/// Last reported value of every sensor, persisted as a JSON object
/// `{ "<sensor id>": "<value>" }` so sensors resume after a restart.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
    /// Serializes writers so they never share the temp file.
    write_lock: tokio::sync::Mutex<()>,
}

impl StateStore {
    /// Loads the store at `path`. A missing file yields an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let values = match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str(&data)
                .with_context(|| format!("parsing state file {}", path.display()))?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("reading state file {}", path.display()))
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            values: Mutex::new(values),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Persisted value of a sensor, as written.
    pub fn get(&self, sensor: &str) -> Option<String> {
        self.values.lock().get(sensor).cloned()
    }

    pub fn set(&self, sensor: &str, value: f64) {
        self.values
            .lock()
            .insert(sensor.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// Writes the store to disk, replacing the file atomically.
    pub async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let data = {
            let values = self.values.lock();
            serde_json::to_vec_pretty(&*values).context("serializing state")?
        };

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir)
                .await
                .with_context(|| format!("creating state directory {}", dir.display()))?;
        }

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, &data)
            .await
            .with_context(|| format!("writing state file {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing state file {}", self.path.display()))?;

        tracing::debug!(path = %self.path.display(), bytes = data.len(), "state persisted");

        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
