use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use ed25519_dalek::SigningKey;
use tracing::debug;

use crate::runtime::{Runtime, RuntimeConfig};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("corrupt state file {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("keypair file {} must hold a 32-byte secret key in hex", .0.display())]
    Keypair(PathBuf),
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// JSON file holding the full runtime state between CLI invocations.
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the stored runtime, or starts a fresh one with `config` when
    /// the file does not exist yet.
    pub fn load_or_init(&self, config: RuntimeConfig) -> Result<Runtime, StoreError> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no state file, starting fresh");
            return Ok(Runtime::new(config));
        }
        self.load()
    }

    pub fn load(&self) -> Result<Runtime, StoreError> {
        let bytes = fs::read(&self.path).map_err(io_err(&self.path))?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Writes a sibling temp file, then renames it over the target.
    pub fn save(&self, runtime: &Runtime) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(runtime).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err(parent))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp).map_err(io_err(&tmp))?;
            f.write_all(&json).map_err(io_err(&tmp))?;
            f.sync_all().map_err(io_err(&tmp))?;
        }
        fs::rename(&tmp, &self.path).map_err(io_err(&self.path))?;
        debug!(path = %self.path.display(), slot = runtime.slot(), "state saved");
        Ok(())
    }
}

pub fn write_keypair(path: &Path, key: &SigningKey) -> Result<(), StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        // owner read/write only
        options.mode(0o600);
    }
    let mut f = options.open(path).map_err(io_err(path))?;
    f.write_all(hex::encode(key.to_bytes()).as_bytes()).map_err(io_err(path))
}

pub fn read_keypair(path: &Path) -> Result<SigningKey, StoreError> {
    let text = fs::read_to_string(path).map_err(io_err(path))?;
    let bytes = hex::decode(text.trim()).map_err(|_| StoreError::Keypair(path.to_path_buf()))?;
    let secret: [u8; 32] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| StoreError::Keypair(path.to_path_buf()))?;
    Ok(SigningKey::from_bytes(&secret))
}
