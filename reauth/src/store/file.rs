//! A credential store that keeps one JSON file per identity

use std::{
    io,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use reauth_clock::{Clock, System};
use tokio::{fs, io::AsyncWriteExt};

use super::{is_persistable, CredentialStore, StoreError};
use crate::{Credential, IdentityRef, ProviderId};

/// The directory used when none is configured, relative to the working directory
pub const DEFAULT_CACHE_DIR: &str = "Cache";

/// A credential store backed by a directory of JSON records
///
/// Each `(identity, provider)` gets its own `{identity}-{provider}.json`
/// file, rewritten wholesale on every save. Writes go to a temporary file
/// that is renamed into place, so a torn write never reads back as a record.
#[derive(Debug)]
pub struct FileCredentialStore<C = System> {
    dir: PathBuf,
    clock: C,
}

impl FileCredentialStore<System> {
    /// Constructs a store rooted at `dir`
    ///
    /// The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            clock: System,
        }
    }

    /// Constructs a store rooted at `./Cache` under the current working directory
    pub fn in_working_dir() -> io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?.join(DEFAULT_CACHE_DIR)))
    }
}

impl<C> FileCredentialStore<C> {
    /// Sets a custom clock to be used when judging expiry
    ///
    /// Useful for testing purposes
    pub fn with_clock<D>(self, clock: D) -> FileCredentialStore<D> {
        FileCredentialStore {
            dir: self.dir,
            clock,
        }
    }

    /// The directory holding the records
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The path of the record for the given key
    pub fn record_path(&self, identity: &IdentityRef, provider: ProviderId) -> PathBuf {
        self.dir.join(record_name(identity, provider))
    }
}

/// Derives the record file name for a key
///
/// Bytes outside `[A-Za-z0-9._@-]` are percent-encoded, so distinct
/// identities always map to distinct names and never escape the directory.
fn record_name(identity: &IdentityRef, provider: ProviderId) -> String {
    use std::fmt::Write;

    let mut name = String::with_capacity(identity.as_str().len() + 12);
    for b in identity.as_str().bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'@' | b'-') {
            name.push(char::from(b));
        } else {
            let _ = write!(name, "%{:02X}", b);
        }
    }

    format!("{}-{}.json", name, provider.as_str())
}

async fn read_record(path: &Path) -> Result<Credential, StoreError> {
    let data = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&data)?)
}

async fn write_record(path: &Path, data: &[u8]) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file_opts = fs::OpenOptions::new();
    file_opts.create(true).truncate(true).write(true);

    #[cfg(unix)]
    file_opts.mode(0o600);

    let mut file = file_opts.open(&tmp).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    fs::rename(&tmp, path).await
}

#[async_trait]
impl<C: Clock + Send + Sync> CredentialStore for FileCredentialStore<C> {
    async fn load(&self, identity: &IdentityRef, provider: ProviderId) -> Option<Credential> {
        let path = self.record_path(identity, provider);

        let credential = match read_record(&path).await {
            Ok(credential) => credential,
            Err(StoreError::Io(error)) if error.kind() == io::ErrorKind::NotFound => {
                tracing::trace!(path = %path.display(), "no cached credential");
                return None;
            }
            Err(error) => {
                tracing::debug!(
                    path = %path.display(),
                    error = (&error as &dyn std::error::Error),
                    "cached credential unreadable, treating as missing"
                );
                return None;
            }
        };

        if credential.identity() != identity || credential.provider() != provider {
            tracing::debug!(path = %path.display(), "cached credential belongs to another key, ignoring");
            return None;
        }

        if credential.needs_login_at(self.clock.now()) {
            tracing::debug!(path = %path.display(), "cached credential already expired");
            return None;
        }

        Some(credential)
    }

    async fn save(&self, credential: &Credential) -> Result<(), StoreError> {
        if !is_persistable(credential, self.clock.now()) {
            tracing::trace!("credential not fit for persisting, skipping save");
            return Ok(());
        }

        fs::create_dir_all(&self.dir).await?;

        let path = self.record_path(credential.identity(), credential.provider());
        let data = serde_json::to_vec_pretty(credential)?;
        write_record(&path, &data).await?;

        tracing::debug!(path = %path.display(), "credential saved");
        Ok(())
    }

    async fn delete(&self, identity: &IdentityRef, provider: ProviderId) -> Result<(), StoreError> {
        let path = self.record_path(identity, provider);
        match fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), "cached credential removed");
                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    fn name(&self) -> &str {
        "file"
    }
}
