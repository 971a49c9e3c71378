//! Artifact directory: file layout, writes and the run lock

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::{Result, Stage, TallyError};

pub const PUBLIC_KEY_FILE: &str = "publickey.key";
pub const SECRET_KEY_FILE: &str = "secretkey.key";
pub const FINAL_TALLY_FILE: &str = "final_tally.bin";
pub const METADATA_FILE: &str = "metadata.json";
/// Staging name used by [`ArtifactStore::write_atomic`] for `metadata.json`
pub const METADATA_TMP_FILE: &str = "metadata.json.tmp";
pub const LOCK_FILE: &str = ".run.lock";

const BALLOT_PREFIX: &str = "vote_";
const BALLOT_SUFFIX: &str = ".bin";

/// Directory holding the artifacts of one run
#[derive(Clone, Debug)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    /// Open the directory, creating it if needed
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| TallyError::io(Stage::Setup, &dir, e))?;
        Ok(ArtifactStore { dir })
    }

    /// Open an existing directory without creating it
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        ArtifactStore { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    pub fn write(&self, stage: Stage, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(name);
        fs::write(&path, bytes).map_err(|e| TallyError::io(stage, &path, e))?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Write through a temporary file and rename, so `name` only ever holds
    /// complete contents
    pub fn write_atomic(&self, stage: Stage, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(name);
        let tmp = self.path(&format!("{}.tmp", name));

        let write_tmp = || -> io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()
        };
        if let Err(e) = write_tmp() {
            let _ = fs::remove_file(&tmp);
            return Err(TallyError::io(stage, &tmp, e));
        }

        fs::rename(&tmp, &path).map_err(|e| TallyError::io(stage, &path, e))?;
        debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    pub fn read(&self, stage: Stage, name: &str) -> Result<Vec<u8>> {
        let path = self.path(name);
        fs::read(&path).map_err(|e| TallyError::io(stage, &path, e))
    }

    /// Names of all `vote_*.bin` files in the directory, sorted
    pub fn ballot_files(&self, stage: Stage) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| TallyError::io(stage, &self.dir, e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TallyError::io(stage, &self.dir, e))?;
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(BALLOT_PREFIX) && name.ends_with(BALLOT_SUFFIX) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Take exclusive ownership of the directory for one run
    pub fn lock(&self) -> Result<RunLock> {
        let path = self.path(LOCK_FILE);
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                let e = if e.kind() == io::ErrorKind::AlreadyExists {
                    io::Error::new(e.kind(), "artifact directory is locked by another run")
                } else {
                    e
                };
                TallyError::io(Stage::Setup, &path, e)
            })?;
        Ok(RunLock { path })
    }
}

/// Lock file removed when dropped
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;

    use rand::Rng;

    /// Fresh scratch directory under the system temp dir
    pub fn scratch_dir(label: &str) -> PathBuf {
        let suffix: u64 = rand::thread_rng().gen();
        std::env::temp_dir().join(format!("vhe-tally-{}-{:016x}", label, suffix))
    }
}
