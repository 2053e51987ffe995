use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where a captured payload ended up, plus its digest for matching report rows to files.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoredArtifact {
    pub name: String,
    pub location: String,
    pub sha256: String,
    pub bytes: usize,
}

pub trait ArtifactStore {
    fn store(&mut self, name: &str, bytes: &[u8]) -> Result<StoredArtifact>;
}

/// Artifact name for a scheduled capture, `tyre_{id}_{label}.jpg`.
pub fn trigger_artifact_name(entity_id: u64, label: &str) -> String {
    format!("tyre_{}_{}.jpg", entity_id, sanitize(label))
}

/// Artifact name for the `n`th manual capture, `manual_{NN}.jpg`.
pub fn manual_artifact_name(n: u32) -> String {
    format!("manual_{:02}.jpg", n)
}

fn sanitize(label: &str) -> String {
    let cleaned: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "unlabelled".to_string()
    } else {
        cleaned
    }
}

fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
        return Err(anyhow!("invalid artifact name '{}'", name));
    }
    Ok(())
}

pub struct FilesystemArtifactStore {
    dir: PathBuf,
}

impl FilesystemArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create artifact directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactStore for FilesystemArtifactStore {
    fn store(&mut self, name: &str, bytes: &[u8]) -> Result<StoredArtifact> {
        check_name(name)?;
        let path = self.dir.join(name);
        std::fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        log::debug!("saved {} ({} bytes)", path.display(), bytes.len());
        Ok(StoredArtifact {
            name: name.to_string(),
            location: path.display().to_string(),
            sha256: digest_hex(bytes),
            bytes: bytes.len(),
        })
    }
}

/// Keeps artifacts in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: BTreeMap<String, Vec<u8>>,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.artifacts.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> Vec<&str> {
        self.artifacts.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}

impl ArtifactStore for InMemoryArtifactStore {
    fn store(&mut self, name: &str, bytes: &[u8]) -> Result<StoredArtifact> {
        check_name(name)?;
        self.artifacts.insert(name.to_string(), bytes.to_vec());
        Ok(StoredArtifact {
            name: name.to_string(),
            location: format!("memory:{}", name),
            sha256: digest_hex(bytes),
            bytes: bytes.len(),
        })
    }
}

/// Drops every payload; the digest is still computed.
#[derive(Debug, Default)]
pub struct DiscardArtifactStore;

impl ArtifactStore for DiscardArtifactStore {
    fn store(&mut self, name: &str, bytes: &[u8]) -> Result<StoredArtifact> {
        Ok(StoredArtifact {
            name: name.to_string(),
            location: "discarded".to_string(),
            sha256: digest_hex(bytes),
            bytes: bytes.len(),
        })
    }
}
