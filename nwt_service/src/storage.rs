use std::path::{Component, Path, PathBuf};

use anyhow::Context;
use tokio::io::AsyncWriteExt;

/// Object storage rooted at a local directory and served publicly from a CDN
/// base URL, so an object's public URL is `{public_base_url}/{key}`.
pub struct ObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl ObjectStorage {
    pub async fn new(root: impl AsRef<Path>, public_base_url: &str) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create upload directory `{}`", root.display()))?;
        Ok(Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }

    /// Maps a key onto the storage root, refusing anything that could escape it.
    pub fn resolve(&self, key: &str) -> Option<PathBuf> {
        let relative = Path::new(key);
        if key.is_empty() || key.contains('\\') {
            return None;
        }
        let only_normal = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        only_normal.then(|| self.root.join(relative))
    }

    pub async fn put(&self, key: &str, bytes: &[u8]) -> anyhow::Result<()> {
        let path = self
            .resolve(key)
            .with_context(|| format!("Invalid storage key `{}`", key))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create `{}`", parent.display()))?;
        }

        // Write beside the target and rename so readers never see a partial object.
        let mut tmp_path = path.clone().into_os_string();
        tmp_path.push(".part");
        let tmp_path = PathBuf::from(tmp_path);
        let mut file = tokio::fs::File::create(&tmp_path)
            .await
            .with_context(|| format!("Could not open file `{}`", tmp_path.display()))?;
        file.write_all(bytes)
            .await
            .context("Failed to write object")?;
        file.flush().await.context("Failed to flush object")?;
        tokio::fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to move object into `{}`", path.display()))?;

        log::debug!("Stored {} bytes at {}", bytes.len(), path.display());
        Ok(())
    }

    /// Returns false when there was nothing to delete.
    pub async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        let path = self
            .resolve(key)
            .with_context(|| format!("Invalid storage key `{}`", key))?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to delete `{}`", path.display())),
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self.resolve(key) {
            Some(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            None => false,
        }
    }
}
