use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Flat directory of uploaded images keyed by `<sha256><extension>`.
/// Files are only ever added, never modified or removed.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage unavailable: {0}")]
    Unavailable(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub checksum: String,
    pub path: PathBuf,
    pub newly_written: bool,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn calculate_checksum(image_data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(image_data);
        hex::encode(hasher.finalize())
    }

    pub fn generate_key(checksum: &str, extension: &str) -> String {
        format!("{}{}", checksum, extension)
    }

    /// Stores `image_data` under its content key, skipping the write when an
    /// object with that key already exists. `extension` must already be
    /// validated and include the leading dot.
    pub fn put(&self, image_data: &[u8], extension: &str) -> Result<StoredImage, StoreError> {
        let checksum = Self::calculate_checksum(image_data);
        let path = self.root.join(Self::generate_key(&checksum, extension));

        if path.is_file() {
            log::debug!("Image {} already stored", path.display());
            return Ok(StoredImage {
                checksum,
                path,
                newly_written: false,
            });
        }

        fs::create_dir_all(&self.root)?;
        self.write_atomic(&path, image_data)?;
        log::info!("Stored new image {}", path.display());

        Ok(StoredImage {
            checksum,
            path,
            newly_written: true,
        })
    }

    // Concurrent writers of the same key race here; all of them hold
    // identical bytes, so whichever rename lands last is equivalent.
    fn write_atomic(&self, path: &Path, image_data: &[u8]) -> io::Result<()> {
        let tmp_path = self.root.join(format!(".{}.tmp", Uuid::new_v4()));

        let written = fs::File::create(&tmp_path).and_then(|mut file| {
            file.write_all(image_data)?;
            file.sync_all()
        });
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        if let Err(e) = fs::rename(&tmp_path, path) {
            let _ = fs::remove_file(&tmp_path);
            if path.is_file() {
                return Ok(());
            }
            return Err(e);
        }
        Ok(())
    }
}
