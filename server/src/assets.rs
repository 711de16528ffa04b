//! Asset inventory: how many images of each category the clients can load
//!
//! The server core only needs two numbers. Regular images are `N.png` files
//! in the images directory, peaceful images are `N.jpg` files in the
//! peaceful directory. A missing or unreadable directory counts as empty.

use log::{info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AssetCounts {
    pub regular: u32,
    pub peaceful: u32,
}

/// Source of the asset counts, queried once when the first session connects
pub trait AssetInventory: Send + Sync {
    fn counts(&self) -> AssetCounts;
}

/// Counts assets by scanning two directories on disk
#[derive(Debug, Clone)]
pub struct DirectoryInventory {
    images_dir: PathBuf,
    peaceful_dir: PathBuf,
}

impl DirectoryInventory {
    pub fn new(images_dir: impl Into<PathBuf>, peaceful_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
            peaceful_dir: peaceful_dir.into(),
        }
    }
}

impl AssetInventory for DirectoryInventory {
    fn counts(&self) -> AssetCounts {
        let regular = count_or_zero(&self.images_dir, "png");
        let peaceful = count_or_zero(&self.peaceful_dir, "jpg");
        info!(
            "Found {} regular images in {} and {} peaceful images in {}",
            regular,
            self.images_dir.display(),
            peaceful,
            self.peaceful_dir.display()
        );
        AssetCounts { regular, peaceful }
    }
}

/// Fixed counts, for tests and for running without assets on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedInventory(pub AssetCounts);

impl AssetInventory for FixedInventory {
    fn counts(&self) -> AssetCounts {
        self.0
    }
}

fn count_or_zero(dir: &Path, extension: &str) -> u32 {
    count_files(dir, extension).unwrap_or_else(|e| {
        warn!("Error reading asset directory {}: {}", dir.display(), e);
        0
    })
}

/// Counts regular files whose extension matches, ignoring case
fn count_files(dir: &Path, extension: &str) -> io::Result<u32> {
    let mut count = 0u32;

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }

        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case(extension))
            .unwrap_or(false);

        if matches {
            count = count.saturating_add(1);
        }
    }

    Ok(count)
}
