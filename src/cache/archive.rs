//! Dependency root archiving
//!
//! Each dependency root becomes one gzip-compressed tar blob holding the
//! root's contents at their relative paths. Roots touch disjoint paths, so
//! they are packed and extracted concurrently on the blocking pool.

use crate::cache::CacheEntry;
use crate::error::{DepcacheError, DepcacheResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::future::try_join_all;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// File extension of every cache blob
pub const ARCHIVE_EXT: &str = "tar.gz";

/// Packs dependency roots into cache blobs and extracts them again
#[derive(Debug, Clone)]
pub struct ArtifactArchiver {
    staging_root: PathBuf,
}

impl ArtifactArchiver {
    /// Archives are assembled in private directories under `staging_root`
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
        }
    }

    /// Archive every root of `entry` found under `work_dir` into `out_dir`.
    ///
    /// Blobs are assembled in a staging directory and only moved into
    /// `out_dir` once all of them are complete; the staging directory is
    /// removed whatever the outcome. A root that does not exist is archived
    /// as an empty tree.
    pub async fn pack(
        &self,
        entry: &CacheEntry,
        work_dir: &Path,
        out_dir: &Path,
    ) -> DepcacheResult<()> {
        let staging = tempfile::Builder::new()
            .prefix("pack-")
            .tempdir_in(&self.staging_root)
            .map_err(|e| DepcacheError::archive("creating pack staging directory", e))?;

        let jobs = entry.roots().iter().map(|root| {
            let src = root.resolve(work_dir);
            let dst = staging.path().join(entry.blob_name(root));
            async move {
                debug!("Packing {} -> {}", src.display(), dst.display());
                tokio::task::spawn_blocking(move || pack_root(&src, &dst))
                    .await
                    .map_err(|e| DepcacheError::Internal(format!("pack task failed: {e}")))?
            }
        });
        try_join_all(jobs).await?;

        fs::create_dir_all(out_dir)
            .await
            .map_err(|e| DepcacheError::archive(format!("creating {}", out_dir.display()), e))?;

        for name in entry.blob_names() {
            move_file(&staging.path().join(&name), &out_dir.join(&name)).await?;
        }

        info!("Packed {} dependency roots for {}", entry.roots().len(), entry);
        Ok(())
    }

    /// Extract the blobs of `entry` found in `blob_dir` into `work_dir`.
    ///
    /// Each root is replaced wholesale so stale packages from a previous
    /// manifest do not survive.
    pub async fn unpack(
        &self,
        entry: &CacheEntry,
        blob_dir: &Path,
        work_dir: &Path,
    ) -> DepcacheResult<()> {
        let jobs = entry.roots().iter().map(|root| {
            let blob = blob_dir.join(entry.blob_name(root));
            let dest = root.resolve(work_dir);
            async move {
                debug!("Extracting {} -> {}", blob.display(), dest.display());
                tokio::task::spawn_blocking(move || unpack_root(&blob, &dest))
                    .await
                    .map_err(|e| DepcacheError::Internal(format!("unpack task failed: {e}")))?
            }
        });
        try_join_all(jobs).await?;

        info!("Extracted {} into {}", entry, work_dir.display());
        Ok(())
    }
}

fn pack_root(src: &Path, dst: &Path) -> DepcacheResult<()> {
    let file = File::create(dst)
        .map_err(|e| DepcacheError::archive(format!("creating {}", dst.display()), e))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    if src.is_dir() {
        builder
            .append_dir_all(".", src)
            .map_err(|e| DepcacheError::archive(format!("archiving {}", src.display()), e))?;
    } else {
        debug!("{} does not exist, archiving empty tree", src.display());
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| DepcacheError::archive(format!("finalizing {}", dst.display()), e))?;
    encoder
        .finish()
        .map_err(|e| DepcacheError::archive(format!("compressing {}", dst.display()), e))?;
    Ok(())
}

fn unpack_root(blob: &Path, dest: &Path) -> DepcacheResult<()> {
    let file = File::open(blob)
        .map_err(|e| DepcacheError::archive(format!("opening {}", blob.display()), e))?;

    if dest.exists() {
        std::fs::remove_dir_all(dest)
            .map_err(|e| DepcacheError::archive(format!("clearing {}", dest.display()), e))?;
    }
    std::fs::create_dir_all(dest)
        .map_err(|e| DepcacheError::archive(format!("creating {}", dest.display()), e))?;

    let mut archive = tar::Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive
        .unpack(dest)
        .map_err(|e| DepcacheError::archive(format!("extracting {}", blob.display()), e))
}

/// Rename `from` to `to`, copying when they live on different filesystems
pub(crate) async fn move_file(from: &Path, to: &Path) -> DepcacheResult<()> {
    if fs::rename(from, to).await.is_ok() {
        return Ok(());
    }

    fs::copy(from, to).await.map_err(|e| {
        DepcacheError::archive(format!("copying {} to {}", from.display(), to.display()), e)
    })?;
    fs::remove_file(from)
        .await
        .map_err(|e| DepcacheError::archive(format!("removing {}", from.display()), e))
}
