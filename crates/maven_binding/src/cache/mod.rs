use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

use crate::registry::BoundArtifact;

/// 本体ファイルの拡張子。この順に探す。
pub const PAYLOAD_EXTENSIONS: [&str; 2] = ["jar", "aar"];
/// POMの拡張子。
pub const MANIFEST_EXTENSION: &str = "pom";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("ホームディレクトリを特定できませんでした")]
    HomeDirNotFound,
    #[error("キャッシュパス {path:?} の親ディレクトリを解決できませんでした")]
    MissingParent { path: PathBuf },
    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
    #[error("キャッシュファイル {path:?} を配置できませんでした: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStatsSnapshot {
    pub payload_hits: u64,
    pub payload_misses: u64,
    pub manifest_hits: u64,
    pub manifest_misses: u64,
}

impl CacheStatsSnapshot {
    /// `earlier` 以降に増えた分。
    pub fn since(&self, earlier: &CacheStatsSnapshot) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            payload_hits: self.payload_hits.saturating_sub(earlier.payload_hits),
            payload_misses: self.payload_misses.saturating_sub(earlier.payload_misses),
            manifest_hits: self.manifest_hits.saturating_sub(earlier.manifest_hits),
            manifest_misses: self.manifest_misses.saturating_sub(earlier.manifest_misses),
        }
    }
}

#[derive(Debug, Default)]
struct CacheStats {
    payload_hits: AtomicU64,
    payload_misses: AtomicU64,
    manifest_hits: AtomicU64,
    manifest_misses: AtomicU64,
}

impl CacheStats {
    fn record_payload(&self, hit: bool) {
        let counter = if hit {
            &self.payload_hits
        } else {
            &self.payload_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn record_manifest(&self, hit: bool) {
        let counter = if hit {
            &self.manifest_hits
        } else {
            &self.manifest_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            payload_hits: self.payload_hits.load(Ordering::Relaxed),
            payload_misses: self.payload_misses.load(Ordering::Relaxed),
            manifest_hits: self.manifest_hits.load(Ordering::Relaxed),
            manifest_misses: self.manifest_misses.load(Ordering::Relaxed),
        }
    }
}

/// `<root>/<bucket>/<group>/<artifact>/<version>/<group>_<artifact>.<ext>` 形式のキャッシュ。
///
/// ファイルが存在すればキャッシュヒットとみなし、内容の検証は行わない。
#[derive(Debug)]
pub struct ArtifactCache {
    root: PathBuf,
    stats: CacheStats,
}

impl ArtifactCache {
    /// 既定のキャッシュルート (`~/.mvnbind/cache`)。
    pub fn default_root() -> Result<PathBuf, CacheError> {
        let home = dirs::home_dir().ok_or(CacheError::HomeDirNotFound)?;
        Ok(home.join(".mvnbind").join("cache"))
    }

    /// 指定ディレクトリでキャッシュを初期化する。
    pub fn with_dir(cache_dir: PathBuf) -> Result<Self, CacheError> {
        fs::create_dir_all(&cache_dir)?;
        Ok(Self {
            root: cache_dir,
            stats: CacheStats::default(),
        })
    }

    /// 座標とリポジトリに対応するバージョンディレクトリ。
    pub fn version_dir(&self, bound: &BoundArtifact) -> PathBuf {
        let artifact = bound.artifact();
        let mut dir = self.root.join(bound.bucket_name());
        dir.push(&artifact.group_id);
        dir.push(&artifact.artifact_id);
        dir.push(artifact.version());
        dir
    }

    /// 指定拡張子のキャッシュパス。存在の有無は問わない。
    pub fn entry_path(&self, bound: &BoundArtifact, extension: &str) -> PathBuf {
        self.version_dir(bound)
            .join(entry_file_name(bound, extension))
    }

    /// キャッシュ済みの本体ファイルを探す（`jar` → `aar`）。
    pub fn find_payload(&self, bound: &BoundArtifact) -> Option<PathBuf> {
        let found = PAYLOAD_EXTENSIONS
            .iter()
            .map(|extension| self.entry_path(bound, extension))
            .find(|path| path.is_file());
        self.stats.record_payload(found.is_some());
        if found.is_none() {
            debug!(artifact = %bound, "本体キャッシュミス");
        }
        found
    }

    /// キャッシュ済みのPOMを探す。
    pub fn find_manifest(&self, bound: &BoundArtifact) -> Option<PathBuf> {
        let path = self.entry_path(bound, MANIFEST_EXTENSION);
        let hit = path.is_file();
        self.stats.record_manifest(hit);
        if !hit {
            debug!(artifact = %bound, "POMキャッシュミス");
            return None;
        }
        Some(path)
    }

    /// 同じディレクトリ内の一時ファイルへ書き込んでから置き換える。
    ///
    /// 途中で失敗しても `path` に不完全なファイルは残らない。
    pub fn store(&self, path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
        let parent = path.parent().ok_or_else(|| CacheError::MissingParent {
            path: path.to_path_buf(),
        })?;
        fs::create_dir_all(parent)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(bytes)?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|error| CacheError::Persist {
            path: path.to_path_buf(),
            source: error.error,
        })?;
        set_file_permissions(path)?;
        debug!(path = %path.display(), size = bytes.len(), "キャッシュへ保存");
        Ok(())
    }

    /// これまでのキャッシュヒット・ミス数。
    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }
}

/// キャッシュ上のファイル名（`<group>_<artifact>.<ext>`）。
pub fn entry_file_name(bound: &BoundArtifact, extension: &str) -> String {
    format!("{}.{}", bound.artifact().file_stem(), extension)
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CacheError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CacheError> {
    Ok(())
}
