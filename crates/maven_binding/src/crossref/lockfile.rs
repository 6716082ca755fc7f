use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::error::BindingError;

/// 復元済みNuGetパッケージの索引。
pub trait PackageIndex: Send + Sync {
    /// パッケージIDは大文字小文字を区別せず、バージョンは NuGet の等価規則で探す。
    fn find_package(&self, id: &str, version: &str) -> Option<&LockedPackage>;

    /// パッケージが展開されているフォルダ（探索順）。
    fn package_folders(&self) -> &[PathBuf];
}

/// ロックファイル上の 1 パッケージ。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockedPackage {
    pub id: String,
    pub version: String,
    /// パッケージフォルダからの相対パス。
    pub path: String,
    pub files: Vec<String>,
}

impl LockedPackage {
    /// ファイル一覧の中の `.nuspec`。
    pub fn nuspec_file(&self) -> Option<&str> {
        self.files
            .iter()
            .map(String::as_str)
            .find(|file| file.to_ascii_lowercase().ends_with(".nuspec"))
    }
}

/// `project.assets.json` を読み取り専用の索引として扱う。
#[derive(Debug, Clone, Default)]
pub struct AssetsLockFile {
    packages: Vec<LockedPackage>,
    package_folders: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetsDocument {
    #[serde(default)]
    libraries: IndexMap<String, LibraryEntry>,
    #[serde(default)]
    package_folders: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LibraryEntry {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    files: Vec<String>,
}

impl AssetsLockFile {
    pub fn load(path: &Path) -> Result<Self, BindingError> {
        let unreadable = |message: String| BindingError::LockFileUnreadable {
            path: path.to_path_buf(),
            message,
        };
        let contents = fs::read_to_string(path).map_err(|error| unreadable(error.to_string()))?;
        Self::parse(&contents).map_err(|error| unreadable(error.to_string()))
    }

    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let document: AssetsDocument = serde_json::from_str(json)?;

        let packages = document
            .libraries
            .into_iter()
            .filter(|(_, entry)| {
                entry
                    .kind
                    .as_deref()
                    .is_none_or(|kind| kind.eq_ignore_ascii_case("package"))
            })
            .filter_map(|(key, entry)| {
                let Some((id, version)) = key.split_once('/') else {
                    debug!(library = %key, "ID/バージョン形式でないライブラリを無視します");
                    return None;
                };
                Some(LockedPackage {
                    id: id.to_string(),
                    version: version.to_string(),
                    path: entry.path.unwrap_or_else(|| key.to_ascii_lowercase()),
                    files: entry.files,
                })
            })
            .collect();

        let package_folders = document
            .package_folders
            .into_keys()
            .map(PathBuf::from)
            .collect();

        Ok(Self {
            packages,
            package_folders,
        })
    }

}

impl PackageIndex for AssetsLockFile {
    fn find_package(&self, id: &str, version: &str) -> Option<&LockedPackage> {
        self.packages.iter().find(|package| {
            package.id.eq_ignore_ascii_case(id) && same_nuget_version(&package.version, version)
        })
    }

    fn package_folders(&self) -> &[PathBuf] {
        &self.package_folders
    }
}

/// NuGet のバージョン等価判定。
///
/// 数値部は 4 要素まで 0 で補って比較し（`1.0` == `1.0.0.0`）、`+` 以降の
/// ビルドメタデータは無視する。プレリリースラベルは大文字小文字を区別しない。
/// 数値として読めない場合は文字列として比較する。
pub fn same_nuget_version(left: &str, right: &str) -> bool {
    match (NuGetVersionKey::parse(left), NuGetVersionKey::parse(right)) {
        (Some(left), Some(right)) => left == right,
        _ => left.trim().eq_ignore_ascii_case(right.trim()),
    }
}

#[derive(Debug, PartialEq, Eq)]
struct NuGetVersionKey {
    release: [u64; 4],
    prerelease: String,
}

impl NuGetVersionKey {
    fn parse(version: &str) -> Option<Self> {
        let without_metadata = version.trim().split('+').next().unwrap_or_default();
        let (release_text, prerelease) = match without_metadata.split_once('-') {
            Some((release, label)) => (release, label.to_ascii_lowercase()),
            None => (without_metadata, String::new()),
        };

        let parts = release_text.split('.').collect::<Vec<_>>();
        if parts.is_empty() || parts.len() > 4 {
            return None;
        }
        let mut release = [0u64; 4];
        for (slot, part) in release.iter_mut().zip(parts) {
            *slot = part.parse().ok()?;
        }
        Some(Self { release, prerelease })
    }
}
