//! Cross-references between Maven artifacts and NuGet packages.
//!
//! Two directions are covered: a static `javaId -> nugetId` mapping used to
//! suggest a replacement package for an unsatisfied dependency, and the
//! Maven coordinate a restored NuGet package declares in its `.nuspec` tags.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::Document;
use serde::Deserialize;
use tracing::debug;

use crate::error::BindingError;
use crate::log::BuildLog;
use crate::registry::MavenArtifact;

pub mod lockfile;

pub use lockfile::{AssetsLockFile, LockedPackage, PackageIndex};

/// キャッシュディレクトリ直下に置かれる対応表のファイル名。
pub const MAPPING_FILE_NAME: &str = "microsoft-packages.json";

static VERSIONED_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)artifact_versioned=([^\s:]+):([^\s:]+):(\S+)")
        .expect("artifact_versioned pattern")
});
static PLAIN_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:^|\s)artifact=([^\s:]+):([^\s:]+):(\S+)").expect("artifact pattern")
});

#[derive(Debug, Default, Deserialize)]
struct PackageListFile {
    #[serde(default)]
    packages: Vec<PackageEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct PackageEntry {
    #[serde(rename = "javaId", default)]
    java_id: Option<String>,
    #[serde(rename = "nugetId", default)]
    nuget_id: Option<String>,
}

/// 未解決の依存関係に対する NuGet パッケージ候補。
///
/// 対応表がない・壊れている場合は候補なしで動作する。
#[derive(Debug, Default)]
pub struct PackageSuggestions {
    packages: Vec<PackageEntry>,
}

impl PackageSuggestions {
    pub fn load(cache_dir: &Path, log: &dyn BuildLog) -> Self {
        let file = cache_dir.join(MAPPING_FILE_NAME);
        if !file.is_file() {
            log.log_message(&format!(
                "'{MAPPING_FILE_NAME}' が見つからないため、NuGetパッケージの候補は表示されません"
            ));
            return Self::default();
        }

        let parsed = fs::read_to_string(&file)
            .map_err(|error| error.to_string())
            .and_then(|json| Self::parse(&json).map_err(|error| error.to_string()));
        match parsed {
            Ok(suggestions) => suggestions,
            Err(error) => {
                log.log_message(&format!(
                    "'{MAPPING_FILE_NAME}' の読み込みに失敗したため、NuGetパッケージの候補は表示されません: {error}"
                ));
                Self::default()
            }
        }
    }

    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let file: PackageListFile = serde_json::from_str(json)?;
        Ok(Self {
            packages: file.packages,
        })
    }

    /// `group:artifact` に対応する NuGet パッケージID。
    pub fn suggestion(&self, java_id: &str) -> Option<&str> {
        self.packages
            .iter()
            .find(|entry| {
                entry
                    .java_id
                    .as_deref()
                    .is_some_and(|id| id.eq_ignore_ascii_case(java_id))
            })
            .and_then(|entry| entry.nuget_id.as_deref())
    }
}

/// 復元済みパッケージの `.nuspec` タグから Maven 座標を読み取る。
pub struct JavaMetadataFinder<I = AssetsLockFile>
where
    I: PackageIndex,
{
    index: I,
    cache: HashMap<(String, String), MavenArtifact>,
}

impl<I> JavaMetadataFinder<I>
where
    I: PackageIndex,
{
    pub fn new(index: I) -> Self {
        Self {
            index,
            cache: HashMap::new(),
        }
    }

    /// パッケージが宣言する Maven 座標を返す。
    ///
    /// 索引にパッケージがなければ `LockFileStale`。`.nuspec` にタグがなければ `None`。
    pub fn java_information(
        &mut self,
        package: &str,
        version: &str,
    ) -> Result<Option<MavenArtifact>, BindingError> {
        let key = (package.to_ascii_lowercase(), version.to_string());
        if let Some(cached) = self.cache.get(&key) {
            return Ok(Some(cached.clone()));
        }

        let locked = self
            .index
            .find_package(package, version)
            .ok_or_else(|| BindingError::LockFileStale {
                package: package.to_string(),
                version: version.to_string(),
            })?;

        let Some(nuspec) = locked.nuspec_file() else {
            debug!(package, version, "nuspec がありません");
            return Ok(None);
        };

        let found = self.index.package_folders().iter().find_map(|folder| {
            let path = folder.join(&locked.path).join(nuspec);
            read_nuspec_tags(&path).and_then(|tags| artifact_from_tags(&tags))
        });

        if let Some(artifact) = &found {
            self.cache.insert(key, artifact.clone());
        }
        Ok(found)
    }
}

fn read_nuspec_tags(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    let document = match Document::parse(&contents) {
        Ok(document) => document,
        Err(error) => {
            debug!(path = %path.display(), %error, "nuspec を解析できません");
            return None;
        }
    };
    document
        .descendants()
        .find(|node| node.is_element() && node.tag_name().name() == "tags")
        .and_then(|node| node.text())
        .map(str::to_string)
}

/// `artifact_versioned=g:a:v` を優先し、なければ `artifact=g:a:v` を探す。
pub fn artifact_from_tags(tags: &str) -> Option<MavenArtifact> {
    VERSIONED_TAG
        .captures(tags)
        .or_else(|| PLAIN_TAG.captures(tags))
        .map(|captures| MavenArtifact::new(&captures[1], &captures[2], &captures[3]))
}
