use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cache::{ArtifactCache, MANIFEST_EXTENSION, PAYLOAD_EXTENSIONS, entry_file_name};
use crate::error::{BindingError, EntryKind, FetchAttempt};
use crate::log::BuildLog;
use crate::pom::detect_parent;
use crate::registry::{ArtifactFetcher, BoundArtifact, MavenArtifact, MavenRegistry, Repository};

#[derive(Debug, Clone)]
pub struct DownloadSettings {
    pub default_max_concurrent: usize,
    pub warning_threshold: usize,
    pub hard_limit: usize,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            default_max_concurrent: 8,
            warning_threshold: 16,
            hard_limit: 32,
        }
    }
}

/// 実際に適用する並列ダウンロード数と、補正時の警告。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConcurrency {
    pub applied: usize,
    pub warnings: Vec<String>,
}

/// 親POMの取得結果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentManifest {
    /// `<parent>` がない。
    NotRequired,
    Resolved {
        parent: MavenArtifact,
        path: PathBuf,
    },
    /// 親を宣言しているが取得できなかった。
    Missing {
        parent: MavenArtifact,
        error: BindingError,
    },
    /// 子POM自体を読めず親の有無を判定できなかった。
    Undetectable(BindingError),
}

impl ParentManifest {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ParentManifest::Resolved { path, .. } => Some(path),
            _ => None,
        }
    }

    /// 取得できなかった場合に情報メッセージを出す。エラー扱いにはしない。
    pub fn report(&self, log: &dyn BuildLog) {
        match self {
            ParentManifest::Missing { parent, error } => {
                let diagnostic = BindingError::ParentManifestNotFound {
                    parent: parent.to_string(),
                    reason: error.to_string(),
                };
                log.log_message(&diagnostic.to_string());
            }
            ParentManifest::Undetectable(error) => log.log_message(&error.to_string()),
            ParentManifest::NotRequired | ParentManifest::Resolved { .. } => {}
        }
    }
}

/// 座標をキャッシュ上のファイルへ解決する。
///
/// キャッシュにあればそれを返し、なければリポジトリから取得して保存する。
pub struct DownloadManager<F = MavenRegistry>
where
    F: ArtifactFetcher + 'static,
{
    fetcher: Arc<F>,
    cache: Arc<ArtifactCache>,
    settings: DownloadSettings,
    config_max_concurrent: Option<usize>,
    config_warning_threshold: Option<usize>,
    cli_max_concurrent: Option<usize>,
}

impl<F> Clone for DownloadManager<F>
where
    F: ArtifactFetcher + 'static,
{
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            cache: Arc::clone(&self.cache),
            settings: self.settings.clone(),
            config_max_concurrent: self.config_max_concurrent,
            config_warning_threshold: self.config_warning_threshold,
            cli_max_concurrent: self.cli_max_concurrent,
        }
    }
}

impl<F> DownloadManager<F>
where
    F: ArtifactFetcher + 'static,
{
    pub fn new(fetcher: Arc<F>, cache: Arc<ArtifactCache>) -> Self {
        Self {
            fetcher,
            cache,
            settings: DownloadSettings::default(),
            config_max_concurrent: None,
            config_warning_threshold: None,
            cli_max_concurrent: None,
        }
    }

    pub fn with_config_limits(
        mut self,
        max_concurrent: Option<usize>,
        warning_threshold: Option<usize>,
    ) -> Self {
        self.config_max_concurrent = max_concurrent;
        self.config_warning_threshold = warning_threshold;
        self
    }

    pub fn with_cli_max_concurrent(mut self, value: Option<usize>) -> Self {
        self.cli_max_concurrent = value;
        self
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// 本体ファイルを解決する。
    ///
    /// キャッシュ済み `jar`、キャッシュ済み `aar`、`jar` の取得、`aar` の取得の順に試す。
    pub async fn resolve_payload(&self, bound: &BoundArtifact) -> Result<PathBuf, BindingError> {
        if let Some(path) = self.cache.find_payload(bound) {
            debug!(artifact = %bound, path = %path.display(), "本体キャッシュヒット");
            return Ok(path);
        }

        let mut attempts = Vec::with_capacity(PAYLOAD_EXTENSIONS.len());
        for extension in PAYLOAD_EXTENSIONS {
            match self.fetch_into_cache(bound, extension).await {
                Ok(path) => return Ok(path),
                Err(reason) => {
                    debug!(artifact = %bound, extension, %reason, "本体の取得に失敗");
                    attempts.push(FetchAttempt::new(entry_file_name(bound, extension), reason));
                }
            }
        }

        Err(BindingError::DownloadFailure {
            artifact: bound.artifact().id(),
            kind: EntryKind::Payload,
            attempts,
        })
    }

    /// POMを解決する。
    pub async fn resolve_manifest(&self, bound: &BoundArtifact) -> Result<PathBuf, BindingError> {
        if let Some(path) = self.cache.find_manifest(bound) {
            debug!(artifact = %bound, path = %path.display(), "POMキャッシュヒット");
            return Ok(path);
        }

        self.fetch_into_cache(bound, MANIFEST_EXTENSION)
            .await
            .map_err(|reason| BindingError::DownloadFailure {
                artifact: bound.artifact().id(),
                kind: EntryKind::Manifest,
                attempts: vec![FetchAttempt::new(
                    entry_file_name(bound, MANIFEST_EXTENSION),
                    reason,
                )],
            })
    }

    /// 子POMが親を宣言していれば、同じリポジトリから親POMを解決する。
    pub async fn lookup_parent_manifest(
        &self,
        child_manifest: &Path,
        repository: &Repository,
    ) -> ParentManifest {
        let parent = match detect_parent(child_manifest) {
            Ok(Some(parent)) => parent,
            Ok(None) => return ParentManifest::NotRequired,
            Err(error) => return ParentManifest::Undetectable(error),
        };

        let bound = parent.clone().in_repository(repository.clone());
        match self.resolve_manifest(&bound).await {
            Ok(path) => ParentManifest::Resolved { parent, path },
            Err(error) => ParentManifest::Missing { parent, error },
        }
    }

    /// 親POMのパスを返す。取得できなければ情報メッセージを出して `None`。
    pub async fn resolve_parent_manifest_if_needed(
        &self,
        child_manifest: &Path,
        repository: &Repository,
        log: &dyn BuildLog,
    ) -> Option<PathBuf> {
        let outcome = self
            .lookup_parent_manifest(child_manifest, repository)
            .await;
        outcome.report(log);
        match outcome {
            ParentManifest::Resolved { path, .. } => Some(path),
            _ => None,
        }
    }

    /// CLI指定 > 設定ファイル > 既定値 の順で並列数を決め、上限で丸める。
    pub fn effective_concurrency(&self) -> EffectiveConcurrency {
        let mut warnings = Vec::new();
        let requested = self
            .cli_max_concurrent
            .or(self.config_max_concurrent)
            .unwrap_or(self.settings.default_max_concurrent);

        let mut applied = requested.max(1);
        let warning_threshold = self
            .config_warning_threshold
            .unwrap_or(self.settings.warning_threshold)
            .max(1);
        let hard_limit = self.settings.hard_limit.max(1);

        if requested == 0 {
            let message = "並列ダウンロード数が0のため1に補正しました".to_string();
            warn!(requested, "{message}");
            warnings.push(message);
        }

        if applied > hard_limit {
            let message = format!(
                "要求された並列ダウンロード数 {applied} は許可上限 {hard_limit} を超えているため {hard_limit} に丸めました",
            );
            warn!(requested = applied, hard_limit, "{message}");
            warnings.push(message);
            applied = hard_limit;
        }

        if applied > warning_threshold {
            let message = format!(
                "並列ダウンロード数 {applied} が警告閾値 {warning_threshold} を超えています"
            );
            warn!(applied, warning_threshold, "{message}");
            warnings.push(message);
        }

        EffectiveConcurrency { applied, warnings }
    }

    async fn fetch_into_cache(
        &self,
        bound: &BoundArtifact,
        extension: &str,
    ) -> Result<PathBuf, String> {
        let path = self.cache.entry_path(bound, extension);
        let bytes = self
            .fetcher
            .fetch(bound, extension)
            .await
            .map_err(|error| error.to_string())?;
        self.cache
            .store(&path, &bytes)
            .map_err(|error| error.to_string())?;
        Ok(path)
    }
}
