use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::cache::CacheStatsSnapshot;
use crate::download::{DownloadManager, ParentManifest};
use crate::error::BindingError;
use crate::items::{TaskItem, metadata};
use crate::log::BuildLog;
use crate::registry::{ArtifactFetcher, BoundArtifact, MavenRegistry, Repository, parse_artifact};

/// ダウンロード段階の結果。
#[derive(Debug, Default)]
pub struct DownloadReport {
    /// 入力順に並んだ解決済みアイテム。`ArtifactFile` / `ArtifactPom` を持つ。
    pub resolved: Vec<TaskItem>,
    /// 並列数の補正など、ビルドの成否に影響しない警告。
    pub warnings: Vec<String>,
    /// この実行でのキャッシュヒット・ミス数。
    pub cache: CacheStatsSnapshot,
    pub success: bool,
}

enum Prepared {
    /// `File` リポジトリ。取得不要。
    Local(TaskItem),
    Remote(BoundArtifact),
}

struct IndexedLibrary {
    order: usize,
    library: TaskItem,
    bound: BoundArtifact,
}

struct DownloadedFiles {
    payload: PathBuf,
    manifest: PathBuf,
    parent: ParentManifest,
}

type LibraryDownload = (IndexedLibrary, Result<DownloadedFiles, BindingError>);

/// 宣言された Maven ライブラリを取得し、キャッシュ上のパスをアイテムへ付与する。
pub struct MavenDownloadTask<F = MavenRegistry>
where
    F: ArtifactFetcher + 'static,
{
    manager: DownloadManager<F>,
}

impl<F> MavenDownloadTask<F>
where
    F: ArtifactFetcher + 'static,
{
    pub fn new(manager: DownloadManager<F>) -> Self {
        Self { manager }
    }

    /// 同期呼び出し用。内部でランタイムを作る。
    pub fn execute_blocking(
        &self,
        libraries: &[TaskItem],
        log: &dyn BuildLog,
    ) -> std::io::Result<DownloadReport> {
        let runtime = super::blocking_runtime()?;
        Ok(runtime.block_on(self.execute(libraries, log)))
    }

    pub async fn execute(&self, libraries: &[TaskItem], log: &dyn BuildLog) -> DownloadReport {
        let mut report = DownloadReport::default();
        let stats_before = self.manager.cache().stats();
        let mut finished: Vec<(usize, TaskItem)> = Vec::new();
        let mut queue: VecDeque<IndexedLibrary> = VecDeque::new();

        for (order, library) in libraries.iter().enumerate() {
            match prepare(library) {
                Ok(Prepared::Local(item)) => finished.push((order, item)),
                Ok(Prepared::Remote(bound)) => queue.push_back(IndexedLibrary {
                    order,
                    library: library.clone(),
                    bound,
                }),
                Err(error) => log.report(&error),
            }
        }

        if !queue.is_empty() {
            let concurrency = self.manager.effective_concurrency();
            report.warnings.extend(concurrency.warnings);
            let limit = concurrency.applied;
            debug!(libraries = queue.len(), limit, "ライブラリの取得を開始");

            let mut join_set: JoinSet<LibraryDownload> = JoinSet::new();
            while let Some(task) = queue.pop_front() {
                self.spawn_download(&mut join_set, task);
                if join_set.len() >= limit {
                    consume_next(&mut join_set, &mut finished, log).await;
                }
            }
            while !join_set.is_empty() {
                consume_next(&mut join_set, &mut finished, log).await;
            }
        }

        finished.sort_by_key(|(order, _)| *order);
        report.resolved = finished.into_iter().map(|(_, item)| item).collect();
        report.cache = self.manager.cache().stats().since(&stats_before);
        report.success = !log.has_logged_errors();
        info!(
            resolved = report.resolved.len(),
            requested = libraries.len(),
            payload_hits = report.cache.payload_hits,
            payload_misses = report.cache.payload_misses,
            manifest_hits = report.cache.manifest_hits,
            manifest_misses = report.cache.manifest_misses,
            success = report.success,
            "ダウンロード段階が完了しました"
        );
        report
    }

    fn spawn_download(&self, join_set: &mut JoinSet<LibraryDownload>, task: IndexedLibrary) {
        let manager = self.manager.clone();
        join_set.spawn(async move {
            let result = download_files(&manager, &task.bound).await;
            (task, result)
        });
    }
}

async fn download_files<F>(
    manager: &DownloadManager<F>,
    bound: &BoundArtifact,
) -> Result<DownloadedFiles, BindingError>
where
    F: ArtifactFetcher + 'static,
{
    let payload = manager.resolve_payload(bound).await?;
    let manifest = manager.resolve_manifest(bound).await?;
    let parent = manager
        .lookup_parent_manifest(&manifest, bound.repository())
        .await;
    Ok(DownloadedFiles {
        payload,
        manifest,
        parent,
    })
}

async fn consume_next(
    join_set: &mut JoinSet<LibraryDownload>,
    finished: &mut Vec<(usize, TaskItem)>,
    log: &dyn BuildLog,
) {
    let Some(joined) = join_set.join_next().await else {
        return;
    };
    match joined {
        Ok((task, Ok(files))) => {
            let mut result = TaskItem::new(task.library.item_spec.clone())
                .with_metadata(metadata::ARTIFACT_FILE, path_text(&files.payload))
                .with_metadata(metadata::ARTIFACT_POM, path_text(&files.manifest));
            files.parent.report(log);
            if let Some(parent) = files.parent.path() {
                result.set_metadata(metadata::ARTIFACT_PARENT_POM, path_text(parent));
            }
            task.library.copy_metadata_to(&mut result);
            finished.push((task.order, result));
        }
        Ok((_, Err(error))) => log.report(&error),
        Err(error) => log.report(&BindingError::DownloadTaskAborted {
            message: error.to_string(),
        }),
    }
}

/// 入力アイテムを検証し、取得方法を決める。
fn prepare(library: &TaskItem) -> Result<Prepared, BindingError> {
    let version = library.required_metadata(metadata::VERSION)?;
    let artifact = parse_artifact(&library.item_spec, version)?;

    let repository_type = library.metadata_or_default(metadata::REPOSITORY, "Central");
    if repository_type.trim().eq_ignore_ascii_case("file") {
        return local_files(library).map(Prepared::Local);
    }

    let repository = Repository::from_item_type(repository_type)?;
    Ok(Prepared::Remote(artifact.in_repository(repository)))
}

fn local_files(library: &TaskItem) -> Result<TaskItem, BindingError> {
    let failure = |message: String| BindingError::LocalFileRepository {
        item: library.item_spec.clone(),
        message,
    };

    let package_file = library.metadata_or_default(metadata::PACKAGE_FILE, "");
    let pom_file = library.metadata_or_default(metadata::POM_FILE, "");
    if package_file.is_empty() || pom_file.is_empty() {
        return Err(failure(format!(
            "'{}' と '{}' の両方を指定してください",
            metadata::PACKAGE_FILE,
            metadata::POM_FILE
        )));
    }
    if !Path::new(package_file).is_file() {
        return Err(failure(format!(
            "パッケージファイル '{package_file}' が存在しません"
        )));
    }
    if !Path::new(pom_file).is_file() {
        return Err(failure(format!("POMファイル '{pom_file}' が存在しません")));
    }

    let mut result = TaskItem::new(library.item_spec.clone())
        .with_metadata(metadata::ARTIFACT_FILE, package_file)
        .with_metadata(metadata::ARTIFACT_POM, pom_file);
    library.copy_metadata_to(&mut result);
    Ok(result)
}

fn path_text(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ArtifactCache;
    use crate::log::MemoryLog;
    use crate::registry::RegistryError;
    use bytes::Bytes;
    use reqwest::StatusCode;
    use std::collections::HashMap;
    use std::fs;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::{TempDir, tempdir};
    use tokio::time::{Duration, sleep};

    #[derive(Default)]
    struct MockRegistry {
        files: Mutex<HashMap<String, Bytes>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        call_count: AtomicUsize,
    }

    impl MockRegistry {
        fn insert(&self, remote_path: &str, body: &str) {
            self.files
                .lock()
                .unwrap()
                .insert(remote_path.to_string(), Bytes::from(body.to_string()));
        }

        fn record_begin(&self) {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        }

        fn record_end(&self) {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl ArtifactFetcher for MockRegistry {
        fn fetch<'a>(
            &'a self,
            artifact: &'a BoundArtifact,
            extension: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Bytes, RegistryError>> + Send + 'a>> {
            let remote = artifact.artifact().remote_path(extension);
            let found = self.files.lock().unwrap().get(&remote).cloned();
            Box::pin(async move {
                self.record_begin();
                sleep(Duration::from_millis(10)).await;
                self.record_end();
                found.ok_or(RegistryError::NotFound {
                    url: remote,
                    status: StatusCode::NOT_FOUND,
                })
            })
        }
    }

    fn task(temp: &TempDir, registry: &Arc<MockRegistry>) -> MavenDownloadTask<MockRegistry> {
        let cache = Arc::new(
            ArtifactCache::with_dir(temp.path().join("cache")).expect("キャッシュ初期化に失敗"),
        );
        MavenDownloadTask::new(DownloadManager::new(Arc::clone(registry), cache))
    }

    fn library(spec: &str, version: &str) -> TaskItem {
        TaskItem::new(spec).with_metadata("Version", version)
    }

    #[tokio::test]
    async fn resolved_items_carry_cache_paths_in_input_order() {
        let temp = tempdir().expect("一時ディレクトリ作成に失敗");
        let registry = Arc::new(MockRegistry::default());
        registry.insert("org/example/first/1.0/first-1.0.jar", "jar");
        registry.insert("org/example/first/1.0/first-1.0.pom", "<project/>");
        registry.insert("org/example/second/2.0/second-2.0.aar", "aar");
        registry.insert("org/example/second/2.0/second-2.0.pom", "<project/>");

        let log = MemoryLog::new();
        let libraries = [
            library("org.example:first", "1.0").with_metadata("Bind", "true"),
            library("org.example:second", "2.0").with_metadata("Repository", "Google"),
        ];
        let report = task(&temp, &registry).execute(&libraries, &log).await;

        assert!(report.success, "errors: {:?}", log.errors());
        assert_eq!(report.resolved.len(), 2);
        let first = &report.resolved[0];
        assert_eq!(first.item_spec, "org.example:first");
        assert!(first
            .metadata(metadata::ARTIFACT_FILE)
            .is_some_and(|path| path.ends_with("org.example_first.jar")));
        assert_eq!(first.metadata("Bind"), Some("true"));
        assert!(first.metadata(metadata::ARTIFACT_PARENT_POM).is_none());

        let second = &report.resolved[1];
        let pom = second.metadata(metadata::ARTIFACT_POM).expect("pom path");
        assert!(pom.contains("google"));
        assert!(pom.ends_with("org.example_second.pom"));
    }

    #[tokio::test]
    async fn invalid_items_are_reported_and_skipped() {
        let temp = tempdir().expect("一時ディレクトリ作成に失敗");
        let registry = Arc::new(MockRegistry::default());
        registry.insert("g/ok/1/ok-1.jar", "jar");
        registry.insert("g/ok/1/ok-1.pom", "<project/>");

        let log = MemoryLog::new();
        let libraries = [
            TaskItem::new("g:noversion"),
            library("bad", "1.0"),
            library("g:repo", "1.0").with_metadata("Repository", "nexus"),
            library("g:missing", "1.0"),
            library("g:ok", "1"),
        ];
        let report = task(&temp, &registry).execute(&libraries, &log).await;

        assert!(!report.success);
        assert_eq!(log.errors().len(), 4);
        assert_eq!(report.resolved.len(), 1);
        assert_eq!(report.resolved[0].item_spec, "g:ok");
    }

    #[tokio::test]
    async fn parent_pom_path_is_recorded_when_available() {
        let temp = tempdir().expect("一時ディレクトリ作成に失敗");
        let registry = Arc::new(MockRegistry::default());
        registry.insert("g/child/1.0/child-1.0.jar", "jar");
        registry.insert(
            "g/child/1.0/child-1.0.pom",
            "<project><parent><groupId>g</groupId><artifactId>parent</artifactId><version>3</version></parent></project>",
        );
        registry.insert("g/parent/3/parent-3.pom", "<project/>");
        registry.insert("g/orphan/1.0/orphan-1.0.jar", "jar");
        registry.insert(
            "g/orphan/1.0/orphan-1.0.pom",
            "<project><parent><groupId>g</groupId><artifactId>gone</artifactId><version>1</version></parent></project>",
        );

        let log = MemoryLog::new();
        let report = task(&temp, &registry)
            .execute(&[library("g:child", "1.0"), library("g:orphan", "1.0")], &log)
            .await;

        assert!(report.success);
        assert!(report.resolved[0]
            .metadata(metadata::ARTIFACT_PARENT_POM)
            .is_some_and(|path| path.ends_with("g_parent.pom")));
        assert!(report.resolved[1].metadata(metadata::ARTIFACT_PARENT_POM).is_none());
        assert_eq!(log.messages().len(), 1);
    }

    #[tokio::test]
    async fn file_repository_uses_local_paths() {
        let temp = tempdir().expect("一時ディレクトリ作成に失敗");
        let registry = Arc::new(MockRegistry::default());
        let jar = temp.path().join("local.jar");
        let pom = temp.path().join("local.pom");
        fs::write(&jar, "jar").expect("write jar");
        fs::write(&pom, "<project/>").expect("write pom");

        let log = MemoryLog::new();
        let libraries = [
            library("g:local", "1.0")
                .with_metadata("Repository", "File")
                .with_metadata("PackageFile", jar.display().to_string())
                .with_metadata("PomFile", pom.display().to_string()),
            library("g:nopom", "1.0")
                .with_metadata("Repository", "file")
                .with_metadata("PackageFile", jar.display().to_string()),
            library("g:gone", "1.0")
                .with_metadata("Repository", "file")
                .with_metadata("PackageFile", temp.path().join("gone.jar").display().to_string())
                .with_metadata("PomFile", pom.display().to_string()),
        ];
        let report = task(&temp, &registry).execute(&libraries, &log).await;

        assert_eq!(registry.call_count.load(Ordering::SeqCst), 0);
        assert_eq!(report.resolved.len(), 1);
        assert_eq!(
            report.resolved[0].metadata(metadata::ARTIFACT_FILE),
            Some(jar.display().to_string().as_str())
        );
        let errors = log.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("PomFile"));
        assert!(errors[1].contains("gone.jar"));
    }

    #[tokio::test]
    async fn downloads_respect_concurrency_limit() {
        let temp = tempdir().expect("一時ディレクトリ作成に失敗");
        let registry = Arc::new(MockRegistry::default());
        let libraries = (0..12)
            .map(|index| {
                let name = format!("demo{index:02}");
                registry.insert(&format!("g/{name}/1.0/{name}-1.0.jar"), "jar");
                registry.insert(&format!("g/{name}/1.0/{name}-1.0.pom"), "<project/>");
                library(&format!("g:{name}"), "1.0")
            })
            .collect::<Vec<_>>();

        let cache = Arc::new(
            ArtifactCache::with_dir(temp.path().join("cache")).expect("キャッシュ初期化に失敗"),
        );
        let manager = DownloadManager::new(Arc::clone(&registry), cache).with_cli_max_concurrent(Some(3));
        let log = MemoryLog::new();
        let report = MavenDownloadTask::new(manager).execute(&libraries, &log).await;

        assert!(report.success);
        assert_eq!(report.resolved.len(), 12);
        assert!(registry.max_in_flight.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn report_counts_cache_hits_of_each_run() {
        let temp = tempdir().expect("一時ディレクトリ作成に失敗");
        let registry = Arc::new(MockRegistry::default());
        registry.insert("org/example/cached/1.0/cached-1.0.jar", "jar");
        registry.insert("org/example/cached/1.0/cached-1.0.pom", "<project/>");
        let task = task(&temp, &registry);
        let libraries = [library("org.example:cached", "1.0")];

        let log = MemoryLog::new();
        let first = task.execute(&libraries, &log).await;
        assert!(first.success, "errors: {:?}", log.errors());
        assert_eq!(first.cache.payload_hits, 0);
        assert_eq!(first.cache.payload_misses, 1);
        assert_eq!(first.cache.manifest_misses, 1);
        let calls = registry.call_count.load(Ordering::SeqCst);

        let second = task.execute(&libraries, &log).await;
        assert!(second.success, "errors: {:?}", log.errors());
        assert_eq!(second.cache.payload_hits, 1);
        assert_eq!(second.cache.payload_misses, 0);
        assert_eq!(second.cache.manifest_hits, 1);
        assert_eq!(second.cache.manifest_misses, 0);
        assert_eq!(registry.call_count.load(Ordering::SeqCst), calls);
    }

    struct PanickingRegistry;

    impl ArtifactFetcher for PanickingRegistry {
        fn fetch<'a>(
            &'a self,
            _artifact: &'a BoundArtifact,
            _extension: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Bytes, RegistryError>> + Send + 'a>> {
            Box::pin(async { panic!("接続が切断されました") })
        }
    }

    #[tokio::test]
    async fn panicking_download_is_reported_as_an_error() {
        let temp = tempdir().expect("一時ディレクトリ作成に失敗");
        let cache = Arc::new(
            ArtifactCache::with_dir(temp.path().join("cache")).expect("キャッシュ初期化に失敗"),
        );
        let manager = DownloadManager::new(Arc::new(PanickingRegistry), cache);
        let log = MemoryLog::new();
        let report = MavenDownloadTask::new(manager)
            .execute(&[library("org.example:broken", "1.0")], &log)
            .await;

        assert!(!report.success);
        assert!(report.resolved.is_empty());
        let errors = log.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("ダウンロードタスクが異常終了しました"));
    }
}
