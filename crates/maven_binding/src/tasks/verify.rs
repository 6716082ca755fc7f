use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::crossref::PackageSuggestions;
use crate::items::{TaskItem, metadata};
use crate::log::BuildLog;
use crate::pom::{PomDependency, PomManifest};
use crate::resolver::{CheckOutcome, DependencyResolver};

/// 検証段階への入力。
#[derive(Debug, Clone, Default)]
pub struct VerificationInputs {
    /// ダウンロード段階で解決済みのライブラリ（`ArtifactPom` 必須）。
    pub libraries: Vec<TaskItem>,
    pub package_references: Vec<TaskItem>,
    pub project_references: Vec<TaskItem>,
    pub ignored_dependencies: Vec<TaskItem>,
    /// `project.assets.json`。
    pub lock_file: Option<PathBuf>,
}

/// 依存関係 1 件分の検査記録。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCheck {
    pub library: String,
    /// プロパティ参照を解決した後の依存関係。
    pub dependency: PomDependency,
    pub outcome: CheckOutcome,
}

#[derive(Debug, Default)]
pub struct VerificationReport {
    pub checks: Vec<DependencyCheck>,
    pub success: bool,
}

impl VerificationReport {
    pub fn unsatisfied(&self) -> impl Iterator<Item = &DependencyCheck> {
        self.checks
            .iter()
            .filter(|check| check.outcome == CheckOutcome::Unsatisfied)
    }
}

/// 解決済みライブラリの POM を読み、各依存関係が満たされているかを検証する。
pub struct MavenDependencyVerifier {
    cache_dir: PathBuf,
}

impl MavenDependencyVerifier {
    /// `cache_dir` は NuGet パッケージ対応表の置き場所。
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn execute(&self, inputs: &VerificationInputs, log: &dyn BuildLog) -> VerificationReport {
        let mut resolver = DependencyResolver::new(inputs.lock_file.as_deref(), log);
        resolver.add_maven_libraries(&inputs.libraries, log);
        resolver.add_package_references(&inputs.package_references, log);
        resolver.add_project_references(&inputs.project_references, log);
        resolver.add_ignored_dependencies(&inputs.ignored_dependencies, log);
        debug!(known = resolver.known().len(), "既知のアーティファクトを収集しました");

        let suggestions = PackageSuggestions::load(&self.cache_dir, log);
        let mut report = VerificationReport::default();

        for library in &inputs.libraries {
            let pom_path = match library.required_metadata(metadata::ARTIFACT_POM) {
                Ok(path) => path,
                Err(error) => {
                    log.report(&error);
                    continue;
                }
            };
            let manifest = match PomManifest::load(Path::new(pom_path)) {
                Ok(manifest) => manifest,
                Err(error) => {
                    log.report(&error);
                    continue;
                }
            };
            let parent = load_parent(library, log);

            for dependency in manifest
                .dependencies
                .iter()
                .filter(|dependency| dependency.scope.is_verified())
            {
                let resolved = manifest.resolve_dependency(dependency, parent.as_ref());
                let outcome = resolver.check_satisfied(&resolved, &suggestions, log);
                report.checks.push(DependencyCheck {
                    library: library.item_spec.clone(),
                    dependency: resolved,
                    outcome,
                });
            }
        }

        report.success = !log.has_logged_errors();
        info!(
            checked = report.checks.len(),
            unsatisfied = report.unsatisfied().count(),
            success = report.success,
            "依存関係の検証が完了しました"
        );
        report
    }
}

/// `ArtifactParentPom` があれば読み込む。読めなくても検証は続ける。
fn load_parent(library: &TaskItem, log: &dyn BuildLog) -> Option<PomManifest> {
    let path = library
        .metadata(metadata::ARTIFACT_PARENT_POM)
        .map(str::trim)
        .filter(|path| !path.is_empty())?;
    match PomManifest::load(Path::new(path)) {
        Ok(parent) => Some(parent),
        Err(error) => {
            log.log_warning(&error.to_string());
            None
        }
    }
}
