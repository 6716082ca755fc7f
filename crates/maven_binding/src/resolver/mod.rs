//! Dependency-satisfaction resolver.
//!
//! Collects every artifact known to be available to the build (downloaded
//! Maven libraries, NuGet packages carrying Maven metadata, explicit
//! `JavaArtifact`/`JavaVersion` overrides and ignore lists), then checks POM
//! dependencies against that set. The known set only grows; it is filled
//! completely before the first check.

use std::path::Path;

use tracing::debug;

use crate::crossref::{AssetsLockFile, JavaMetadataFinder, PackageIndex, PackageSuggestions};
use crate::error::{BindingError, ReferenceKind};
use crate::items::{TaskItem, metadata};
use crate::log::BuildLog;
use crate::pom::{PomDependency, has_unresolved_placeholders};
use crate::registry::{MavenArtifact, parse_artifact};
use crate::version::{MavenVersion, VersionRange, normalize_version_expression};

/// 依存関係 1 件の検査結果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    Satisfied,
    /// バージョンが空で検証できなかった（警告のみで成功扱い）。
    Unverified,
    Unsatisfied,
}

impl CheckOutcome {
    pub fn is_satisfied(self) -> bool {
        !matches!(self, CheckOutcome::Unsatisfied)
    }
}

pub struct DependencyResolver<I = AssetsLockFile>
where
    I: PackageIndex,
{
    known: Vec<MavenArtifact>,
    finder: Option<JavaMetadataFinder<I>>,
}

impl DependencyResolver<AssetsLockFile> {
    /// ロックファイルが存在すれば NuGet パッケージのメタデータ参照に使う。
    ///
    /// 存在しないパスは黙って無視し、読めないファイルはエラーとして記録する。
    pub fn new(lock_file: Option<&Path>, log: &dyn BuildLog) -> Self {
        let Some(path) = lock_file.filter(|path| path.is_file()) else {
            debug!(lock_file = ?lock_file, "ロックファイルなしで解決します");
            return Self::without_index();
        };

        match AssetsLockFile::load(path) {
            Ok(index) => Self::with_index(index),
            Err(error) => {
                log.report(&error);
                Self::without_index()
            }
        }
    }

    pub fn without_index() -> Self {
        Self {
            known: Vec::new(),
            finder: None,
        }
    }
}

impl<I> DependencyResolver<I>
where
    I: PackageIndex,
{
    pub fn with_index(index: I) -> Self {
        Self {
            known: Vec::new(),
            finder: Some(JavaMetadataFinder::new(index)),
        }
    }

    pub fn known(&self) -> &[MavenArtifact] {
        &self.known
    }

    /// 取得済み Maven ライブラリ。`ArtifactSpec` があればアイテム名より優先する。
    pub fn add_maven_libraries(&mut self, items: &[TaskItem], log: &dyn BuildLog) {
        for item in items {
            let spec = item.metadata_or_default(metadata::ARTIFACT_SPEC, &item.item_spec);
            let Some(artifact) = parse_versioned(item, spec, log) else {
                continue;
            };
            log.log_message(&format!(
                "Mavenライブラリ '{}' から Java 依存関係 '{}' バージョン '{}' を検出しました",
                item.item_spec,
                artifact.id(),
                artifact.version()
            ));
            self.known.push(artifact);
        }
    }

    /// NuGet パッケージ参照。オーバーライドがなければロックファイル経由で座標を探す。
    pub fn add_package_references(&mut self, items: &[TaskItem], log: &dyn BuildLog) {
        for item in items {
            if self.parse_java_override(ReferenceKind::PackageReference, item, log) {
                continue;
            }

            let version = item.metadata_or_default(metadata::VERSION, "");
            let found = match self.finder.as_mut() {
                Some(finder) => match finder.java_information(&item.item_spec, version) {
                    Ok(found) => found,
                    Err(error) => {
                        log.report(&error);
                        None
                    }
                },
                None => None,
            };

            match found {
                Some(artifact) => {
                    log.log_message(&format!(
                        "PackageReference '{}' から Java 依存関係 '{}' バージョン '{}' を検出しました",
                        item.item_spec,
                        artifact.id(),
                        artifact.version()
                    ));
                    self.known.push(artifact);
                }
                None => log.log_message(&format!(
                    "PackageReference '{}' に Java アーティファクト情報が見つかりません",
                    item.item_spec
                )),
            }
        }
    }

    /// プロジェクト参照。座標を知る手段はオーバーライドのみ。
    pub fn add_project_references(&mut self, items: &[TaskItem], log: &dyn BuildLog) {
        for item in items {
            self.parse_java_override(ReferenceKind::ProjectReference, item, log);
        }
    }

    /// 検証を省略したい依存関係。既知の集合へそのまま加える。
    pub fn add_ignored_dependencies(&mut self, items: &[TaskItem], log: &dyn BuildLog) {
        for item in items {
            let Some(artifact) = parse_versioned(item, &item.item_spec, log) else {
                continue;
            };
            log.log_message(&format!(
                "Java 依存関係 '{}' バージョン '{}' を無視します",
                artifact.id(),
                artifact.version()
            ));
            self.known.push(artifact);
        }
    }

    /// `JavaArtifact` / `JavaVersion` を解釈する。
    ///
    /// どちらかが指定されていれば、誤りがあっても `true` を返して他の手段を使わせない。
    pub fn parse_java_override(
        &mut self,
        kind: ReferenceKind,
        item: &TaskItem,
        log: &dyn BuildLog,
    ) -> bool {
        let item_name = match kind {
            ReferenceKind::ProjectReference => file_name(&item.item_spec),
            ReferenceKind::PackageReference => item.item_spec.clone(),
        };

        let has_artifact = item.has_metadata(metadata::JAVA_ARTIFACT);
        let has_version = item.has_metadata(metadata::JAVA_VERSION);

        let mismatch = |present: &str, missing: &str| BindingError::OverrideFieldMismatch {
            kind,
            item: item_name.clone(),
            present: present.to_string(),
            missing: missing.to_string(),
        };

        match (has_artifact, has_version) {
            (false, false) => false,
            (true, false) => {
                log.report(&mismatch(metadata::JAVA_ARTIFACT, metadata::JAVA_VERSION));
                true
            }
            (false, true) => {
                log.report(&mismatch(metadata::JAVA_VERSION, metadata::JAVA_ARTIFACT));
                true
            }
            (true, true) => {
                let id = item.metadata(metadata::JAVA_ARTIFACT).unwrap_or_default();
                let version = item.metadata(metadata::JAVA_VERSION).unwrap_or_default();

                for (field, value) in [(metadata::JAVA_ARTIFACT, id), (metadata::JAVA_VERSION, version)] {
                    if value.trim().is_empty() {
                        log.report(&BindingError::OverrideFieldEmpty {
                            kind,
                            item: item_name.clone(),
                            field: field.to_string(),
                        });
                        return true;
                    }
                }

                match parse_artifact(id, version) {
                    Ok(artifact) => {
                        log.log_message(&format!(
                            "{kind} '{item_name}' から Java 依存関係 '{}' バージョン '{}' を検出しました (JavaArtifact)",
                            artifact.id(),
                            artifact.version()
                        ));
                        self.known.push(artifact);
                    }
                    Err(error) => log.report(&error),
                }
                true
            }
        }
    }

    /// 依存関係が既知の集合で満たされるかを調べ、満たされなければエラーを記録する。
    pub fn check_satisfied(
        &self,
        dependency: &PomDependency,
        suggestions: &PackageSuggestions,
        log: &dyn BuildLog,
    ) -> CheckOutcome {
        let id = dependency.id();
        let Some(version) = dependency
            .version
            .as_deref()
            .map(str::trim)
            .filter(|version| !version.is_empty())
        else {
            log.log_warning(&format!(
                "Maven依存関係 '{id}' の必要バージョンを特定できませんでした（親POMを解釈できなかった可能性があります）。この依存関係の検証は省略しますが、依存関係自体は満たす必要があります"
            ));
            return CheckOutcome::Unverified;
        };

        if has_unresolved_placeholders(version) {
            log.log_warning(&format!(
                "Maven依存関係 '{id}' のバージョン '{version}' に未解決のプロパティ参照が残っています"
            ));
        }

        let range = match VersionRange::parse(&normalize_version_expression(version)) {
            Ok(range) => range,
            Err(error) => {
                log.report(&BindingError::InvalidVersionRange {
                    artifact: id,
                    version: version.to_string(),
                    message: error.to_string(),
                });
                return CheckOutcome::Unsatisfied;
            }
        };

        let satisfied = self
            .known
            .iter()
            .filter(|known| known.is_same_identity(&dependency.group_id, &dependency.artifact_id))
            .any(|known| range.contains(&MavenVersion::parse(known.version())));

        if satisfied {
            debug!(dependency = %id, version, "依存関係は満たされています");
            return CheckOutcome::Satisfied;
        }

        log.report(&BindingError::UnsatisfiedDependency {
            suggestion: suggestions.suggestion(&id).map(str::to_string),
            artifact: id,
            version: version.to_string(),
        });
        CheckOutcome::Unsatisfied
    }
}

/// 必須の `Version` と座標指定から座標を作る。失敗はログへ記録する。
fn parse_versioned(item: &TaskItem, spec: &str, log: &dyn BuildLog) -> Option<MavenArtifact> {
    let version = match item.required_metadata(metadata::VERSION) {
        Ok(version) => version,
        Err(error) => {
            log.report(&error);
            return None;
        }
    };
    match parse_artifact(spec, version) {
        Ok(artifact) => Some(artifact),
        Err(error) => {
            log.report(&error);
            None
        }
    }
}

/// `../../src/Foo/Foo.csproj` → `Foo.csproj`
fn file_name(item_spec: &str) -> String {
    item_spec
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(item_spec)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLog;
    use crate::pom::DependencyScope;

    fn dependency(version: Option<&str>) -> PomDependency {
        PomDependency {
            group_id: "g".into(),
            artifact_id: "a".into(),
            version: version.map(str::to_string),
            scope: DependencyScope::Compile,
        }
    }

    fn resolver_with(versions: &[&str]) -> DependencyResolver {
        let mut resolver = DependencyResolver::without_index();
        let log = MemoryLog::new();
        let items = versions
            .iter()
            .map(|version| TaskItem::new("g:a").with_metadata("Version", *version))
            .collect::<Vec<_>>();
        resolver.add_maven_libraries(&items, &log);
        assert!(!log.has_logged_errors());
        resolver
    }

    #[test]
    fn range_is_checked_against_known_versions() {
        let resolver = resolver_with(&["2.3.4"]);
        let suggestions = PackageSuggestions::default();
        let log = MemoryLog::new();

        assert_eq!(
            resolver.check_satisfied(&dependency(Some("[2.0,3.0)")), &suggestions, &log),
            CheckOutcome::Satisfied
        );
        assert!(!log.has_logged_errors());

        assert_eq!(
            resolver.check_satisfied(&dependency(Some("[3.0,4.0)")), &suggestions, &log),
            CheckOutcome::Unsatisfied
        );
        let errors = log.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("g:a"));
    }

    #[test]
    fn any_known_version_may_satisfy() {
        let resolver = resolver_with(&["1.0", "3.5"]);
        let log = MemoryLog::new();
        assert_eq!(
            resolver.check_satisfied(
                &dependency(Some("[3.0,4.0)")),
                &PackageSuggestions::default(),
                &log
            ),
            CheckOutcome::Satisfied
        );
    }

    #[test]
    fn blank_version_is_a_warning_only() {
        let resolver = DependencyResolver::without_index();
        let log = MemoryLog::new();
        let outcome =
            resolver.check_satisfied(&dependency(Some("  ")), &PackageSuggestions::default(), &log);
        assert_eq!(outcome, CheckOutcome::Unverified);
        assert!(outcome.is_satisfied());
        assert_eq!(log.warnings().len(), 1);
        assert!(!log.has_logged_errors());
    }

    #[test]
    fn unresolved_property_is_warned_and_checked_as_bare_version() {
        let resolver = resolver_with(&["1.2"]);
        let log = MemoryLog::new();
        let outcome = resolver.check_satisfied(
            &dependency(Some("${missing}")),
            &PackageSuggestions::default(),
            &log,
        );
        assert_eq!(outcome, CheckOutcome::Satisfied);
        let warnings = log.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("${missing}"));
        assert!(!log.has_logged_errors());
    }

    #[test]
    fn bare_version_needs_only_identity() {
        let resolver = resolver_with(&["0.1"]);
        let log = MemoryLog::new();
        let suggestions = PackageSuggestions::default();
        assert!(
            resolver
                .check_satisfied(&dependency(Some("1")), &suggestions, &log)
                .is_satisfied()
        );

        let unknown = DependencyResolver::without_index();
        assert!(
            !unknown
                .check_satisfied(&dependency(Some("1.0")), &suggestions, &log)
                .is_satisfied()
        );
    }

    #[test]
    fn unsatisfied_error_carries_suggestion() {
        let resolver = DependencyResolver::without_index();
        let suggestions = PackageSuggestions::parse(
            r#"{"packages":[{"javaId":"g:a","nugetId":"Example.Binding"}]}"#,
        )
        .expect("mapping");
        let log = MemoryLog::new();
        resolver.check_satisfied(&dependency(Some("[1.0]")), &suggestions, &log);
        assert!(log.errors()[0].contains("Example.Binding"));
    }

    #[test]
    fn malformed_range_is_reported_for_the_dependency() {
        let resolver = resolver_with(&["1.0"]);
        let log = MemoryLog::new();
        let outcome = resolver.check_satisfied(
            &dependency(Some("[1.0,2.0")),
            &PackageSuggestions::default(),
            &log,
        );
        assert_eq!(outcome, CheckOutcome::Unsatisfied);
        assert!(log.errors()[0].contains("[1.0,2.0"));
    }

    #[test]
    fn override_pair_must_be_complete() {
        let mut resolver = DependencyResolver::without_index();
        let log = MemoryLog::new();
        let items = [
            TaskItem::new("Some.Package").with_metadata("JavaArtifact", "g:a"),
            TaskItem::new("Other.Package").with_metadata("JavaVersion", "1.0"),
        ];
        resolver.add_package_references(&items, &log);

        let errors = log.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("JavaVersion"));
        assert!(errors[1].contains("JavaArtifact"));
        assert!(resolver.known().is_empty());
        // No fallback lookup message for items that used the override fields.
        assert!(log.messages().is_empty());
    }

    #[test]
    fn blank_override_values_are_rejected() {
        let mut resolver = DependencyResolver::without_index();
        let log = MemoryLog::new();
        let items = [TaskItem::new("../src/Lib/Lib.csproj")
            .with_metadata("JavaArtifact", "g:a")
            .with_metadata("JavaVersion", " ")];
        resolver.add_project_references(&items, &log);

        let errors = log.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Lib.csproj"));
        assert!(!errors[0].contains("../src"));
    }

    #[test]
    fn valid_override_adds_known_artifact() {
        let mut resolver = DependencyResolver::without_index();
        let log = MemoryLog::new();
        let items = [TaskItem::new("Lib.csproj")
            .with_metadata("JavaArtifact", "g:a")
            .with_metadata("JavaVersion", "2.0")];
        resolver.add_project_references(&items, &log);

        assert!(!log.has_logged_errors());
        assert_eq!(resolver.known(), &[MavenArtifact::new("g", "a", "2.0")]);
    }

    #[test]
    fn package_reference_without_metadata_is_informational() {
        let mut resolver = DependencyResolver::without_index();
        let log = MemoryLog::new();
        resolver.add_package_references(&[TaskItem::new("Plain.Package")], &log);
        assert!(!log.has_logged_errors());
        assert_eq!(log.messages().len(), 1);
    }

    #[test]
    fn ignored_dependencies_and_libraries_require_version() {
        let mut resolver = DependencyResolver::without_index();
        let log = MemoryLog::new();
        resolver.add_ignored_dependencies(
            &[
                TaskItem::new("g:ignored").with_metadata("Version", "1.0"),
                TaskItem::new("g:noversion"),
            ],
            &log,
        );
        resolver.add_maven_libraries(
            &[TaskItem::new("local-name")
                .with_metadata("ArtifactSpec", "g:spec")
                .with_metadata("Version", "3.0")],
            &log,
        );

        assert_eq!(log.errors().len(), 1);
        let ids = resolver
            .known()
            .iter()
            .map(MavenArtifact::id)
            .collect::<Vec<_>>();
        assert_eq!(ids, ["g:ignored", "g:spec"]);
    }

    #[test]
    fn missing_lock_file_path_is_not_an_error() {
        let log = MemoryLog::new();
        let resolver = DependencyResolver::new(Some(Path::new("/no/such/project.assets.json")), &log);
        assert!(!log.has_logged_errors());
        assert!(resolver.known().is_empty());
    }
}
