// maven_binding - Maven artifact acquisition and dependency verification for binding builds

pub mod cache;
pub mod cli;
pub mod config;
pub mod crossref;
pub mod download;
pub mod error;
pub mod items;
pub mod log;
pub mod pom;
pub mod registry;
pub mod resolver;
pub mod tasks;
pub mod version;

pub use cache::{ArtifactCache, CacheError, CacheStatsSnapshot};
pub use config::{BindingConfig, ConfigError, DownloadConfig, LogLevel, LoggingConfig};
pub use crossref::{AssetsLockFile, JavaMetadataFinder, PackageIndex, PackageSuggestions};
pub use download::{DownloadManager, DownloadSettings, EffectiveConcurrency, ParentManifest};
pub use error::{BindingError, EntryKind, FetchAttempt, ReferenceKind};
pub use items::{TaskItem, metadata};
pub use log::{BuildLog, MemoryLog, TracingLog};
pub use pom::{DependencyScope, PomDependency, PomManifest};
pub use registry::{
    ArtifactFetcher, BoundArtifact, MavenArtifact, MavenRegistry, RegistryError, Repository,
    parse_artifact,
};
pub use resolver::{CheckOutcome, DependencyResolver};
pub use tasks::{
    DependencyCheck, DownloadReport, MavenDependencyVerifier, MavenDownloadTask,
    VerificationInputs, VerificationReport,
};
pub use version::{MavenVersion, VersionRange, VersionRangeError};
