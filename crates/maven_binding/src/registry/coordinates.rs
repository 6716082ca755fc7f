use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::BindingError;

/// Maven Central のベースURL。
pub const CENTRAL_BASE_URL: &str = "https://repo1.maven.org/maven2/";
/// Google Maven のベースURL。
pub const GOOGLE_BASE_URL: &str = "https://dl.google.com/android/maven2/";

/// グループID・アーティファクトID と候補バージョン列からなる座標。
///
/// `versions` は空にならない。先頭が検証・ダウンロード対象のバージョン。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MavenArtifact {
    pub group_id: String,
    pub artifact_id: String,
    versions: Vec<String>,
}

impl MavenArtifact {
    pub fn new(
        group_id: impl Into<String>,
        artifact_id: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            group_id: group_id.into(),
            artifact_id: artifact_id.into(),
            versions: vec![version.into()],
        }
    }

    /// 代替として許容するバージョンを後ろに追加する。
    pub fn with_alternatives<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.versions.extend(versions.into_iter().map(Into::into));
        self
    }

    /// 検証・ダウンロードに使う先頭バージョン。
    pub fn version(&self) -> &str {
        &self.versions[0]
    }

    pub fn versions(&self) -> &[String] {
        &self.versions
    }

    /// `group:artifact` 形式の識別子。
    pub fn id(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    /// 同一性は `(group, artifact)` の大文字小文字を区別した一致。
    pub fn is_same_identity(&self, group_id: &str, artifact_id: &str) -> bool {
        self.group_id == group_id && self.artifact_id == artifact_id
    }

    /// キャッシュファイル名の拡張子を除いた部分（`<group>_<artifact>`）。
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.group_id, self.artifact_id)
    }

    /// 取得元リポジトリを一度だけ関連付ける。
    pub fn in_repository(self, repository: Repository) -> BoundArtifact {
        BoundArtifact {
            artifact: self,
            repository,
        }
    }

    fn group_path(&self) -> String {
        self.group_id.replace('.', "/")
    }

    /// リポジトリ内の相対パス（`org/example/demo/1.0/demo-1.0.<ext>`）。
    pub fn remote_path(&self, extension: &str) -> String {
        format!(
            "{}/{}/{}/{}-{}.{}",
            self.group_path(),
            self.artifact_id,
            self.version(),
            self.artifact_id,
            self.version(),
            extension
        )
    }
}

impl fmt::Display for MavenArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.group_id,
            self.artifact_id,
            self.version()
        )
    }
}

/// `group:artifact` 指定とバージョンから座標を生成する。
///
/// 空の区切りは無視したうえで、空白でない要素がちょうど 2 つでなければエラー。
pub fn parse_artifact(spec: &str, version: &str) -> Result<MavenArtifact, BindingError> {
    let parts = spec
        .split(':')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();

    if parts.len() != 2 || parts.iter().any(|part| part.trim().is_empty()) {
        return Err(BindingError::InvalidCoordinateSpec {
            spec: spec.to_string(),
        });
    }

    Ok(MavenArtifact::new(parts[0], parts[1], version))
}

/// アーティファクトの取得元。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Repository {
    Central,
    Google,
    /// 任意のURLベースのリポジトリ。値は指定された文字列そのまま。
    Url(String),
}

impl Repository {
    /// アイテムの `Repository` メタデータからリポジトリを決定する。
    pub fn from_item_type(value: &str) -> Result<Self, BindingError> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("central") {
            return Ok(Repository::Central);
        }
        if trimmed.eq_ignore_ascii_case("google") {
            return Ok(Repository::Google);
        }
        let looks_like_url = trimmed
            .get(..4)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("http"));
        if looks_like_url && Url::parse(trimmed).is_ok() {
            return Ok(Repository::Url(trimmed.to_string()));
        }
        Err(BindingError::UnknownRepositoryType(value.to_string()))
    }

    pub fn base_url(&self) -> &str {
        match self {
            Repository::Central => CENTRAL_BASE_URL,
            Repository::Google => GOOGLE_BASE_URL,
            Repository::Url(base) => base,
        }
    }

    /// キャッシュディレクトリの名前空間。
    ///
    /// URLリポジトリはベースURI(UTF-8)の SHA-256 を標準 base64 で表したもの。
    pub fn bucket_name(&self) -> String {
        match self {
            Repository::Central => "central".to_string(),
            Repository::Google => "google".to_string(),
            Repository::Url(base) => STANDARD.encode(Sha256::digest(base.as_bytes())),
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Repository::Central => f.write_str("central"),
            Repository::Google => f.write_str("google"),
            Repository::Url(base) => f.write_str(base),
        }
    }
}

/// リポジトリが関連付けられた座標。ダウンロード時にのみ使う。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BoundArtifact {
    artifact: MavenArtifact,
    repository: Repository,
}

impl BoundArtifact {
    pub fn artifact(&self) -> &MavenArtifact {
        &self.artifact
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    pub fn bucket_name(&self) -> String {
        self.repository.bucket_name()
    }
}

impl fmt::Display for BoundArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.artifact, self.repository)
    }
}
