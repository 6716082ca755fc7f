use std::error::Error as StdError;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, StatusCode, Url};
use thiserror::Error;
use tracing::{debug, warn};
use url::ParseError;

mod coordinates;

pub use coordinates::{
    BoundArtifact, CENTRAL_BASE_URL, GOOGLE_BASE_URL, MavenArtifact, Repository, parse_artifact,
};

/// 1 リクエストあたりのタイムアウト。
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(100);

/// Mavenレジストリとの通信エラー。
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("レジストリURL '{url}' が不正です: {source}")]
    InvalidUrl { url: String, source: ParseError },
    #[error("レジストリURLの構築に失敗しました (base: {base}, path: {path}): {source}")]
    UrlJoin {
        base: String,
        path: String,
        source: ParseError,
    },
    #[error("HTTPクライアントの初期化に失敗しました: {source}")]
    ClientBuild { source: reqwest::Error },
    #[error("{url} が見つかりません (HTTP {status})")]
    NotFound { url: String, status: StatusCode },
    #[error("{url} から HTTP {status} が返されました")]
    HttpStatus { url: String, status: StatusCode },
    #[error("{url} との通信に失敗しました: {message}")]
    Network { url: String, message: String },
}

/// 座標と拡張子からファイル内容を取得する。テストではモックに差し替える。
pub trait ArtifactFetcher: Send + Sync {
    fn fetch<'a>(
        &'a self,
        artifact: &'a BoundArtifact,
        extension: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, RegistryError>> + Send + 'a>>;
}

impl ArtifactFetcher for MavenRegistry {
    fn fetch<'a>(
        &'a self,
        artifact: &'a BoundArtifact,
        extension: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Bytes, RegistryError>> + Send + 'a>> {
        Box::pin(MavenRegistry::fetch_file(self, artifact, extension))
    }
}

/// Maven Central・Google Maven・任意URLリポジトリ向けのHTTPクライアント。
///
/// 再試行は行わない。jar→aar のフォールバックは呼び出し側の責務。
pub struct MavenRegistry {
    client: Client,
}

impl MavenRegistry {
    pub fn new() -> Result<Self, RegistryError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(timeout)
            .http1_only()
            .user_agent(format!("mvnbind/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| RegistryError::ClientBuild { source })?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// リポジトリ上のファイルURLを組み立てる。
    pub fn artifact_url(artifact: &BoundArtifact, extension: &str) -> Result<Url, RegistryError> {
        let base = artifact.repository().base_url();
        let mut base_url = Url::parse(base).map_err(|source| RegistryError::InvalidUrl {
            url: base.to_string(),
            source,
        })?;
        ensure_trailing_slash(&mut base_url);

        let relative = artifact.artifact().remote_path(extension);
        base_url
            .join(&relative)
            .map_err(|source| RegistryError::UrlJoin {
                base: base_url.to_string(),
                path: relative,
                source,
            })
    }

    pub async fn fetch_file(
        &self,
        artifact: &BoundArtifact,
        extension: &str,
    ) -> Result<Bytes, RegistryError> {
        let url = Self::artifact_url(artifact, extension)?;
        debug!(artifact = %artifact, url = %url, "レジストリリクエストを送信");

        let response = self.client.get(url.clone()).send().await.map_err(|error| {
            let chain = error_chain(&error);
            warn!(url = %url, error = %chain, "HTTPリクエスト失敗");
            RegistryError::Network {
                url: url.to_string(),
                message: chain,
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            debug!(status = %status, url = %url, "ファイルが存在しません");
            return Err(RegistryError::NotFound {
                url: url.to_string(),
                status,
            });
        }
        if !status.is_success() {
            warn!(status = %status, url = %url, "想定外のHTTP応答");
            return Err(RegistryError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }

        response
            .bytes()
            .await
            .map_err(|error| RegistryError::Network {
                url: url.to_string(),
                message: error_chain(&error),
            })
    }
}

fn error_chain(error: &reqwest::Error) -> String {
    let mut chain = error.to_string();
    let mut current = error.source();
    while let Some(source) = current {
        chain.push_str(&format!(" | caused by: {source}"));
        current = source.source();
    }
    chain
}

fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
}
