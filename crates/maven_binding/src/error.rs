use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// キャッシュエントリの種別。ダウンロード失敗メッセージの文言を切り替える。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// `jar` / `aar` 本体。
    Payload,
    /// `pom`。
    Manifest,
}

/// 1 回分の取得試行の結果（ファイル名と失敗理由）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub file_name: String,
    pub reason: String,
}

impl FetchAttempt {
    pub fn new(file_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            reason: reason.into(),
        }
    }
}

/// オーバーライド指定を持ちうる参照アイテムの種類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    PackageReference,
    ProjectReference,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKind::PackageReference => f.write_str("PackageReference"),
            ReferenceKind::ProjectReference => f.write_str("ProjectReference"),
        }
    }
}

/// バインディングビルド全体で報告されるエラー。
///
/// どのバリアントもコンポーネント境界を越えて `Result` として返され、
/// 呼び出し側がログへ書き出すかどうかを決める。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("アーティファクト指定 '{spec}' が不正です（group:artifact 形式で指定してください）")]
    InvalidCoordinateSpec { spec: String },

    #[error("アイテム '{item}' に必須メタデータ '{field}' がありません")]
    MissingRequiredField { item: String, field: String },

    #[error("未知のMavenリポジトリです: '{0}'")]
    UnknownRepositoryType(String),

    #[error("{}", render_download_failure(.artifact, .kind, .attempts))]
    DownloadFailure {
        artifact: String,
        kind: EntryKind,
        attempts: Vec<FetchAttempt>,
    },

    #[error("POM '{origin}' の解析に失敗しました: {message}")]
    ManifestParseFailure { origin: String, message: String },

    #[error(
        "親POM '{parent}' を取得できませんでした（{reason}）。親POMのプロパティに依存するバージョンは検証できません"
    )]
    ParentManifestNotFound { parent: String, reason: String },

    #[error(
        "Maven依存関係 '{artifact}' のバージョン '{version}' が満たされていません。{}",
        render_suggestion(.suggestion)
    )]
    UnsatisfiedDependency {
        artifact: String,
        version: String,
        suggestion: Option<String>,
    },

    #[error("Maven依存関係 '{artifact}' のバージョン範囲 '{version}' を解析できません: {message}")]
    InvalidVersionRange {
        artifact: String,
        version: String,
        message: String,
    },

    #[error("{kind} '{item}' で '{present}' を指定する場合は '{missing}' も必要です")]
    OverrideFieldMismatch {
        kind: ReferenceKind,
        item: String,
        present: String,
        missing: String,
    },

    #[error("{kind} '{item}' の '{field}' を空にすることはできません")]
    OverrideFieldEmpty {
        kind: ReferenceKind,
        item: String,
        field: String,
    },

    #[error(
        "NuGetパッケージ '{package}' バージョン '{version}' がロックファイルに見つかりません。<PackageReference> を追加した後に NuGet restore を実行してください"
    )]
    LockFileStale { package: String, version: String },

    #[error("ロックファイル {path:?} を読み込めませんでした: {message}")]
    LockFileUnreadable { path: PathBuf, message: String },

    #[error("File リポジトリのアイテム '{item}': {message}")]
    LocalFileRepository { item: String, message: String },

    #[error("ダウンロードタスクが異常終了しました: {message}")]
    DownloadTaskAborted { message: String },
}

fn render_download_failure(artifact: &str, kind: &EntryKind, attempts: &[FetchAttempt]) -> String {
    let mut message = match kind {
        EntryKind::Payload => format!("アーティファクト '{artifact}' をダウンロードできません。"),
        EntryKind::Manifest => {
            format!("アーティファクト '{artifact}' のPOMファイルをダウンロードできません。")
        }
    };
    for attempt in attempts {
        message.push_str(&format!("\n- {}: {}", attempt.file_name, attempt.reason));
    }
    message
}

fn render_suggestion(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(package) => format!(
            "Microsoft が保守している NuGet パッケージ '{package}' でこの依存関係を満たせる可能性があります。"
        ),
        None => String::new(),
    }
}
