use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mvnbind")]
#[command(about = "Maven artifact download and dependency verification for binding builds", long_about = None)]
pub struct Cli {
    /// 設定ファイル (mvnbind.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// キャッシュディレクトリ（設定ファイルより優先）
    #[arg(long = "cache-dir", global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mavenライブラリを取得してキャッシュする
    Download(DownloadArgs),
    /// POMの依存関係が満たされているか検証する
    Verify(VerifyArgs),
}

#[derive(Debug, Clone, Args)]
pub struct DownloadArgs {
    /// 取得するライブラリのアイテム一覧 (JSON)
    #[arg(long, value_name = "FILE")]
    pub libraries: PathBuf,
    /// 解決済みアイテムの出力先（省略時は標準出力）
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// 並列ダウンロード数（設定ファイルより優先）
    #[arg(long = "max-concurrent", value_name = "N")]
    pub max_concurrent: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct VerifyArgs {
    /// `download` が出力した解決済みライブラリ (JSON)
    #[arg(long, value_name = "FILE")]
    pub libraries: PathBuf,
    /// PackageReference アイテム (JSON)
    #[arg(long = "package-references", value_name = "FILE")]
    pub package_references: Option<PathBuf>,
    /// ProjectReference アイテム (JSON)
    #[arg(long = "project-references", value_name = "FILE")]
    pub project_references: Option<PathBuf>,
    /// 検証から除外する依存関係 (JSON)
    #[arg(long = "ignored", value_name = "FILE")]
    pub ignored_dependencies: Option<PathBuf>,
    /// NuGet の project.assets.json
    #[arg(long = "lock-file", value_name = "FILE")]
    pub lock_file: Option<PathBuf>,
}
