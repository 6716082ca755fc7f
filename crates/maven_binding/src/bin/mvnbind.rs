use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use maven_binding::cli::{Cli, Commands, DownloadArgs, VerifyArgs};
use maven_binding::{
    ArtifactCache, BindingConfig, DownloadManager, LogLevel, MavenDependencyVerifier,
    MavenDownloadTask, MavenRegistry, TaskItem, TracingLog, VerificationInputs,
};
use tracing_subscriber::EnvFilter;

fn main() {
    match real_main() {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(error) => {
            eprintln!("{error:#}");
            std::process::exit(1);
        }
    }
}

fn real_main() -> Result<bool> {
    let cli = Cli::parse();
    let config = BindingConfig::load_or_default(cli.config.as_deref())?;
    init_tracing(config.logging.level);

    let cache_dir = match cli.cache_dir {
        Some(dir) => dir,
        None => config
            .cache_dir()
            .context("キャッシュディレクトリを決定できませんでした")?,
    };
    let log = TracingLog::new();

    match cli.command {
        Commands::Download(args) => run_download(args, &config, cache_dir, &log),
        Commands::Verify(args) => run_verify(args, cache_dir, &log),
    }
}

fn init_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    // Already initialised when embedded in another process.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run_download(
    args: DownloadArgs,
    config: &BindingConfig,
    cache_dir: PathBuf,
    log: &TracingLog,
) -> Result<bool> {
    let libraries = read_items(&args.libraries)?;
    let cache = ArtifactCache::with_dir(cache_dir.clone())
        .with_context(|| format!("キャッシュディレクトリ {} を初期化できませんでした", cache_dir.display()))?;
    let registry = MavenRegistry::with_timeout(config.timeout())
        .context("HTTPクライアントを初期化できませんでした")?;
    let manager = DownloadManager::new(Arc::new(registry), Arc::new(cache))
        .with_config_limits(config.download.max_concurrent, config.download.warning_threshold)
        .with_cli_max_concurrent(args.max_concurrent);

    let report = MavenDownloadTask::new(manager)
        .execute_blocking(&libraries, log)
        .context("非同期ランタイムを起動できませんでした")?;

    let json = serde_json::to_string_pretty(&report.resolved)
        .context("解決済みアイテムをシリアライズできませんでした")?;
    match &args.output {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("{} へ書き込めませんでした", path.display()))?,
        None => println!("{json}"),
    }
    Ok(report.success)
}

fn run_verify(args: VerifyArgs, cache_dir: PathBuf, log: &TracingLog) -> Result<bool> {
    let inputs = VerificationInputs {
        libraries: read_items(&args.libraries)?,
        package_references: read_optional_items(args.package_references.as_deref())?,
        project_references: read_optional_items(args.project_references.as_deref())?,
        ignored_dependencies: read_optional_items(args.ignored_dependencies.as_deref())?,
        lock_file: args.lock_file,
    };

    let report = MavenDependencyVerifier::new(cache_dir).execute(&inputs, log);
    println!(
        "{} 件の依存関係を検証しました（未解決 {} 件）",
        report.checks.len(),
        report.unsatisfied().count()
    );
    Ok(report.success)
}

fn read_items(path: &Path) -> Result<Vec<TaskItem>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("{} を読み込めませんでした", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("{} のアイテム一覧を解析できませんでした", path.display()))
}

fn read_optional_items(path: Option<&Path>) -> Result<Vec<TaskItem>> {
    path.map(read_items).transpose().map(Option::unwrap_or_default)
}
