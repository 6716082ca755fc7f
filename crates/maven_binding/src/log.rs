//! Build log collaborator.
//!
//! Every stage reports human-readable diagnostics through [`BuildLog`]. The
//! overall success of a run is `!log.has_logged_errors()`; warnings and
//! informational messages never change it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use tracing::{error, info, warn};

use crate::error::BindingError;

/// ビルドホストへ診断を渡すためのロガー。
pub trait BuildLog: Send + Sync {
    fn log_error(&self, message: &str);

    fn log_warning(&self, message: &str);

    fn log_message(&self, message: &str);

    fn has_logged_errors(&self) -> bool;

    /// エラー値を整形してエラーとして記録する。
    fn report(&self, error: &BindingError) {
        self.log_error(&error.to_string());
    }
}

/// `tracing` へ転送する本番用アダプタ。
#[derive(Debug, Default)]
pub struct TracingLog {
    errors: AtomicBool,
}

impl TracingLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuildLog for TracingLog {
    fn log_error(&self, message: &str) {
        self.errors.store(true, Ordering::SeqCst);
        error!(target: "mvnbind", "{message}");
    }

    fn log_warning(&self, message: &str) {
        warn!(target: "mvnbind", "{message}");
    }

    fn log_message(&self, message: &str) {
        info!(target: "mvnbind", "{message}");
    }

    fn has_logged_errors(&self) -> bool {
        self.errors.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct Entries {
    errors: Vec<String>,
    warnings: Vec<String>,
    messages: Vec<String>,
}

/// メッセージをメモリ上に保持するロガー（テストやCLIの集計用）。
#[derive(Debug, Default)]
pub struct MemoryLog {
    entries: Mutex<Entries>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.with_entries(|entries| entries.errors.clone())
    }

    pub fn warnings(&self) -> Vec<String> {
        self.with_entries(|entries| entries.warnings.clone())
    }

    pub fn messages(&self) -> Vec<String> {
        self.with_entries(|entries| entries.messages.clone())
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut Entries) -> T) -> T {
        let mut guard = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl BuildLog for MemoryLog {
    fn log_error(&self, message: &str) {
        self.with_entries(|entries| entries.errors.push(message.to_string()));
    }

    fn log_warning(&self, message: &str) {
        self.with_entries(|entries| entries.warnings.push(message.to_string()));
    }

    fn log_message(&self, message: &str) {
        self.with_entries(|entries| entries.messages.push(message.to_string()));
    }

    fn has_logged_errors(&self) -> bool {
        self.with_entries(|entries| !entries.errors.is_empty())
    }
}
