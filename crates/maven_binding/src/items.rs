//! Flat key/value item records exchanged with the build host.
//!
//! Metadata names are matched case-insensitively, the way the host treats them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::BindingError;

/// よく使うメタデータ名。
pub mod metadata {
    pub const VERSION: &str = "Version";
    pub const ARTIFACT_SPEC: &str = "ArtifactSpec";
    pub const REPOSITORY: &str = "Repository";
    pub const PACKAGE_FILE: &str = "PackageFile";
    pub const POM_FILE: &str = "PomFile";
    pub const ARTIFACT_FILE: &str = "ArtifactFile";
    pub const ARTIFACT_POM: &str = "ArtifactPom";
    pub const ARTIFACT_PARENT_POM: &str = "ArtifactParentPom";
    pub const JAVA_ARTIFACT: &str = "JavaArtifact";
    pub const JAVA_VERSION: &str = "JavaVersion";
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskItem {
    pub item_spec: String,
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
}

impl TaskItem {
    pub fn new(item_spec: impl Into<String>) -> Self {
        Self {
            item_spec: item_spec.into(),
            metadata: IndexMap::new(),
        }
    }

    pub fn with_metadata(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_metadata(name, value);
        self
    }

    pub fn metadata(&self, name: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// 値の中身を問わず、メタデータ名が存在するか。
    pub fn has_metadata(&self, name: &str) -> bool {
        self.metadata(name).is_some()
    }

    /// 空白のみの値は未指定として `default` を返す。
    pub fn metadata_or_default<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.metadata(name)
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(default)
    }

    pub fn required_metadata(&self, name: &str) -> Result<&str, BindingError> {
        self.metadata(name)
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| BindingError::MissingRequiredField {
                item: self.item_spec.clone(),
                field: name.to_string(),
            })
    }

    /// 既存キーは大文字小文字を無視して上書きする。
    pub fn set_metadata(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .metadata
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(&name))
        {
            Some((_, existing)) => *existing = value,
            None => {
                self.metadata.insert(name, value);
            }
        }
    }

    /// `target` に未設定のメタデータだけを写す。
    pub fn copy_metadata_to(&self, target: &mut TaskItem) {
        for (name, value) in &self.metadata {
            if target.metadata(name).is_none() {
                target.metadata.insert(name.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_lookup_ignores_case() {
        let item = TaskItem::new("com.example:demo").with_metadata("version", "1.0");
        assert_eq!(item.metadata(metadata::VERSION), Some("1.0"));
        assert!(item.has_metadata("VERSION"));
    }

    #[test]
    fn blank_required_metadata_is_missing() {
        let item = TaskItem::new("com.example:demo").with_metadata("Version", "  ");
        assert_eq!(
            item.required_metadata(metadata::VERSION),
            Err(BindingError::MissingRequiredField {
                item: "com.example:demo".into(),
                field: "Version".into(),
            })
        );
        assert_eq!(item.metadata_or_default(metadata::VERSION, "x"), "x");
    }

    #[test]
    fn copy_keeps_values_already_on_target() {
        let source = TaskItem::new("a")
            .with_metadata("Repository", "Google")
            .with_metadata("ArtifactFile", "old.jar");
        let mut target = TaskItem::new("a").with_metadata("artifactfile", "new.jar");
        source.copy_metadata_to(&mut target);

        assert_eq!(target.metadata("ArtifactFile"), Some("new.jar"));
        assert_eq!(target.metadata("Repository"), Some("Google"));
        assert_eq!(target.metadata.len(), 2);
    }

    #[test]
    fn set_metadata_overwrites_case_insensitively() {
        let mut item = TaskItem::new("a").with_metadata("version", "1");
        item.set_metadata("Version", "2");
        assert_eq!(item.metadata.len(), 1);
        assert_eq!(item.metadata("VERSION"), Some("2"));
    }

    #[test]
    fn deserializes_host_item_json() {
        let json = r#"[{"itemSpec":"g:a","metadata":{"Version":"1.0"}},{"itemSpec":"b"}]"#;
        let items: Vec<TaskItem> = serde_json::from_str(json).expect("items");
        assert_eq!(items[0].metadata("Version"), Some("1.0"));
        assert!(items[1].metadata.is_empty());
    }
}
