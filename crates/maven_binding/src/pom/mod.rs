use std::borrow::Cow;
use std::fmt;
use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use roxmltree::{Document, Node};
use tracing::debug;

use crate::error::BindingError;
use crate::registry::MavenArtifact;

pub mod properties;

pub use properties::{has_unresolved_placeholders, substitute};

/// 依存関係のスコープ。未指定は `compile` とみなす。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DependencyScope {
    Compile,
    Runtime,
    Other(String),
}

impl DependencyScope {
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value.map(str::trim).filter(|value| !value.is_empty()) else {
            return DependencyScope::Compile;
        };
        if value.eq_ignore_ascii_case("compile") {
            DependencyScope::Compile
        } else if value.eq_ignore_ascii_case("runtime") {
            DependencyScope::Runtime
        } else {
            DependencyScope::Other(value.to_string())
        }
    }

    /// 検証対象は `compile` と `runtime` のみ。
    pub fn is_verified(&self) -> bool {
        matches!(self, DependencyScope::Compile | DependencyScope::Runtime)
    }
}

impl fmt::Display for DependencyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyScope::Compile => f.write_str("compile"),
            DependencyScope::Runtime => f.write_str("runtime"),
            DependencyScope::Other(value) => f.write_str(value),
        }
    }
}

/// `<dependency>` 要素。`version` はプロパティ参照や空のことがある。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PomDependency {
    pub group_id: String,
    pub artifact_id: String,
    pub version: Option<String>,
    pub scope: DependencyScope,
}

impl PomDependency {
    pub fn id(&self) -> String {
        format!("{}:{}", self.group_id, self.artifact_id)
    }

    /// 置換後のバージョンが空白のみ、または未指定か。
    pub fn has_blank_version(&self) -> bool {
        self.version
            .as_deref()
            .is_none_or(|version| version.trim().is_empty())
    }
}

/// 依存関係・プロパティ・親参照だけを保持するPOM。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PomManifest {
    /// 自身の groupId（未指定なら親から継承）。
    pub group_id: Option<String>,
    pub artifact_id: Option<String>,
    /// 自身の version（未指定なら親から継承）。
    pub version: Option<String>,
    pub parent: Option<MavenArtifact>,
    pub properties: IndexMap<String, String>,
    pub dependencies: Vec<PomDependency>,
}

impl PomManifest {
    /// POMファイルを読み込んで解析する。
    pub fn load(path: &Path) -> Result<Self, BindingError> {
        let origin = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|error| {
            BindingError::ManifestParseFailure {
                origin: origin.clone(),
                message: error.to_string(),
            }
        })?;
        Self::parse_with_origin(&contents, &origin)
    }

    /// POM文字列を解析する。
    pub fn parse(xml: &str) -> Result<Self, BindingError> {
        Self::parse_with_origin(xml, "<inline>")
    }

    fn parse_with_origin(xml: &str, origin: &str) -> Result<Self, BindingError> {
        let normalized = normalize_xml_entities(xml);
        let document = Document::parse(normalized.as_ref())
            .map_err(|error| parse_failure(origin, error.to_string()))?;
        let project = project_node(&document, origin)?;

        let parent = child(&project, "parent")
            .map(|node| parse_parent(&node, origin))
            .transpose()?;
        let group_id = node_text(&project, "groupId")
            .or_else(|| parent.as_ref().map(|parent| parent.group_id.clone()));
        let version = node_text(&project, "version")
            .or_else(|| parent.as_ref().map(|parent| parent.version().to_string()));

        let manifest = Self {
            group_id,
            artifact_id: node_text(&project, "artifactId"),
            version,
            parent,
            properties: parse_properties(&project),
            dependencies: parse_dependencies(&project),
        };
        debug!(
            origin,
            dependencies = manifest.dependencies.len(),
            properties = manifest.properties.len(),
            has_parent = manifest.parent.is_some(),
            "POMを解析しました"
        );
        Ok(manifest)
    }

    /// 依存関係のバージョン（と group/artifact）のプロパティ参照を解決した複製を返す。
    pub fn resolve_dependency(
        &self,
        dependency: &PomDependency,
        parent: Option<&PomManifest>,
    ) -> PomDependency {
        PomDependency {
            group_id: substitute(&dependency.group_id, self, parent),
            artifact_id: substitute(&dependency.artifact_id, self, parent),
            version: dependency
                .version
                .as_deref()
                .map(|version| substitute(version, self, parent)),
            scope: dependency.scope.clone(),
        }
    }
}

/// 親POMの取得が必要かどうかを `<parent>` だけを見て判定する。
pub fn detect_parent(path: &Path) -> Result<Option<MavenArtifact>, BindingError> {
    let origin = path.display().to_string();
    let contents = fs::read_to_string(path)
        .map_err(|error| parse_failure(&origin, error.to_string()))?;
    let normalized = normalize_xml_entities(&contents);
    let document = Document::parse(normalized.as_ref())
        .map_err(|error| parse_failure(&origin, error.to_string()))?;
    let project = project_node(&document, &origin)?;
    child(&project, "parent")
        .map(|node| parse_parent(&node, &origin))
        .transpose()
}

fn parse_failure(origin: &str, message: impl Into<String>) -> BindingError {
    BindingError::ManifestParseFailure {
        origin: origin.to_string(),
        message: message.into(),
    }
}

fn project_node<'a, 'input>(
    document: &'a Document<'input>,
    origin: &str,
) -> Result<Node<'a, 'input>, BindingError> {
    let root = document.root_element();
    if root.has_tag_name("project") {
        return Ok(root);
    }
    Err(parse_failure(origin, "<project> タグが存在しません"))
}

fn parse_parent(node: &Node<'_, '_>, origin: &str) -> Result<MavenArtifact, BindingError> {
    let group_id = node_text(node, "groupId")
        .ok_or_else(|| parse_failure(origin, "parent.groupId が未指定です"))?;
    let artifact_id = node_text(node, "artifactId")
        .ok_or_else(|| parse_failure(origin, "parent.artifactId が未指定です"))?;
    let version = node_text(node, "version")
        .ok_or_else(|| parse_failure(origin, "parent.version が未指定です"))?;
    Ok(MavenArtifact::new(group_id, artifact_id, version))
}

fn parse_properties(project: &Node<'_, '_>) -> IndexMap<String, String> {
    child(project, "properties")
        .map(|props| {
            props
                .children()
                .filter(|prop| prop.is_element())
                .map(|prop| {
                    let key = prop.tag_name().name().to_string();
                    let value = prop.text().map(str::trim).unwrap_or_default().to_string();
                    (key, value)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_dependencies(project: &Node<'_, '_>) -> Vec<PomDependency> {
    let Some(dependencies) = child(project, "dependencies") else {
        return Vec::new();
    };

    dependencies
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "dependency")
        .filter_map(|node| {
            let Some(group_id) = node_text(&node, "groupId") else {
                debug!("groupId のない依存関係を無視します");
                return None;
            };
            let Some(artifact_id) = node_text(&node, "artifactId") else {
                debug!(group = %group_id, "artifactId のない依存関係を無視します");
                return None;
            };
            Some(PomDependency {
                group_id,
                artifact_id,
                version: node_text(&node, "version"),
                scope: DependencyScope::parse(node_text(&node, "scope").as_deref()),
            })
        })
        .collect()
}

fn child<'a, 'input>(node: &Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn node_text(node: &Node<'_, '_>, tag: &str) -> Option<String> {
    child(node, tag)
        .and_then(|child| child.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// XML標準以外の名前付き実体参照（DTD依存の `&nbsp;` など）を空白へ置き換える。
fn normalize_xml_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }

    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '&' {
            output.push(ch);
            continue;
        }

        let mut entity = String::new();
        while let Some(&next) = chars.peek() {
            entity.push(next);
            chars.next();
            if next == ';' || entity.len() > 32 {
                break;
            }
        }

        let Some(name) = entity.strip_suffix(';') else {
            output.push('&');
            output.push_str(&entity);
            continue;
        };
        let known = ["lt", "gt", "amp", "quot", "apos"]
            .iter()
            .any(|known| name.eq_ignore_ascii_case(known))
            || name.starts_with('#');
        if known {
            output.push('&');
            output.push_str(&entity);
        } else {
            output.push(' ');
        }
    }

    Cow::Owned(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <project xmlns="http://maven.apache.org/POM/4.0.0">
          <modelVersion>4.0.0</modelVersion>
          <parent>
            <groupId>org.example</groupId>
            <artifactId>parent</artifactId>
            <version>7</version>
          </parent>
          <artifactId>demo</artifactId>
          <properties>
            <gson.version>2.8.6</gson.version>
            <empty.value></empty.value>
          </properties>
          <dependencies>
            <dependency>
              <groupId>com.google.code.gson</groupId>
              <artifactId>gson</artifactId>
              <version>${gson.version}</version>
            </dependency>
            <dependency>
              <groupId>junit</groupId>
              <artifactId>junit</artifactId>
              <version>4.13</version>
              <scope>test</scope>
            </dependency>
            <dependency>
              <groupId>org.example</groupId>
              <artifactId>runtime-only</artifactId>
              <scope>Runtime</scope>
            </dependency>
            <dependency>
              <artifactId>no-group</artifactId>
            </dependency>
          </dependencies>
          <dependencyManagement>
            <dependencies>
              <dependency>
                <groupId>managed</groupId>
                <artifactId>only</artifactId>
                <version>1.0</version>
              </dependency>
            </dependencies>
          </dependencyManagement>
        </project>"#;

    #[test]
    fn parse_extracts_dependencies_properties_and_parent() {
        let manifest = PomManifest::parse(SAMPLE).expect("parse pom");

        assert_eq!(manifest.dependencies.len(), 3);
        assert_eq!(manifest.dependencies[0].id(), "com.google.code.gson:gson");
        assert_eq!(
            manifest.dependencies[0].version.as_deref(),
            Some("${gson.version}")
        );
        assert_eq!(manifest.dependencies[0].scope, DependencyScope::Compile);
        assert_eq!(
            manifest.dependencies[1].scope,
            DependencyScope::Other("test".into())
        );
        assert_eq!(manifest.dependencies[2].scope, DependencyScope::Runtime);
        assert!(manifest.dependencies[2].has_blank_version());

        assert_eq!(manifest.properties.get("gson.version").map(String::as_str), Some("2.8.6"));
        assert_eq!(manifest.properties.get("empty.value").map(String::as_str), Some(""));

        let parent = manifest.parent.as_ref().expect("parent reference");
        assert_eq!(parent.to_string(), "org.example:parent:7");
        assert_eq!(manifest.group_id.as_deref(), Some("org.example"));
        assert_eq!(manifest.version.as_deref(), Some("7"));
        assert_eq!(manifest.artifact_id.as_deref(), Some("demo"));
    }

    #[test]
    fn missing_parent_section_yields_none() {
        let manifest = PomManifest::parse(
            "<project><groupId>g</groupId><artifactId>a</artifactId><version>1</version></project>",
        )
        .expect("parse");
        assert!(manifest.parent.is_none());
        assert!(manifest.dependencies.is_empty());
    }

    #[test]
    fn malformed_documents_are_parse_failures() {
        assert!(matches!(
            PomManifest::parse("<project><dependencies></project>"),
            Err(BindingError::ManifestParseFailure { .. })
        ));
        assert!(matches!(
            PomManifest::parse("<metadata/>"),
            Err(BindingError::ManifestParseFailure { .. })
        ));
        assert!(matches!(
            PomManifest::parse("<project><parent><groupId>g</groupId></parent></project>"),
            Err(BindingError::ManifestParseFailure { message, .. }) if message.contains("parent.artifactId")
        ));
    }

    #[test]
    fn unknown_entities_do_not_break_parsing() {
        let xml = "<project><name>A&nbsp;B &amp; C</name></project>";
        assert!(PomManifest::parse(xml).is_ok());
    }

    #[test]
    fn load_reports_unreadable_files() {
        let result = PomManifest::load(Path::new("/definitely/not/here.pom"));
        assert!(matches!(
            result,
            Err(BindingError::ManifestParseFailure { origin, .. }) if origin.contains("here.pom")
        ));
    }

    #[test]
    fn detect_parent_reads_only_parent_section() {
        let mut file = NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write pom");
        let parent = detect_parent(file.path()).expect("detect").expect("has parent");
        assert_eq!(parent.id(), "org.example:parent");
        assert_eq!(parent.version(), "7");

        let mut orphan = NamedTempFile::new().expect("temp file");
        orphan
            .write_all(b"<project><artifactId>a</artifactId></project>")
            .expect("write pom");
        assert!(detect_parent(orphan.path()).expect("detect").is_none());
    }

    #[test]
    fn resolve_dependency_substitutes_version() {
        let manifest = PomManifest::parse(SAMPLE).expect("parse pom");
        let resolved = manifest.resolve_dependency(&manifest.dependencies[0], None);
        assert_eq!(resolved.version.as_deref(), Some("2.8.6"));
        assert_eq!(resolved.group_id, "com.google.code.gson");
    }
}
