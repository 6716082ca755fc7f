//! `${name}` placeholder substitution for dependency declarations.
//!
//! Lookup order: the manifest's own `<properties>`, the built-in `project.*`
//! values, then the parent manifest's `<properties>`. Tokens that resolve
//! nowhere are left verbatim.

use super::PomManifest;

const MAX_PASSES: usize = 8;

/// 式中のプロパティ参照を置換する。未解決の参照はそのまま残す。
pub fn substitute(expression: &str, manifest: &PomManifest, parent: Option<&PomManifest>) -> String {
    let mut current = expression.to_string();
    if !current.contains("${") {
        return current;
    }

    // Property values may themselves reference other properties.
    for _ in 0..MAX_PASSES {
        let next = substitute_once(&current, |name| lookup(name, manifest, parent));
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// 置換後も `${...}` が残っているか。
pub fn has_unresolved_placeholders(expression: &str) -> bool {
    expression
        .find("${")
        .is_some_and(|start| expression[start + 2..].contains('}'))
}

fn lookup(name: &str, manifest: &PomManifest, parent: Option<&PomManifest>) -> Option<String> {
    if let Some(value) = manifest.properties.get(name) {
        return Some(value.clone());
    }
    if let Some(value) = builtin(name, manifest) {
        return Some(value);
    }
    parent.and_then(|parent| parent.properties.get(name).cloned())
}

fn builtin(name: &str, manifest: &PomManifest) -> Option<String> {
    let name = name.strip_prefix("pom.").map_or_else(
        || name.to_string(),
        |rest| format!("project.{rest}"),
    );
    match name.as_str() {
        "project.groupId" => manifest.group_id.clone(),
        "project.artifactId" => manifest.artifact_id.clone(),
        "project.version" => manifest.version.clone(),
        "project.parent.groupId" => manifest.parent.as_ref().map(|p| p.group_id.clone()),
        "project.parent.artifactId" => manifest.parent.as_ref().map(|p| p.artifact_id.clone()),
        "project.parent.version" => manifest.parent.as_ref().map(|p| p.version().to_string()),
        _ => None,
    }
}

fn substitute_once(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let suffix = &rest[start + 2..];
        let Some(end) = suffix.find('}') else {
            result.push_str(&rest[start..]);
            return result;
        };
        let key = &suffix[..end];
        match lookup(key) {
            Some(value) => result.push_str(&value),
            None => {
                result.push_str("${");
                result.push_str(key);
                result.push('}');
            }
        }
        rest = &suffix[end + 1..];
    }
    result.push_str(rest);
    result
}
