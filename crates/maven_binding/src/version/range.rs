use std::fmt;

use thiserror::Error;

use super::MavenVersion;

/// バージョン範囲の解析エラー。
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VersionRangeError {
    #[error("範囲 '{0}' の括弧が閉じていません")]
    Unbounded(String),
    #[error("単一バージョンの範囲は [] で囲む必要があります: '{0}'")]
    SingleVersionNotInclusive(String),
    #[error("範囲 '{0}' の区切りが多すぎます")]
    TooManyBounds(String),
    #[error("範囲 '{0}' の上限が下限より小さくなっています")]
    ReversedBounds(String),
    #[error("範囲 '{0}' が前の範囲と重なっています")]
    Overlapping(String),
    #[error("複数の範囲を指定する場合はすべて括弧で囲む必要があります: '{0}'")]
    TrailingVersion(String),
    #[error("空のバージョン範囲は指定できません")]
    Empty,
}

/// 1 つの区間。`None` の境界は無制限。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restriction {
    pub lower: Option<MavenVersion>,
    pub lower_inclusive: bool,
    pub upper: Option<MavenVersion>,
    pub upper_inclusive: bool,
}

impl Restriction {
    /// すべてのバージョンを含む区間。
    pub fn everything() -> Self {
        Self {
            lower: None,
            lower_inclusive: false,
            upper: None,
            upper_inclusive: false,
        }
    }

    pub fn contains(&self, version: &MavenVersion) -> bool {
        if let Some(lower) = &self.lower {
            match lower.cmp(version) {
                std::cmp::Ordering::Greater => return false,
                std::cmp::Ordering::Equal if !self.lower_inclusive => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match upper.cmp(version) {
                std::cmp::Ordering::Less => return false,
                std::cmp::Ordering::Equal if !self.upper_inclusive => return false,
                _ => {}
            }
        }
        true
    }

    fn parse(spec: &str) -> Result<Self, VersionRangeError> {
        let lower_inclusive = spec.starts_with('[');
        let upper_inclusive = spec.ends_with(']');
        let inner = spec[1..spec.len() - 1].trim();

        let Some(comma) = inner.find(',') else {
            if !lower_inclusive || !upper_inclusive {
                return Err(VersionRangeError::SingleVersionNotInclusive(spec.to_string()));
            }
            let version = MavenVersion::parse(inner);
            return Ok(Self {
                lower: Some(version.clone()),
                lower_inclusive: true,
                upper: Some(version),
                upper_inclusive: true,
            });
        };

        let lower_text = inner[..comma].trim();
        let upper_text = inner[comma + 1..].trim();
        if upper_text.contains(',') {
            return Err(VersionRangeError::TooManyBounds(spec.to_string()));
        }

        let lower = (!lower_text.is_empty()).then(|| MavenVersion::parse(lower_text));
        let upper = (!upper_text.is_empty()).then(|| MavenVersion::parse(upper_text));
        if let (Some(lower), Some(upper)) = (&lower, &upper) {
            if upper < lower {
                return Err(VersionRangeError::ReversedBounds(spec.to_string()));
            }
        }

        Ok(Self {
            lower,
            lower_inclusive,
            upper,
            upper_inclusive,
        })
    }
}

/// Mavenのバージョン範囲。
///
/// 括弧を含まない単独バージョンは「推奨」扱いで、どのバージョンも満たす。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    recommended: Option<MavenVersion>,
    restrictions: Vec<Restriction>,
}

impl VersionRange {
    pub fn parse(spec: &str) -> Result<Self, VersionRangeError> {
        let mut process = spec.trim();
        if process.is_empty() {
            return Err(VersionRangeError::Empty);
        }

        let mut restrictions = Vec::new();
        let mut previous_upper: Option<MavenVersion> = None;

        while process.starts_with('[') || process.starts_with('(') {
            let close_paren = process.find(')');
            let close_bracket = process.find(']');
            let end = match (close_paren, close_bracket) {
                (Some(paren), Some(bracket)) => paren.min(bracket),
                (Some(paren), None) => paren,
                (None, Some(bracket)) => bracket,
                (None, None) => return Err(VersionRangeError::Unbounded(spec.to_string())),
            };

            let restriction = Restriction::parse(&process[..=end])?;
            if let (Some(upper), Some(lower)) = (&previous_upper, &restriction.lower) {
                if lower < upper {
                    return Err(VersionRangeError::Overlapping(spec.to_string()));
                }
            }
            previous_upper = restriction.upper.clone();
            restrictions.push(restriction);

            process = process[end + 1..].trim();
            if let Some(rest) = process.strip_prefix(',') {
                process = rest.trim();
            }
        }

        if !process.is_empty() {
            if !restrictions.is_empty() {
                return Err(VersionRangeError::TrailingVersion(spec.to_string()));
            }
            return Ok(Self {
                recommended: Some(MavenVersion::parse(process)),
                restrictions: vec![Restriction::everything()],
            });
        }

        Ok(Self {
            recommended: None,
            restrictions,
        })
    }

    /// 単独バージョン指定のときの推奨バージョン。
    pub fn recommended(&self) -> Option<&MavenVersion> {
        self.recommended.as_ref()
    }

    pub fn restrictions(&self) -> &[Restriction] {
        &self.restrictions
    }

    pub fn contains(&self, version: &MavenVersion) -> bool {
        self.restrictions
            .iter()
            .any(|restriction| restriction.contains(version))
    }
}

impl fmt::Display for Restriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.lower_inclusive { "[" } else { "(" })?;
        if let Some(lower) = &self.lower {
            write!(f, "{lower}")?;
        }
        f.write_str(",")?;
        if let Some(upper) = &self.upper {
            write!(f, "{upper}")?;
        }
        f.write_str(if self.upper_inclusive { "]" } else { ")" })
    }
}

/// 範囲解析前の補正。`.` を含まないバージョン（`"1"` など）は末尾に `.0` を付ける。
pub fn normalize_version_expression(expression: &str) -> String {
    if expression.contains('.') {
        expression.to_string()
    } else {
        format!("{expression}.0")
    }
}
