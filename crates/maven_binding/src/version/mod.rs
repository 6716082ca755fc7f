//! Maven version ordering and range containment.
//!
//! Ordering follows Maven's `ComparableVersion`: versions are split on `.`,
//! `-` and digit/letter transitions into a nested list of numeric and
//! qualifier items, trailing "null" items are dropped (`1 == 1.0 == 1.0.0`),
//! and qualifiers rank `alpha < beta < milestone < rc < snapshot < "" < sp`
//! with unknown qualifiers after all known ones.

use std::cmp::Ordering;
use std::fmt;

mod range;

pub use range::{Restriction, VersionRange, VersionRangeError, normalize_version_expression};

const QUALIFIERS: [&str; 7] = ["alpha", "beta", "milestone", "rc", "snapshot", "", "sp"];
const RELEASE_QUALIFIER_INDEX: &str = "5";

/// 比較可能なMavenバージョン。
#[derive(Debug, Clone)]
pub struct MavenVersion {
    original: String,
    items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    /// 先頭ゼロを除いた10進数字列。任意桁数を扱う。
    Int(String),
    Str(String),
    List(Vec<Item>),
}

impl MavenVersion {
    /// 任意の文字列を受け付ける（Mavenと同様に失敗しない）。
    pub fn parse(version: &str) -> Self {
        Self {
            original: version.to_string(),
            items: parse_items(&version.to_ascii_lowercase()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }
}

impl fmt::Display for MavenVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl PartialEq for MavenVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MavenVersion {}

impl PartialOrd for MavenVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MavenVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_lists(&self.items, &other.items)
    }
}

fn parse_items(version: &str) -> Vec<Item> {
    // Each frame is a list under construction; `-` and digit/letter
    // transitions open a nested list that ends up inside its parent.
    let mut stack: Vec<Vec<Item>> = vec![Vec::new()];
    let chars = version.char_indices().collect::<Vec<_>>();
    let mut is_digit = false;
    let mut start = 0usize;

    for &(index, ch) in &chars {
        match ch {
            '.' => {
                push_token(&mut stack, &version[start..index], is_digit);
                start = index + 1;
            }
            '-' => {
                push_token(&mut stack, &version[start..index], is_digit);
                start = index + 1;
                stack.push(Vec::new());
            }
            c if c.is_ascii_digit() => {
                if !is_digit && index > start {
                    let token = &version[start..index];
                    current(&mut stack).push(Item::Str(canonical_qualifier(token, true)));
                    start = index;
                    stack.push(Vec::new());
                }
                is_digit = true;
            }
            _ => {
                if is_digit && index > start {
                    current(&mut stack).push(int_item(&version[start..index]));
                    start = index;
                    stack.push(Vec::new());
                }
                is_digit = false;
            }
        }
    }

    if version.len() > start {
        let token = &version[start..];
        let item = if is_digit {
            int_item(token)
        } else {
            Item::Str(canonical_qualifier(token, false))
        };
        current(&mut stack).push(item);
    }

    while stack.len() > 1 {
        let mut child = stack.pop().unwrap_or_default();
        normalize(&mut child);
        current(&mut stack).push(Item::List(child));
    }
    let mut root = stack.pop().unwrap_or_default();
    normalize(&mut root);
    root
}

fn current(stack: &mut Vec<Vec<Item>>) -> &mut Vec<Item> {
    if stack.is_empty() {
        stack.push(Vec::new());
    }
    let last = stack.len() - 1;
    &mut stack[last]
}

fn push_token(stack: &mut Vec<Vec<Item>>, token: &str, is_digit: bool) {
    let item = if token.is_empty() {
        Item::Int("0".to_string())
    } else if is_digit {
        int_item(token)
    } else {
        Item::Str(canonical_qualifier(token, false))
    };
    current(stack).push(item);
}

fn int_item(token: &str) -> Item {
    let trimmed = token.trim_start_matches('0');
    if trimmed.is_empty() {
        Item::Int("0".to_string())
    } else {
        Item::Int(trimmed.to_string())
    }
}

fn canonical_qualifier(token: &str, followed_by_digit: bool) -> String {
    if followed_by_digit && token.len() == 1 {
        match token {
            "a" => return "alpha".to_string(),
            "b" => return "beta".to_string(),
            "m" => return "milestone".to_string(),
            _ => {}
        }
    }
    match token {
        "ga" | "final" | "release" => String::new(),
        "cr" => "rc".to_string(),
        other => other.to_string(),
    }
}

fn normalize(items: &mut Vec<Item>) {
    let mut index = items.len();
    while index > 0 {
        index -= 1;
        if is_null(&items[index]) {
            items.remove(index);
        } else if !matches!(items[index], Item::List(_)) {
            break;
        }
    }
}

fn is_null(item: &Item) -> bool {
    match item {
        Item::Int(digits) => digits == "0",
        Item::Str(value) => value.is_empty(),
        Item::List(items) => items.is_empty(),
    }
}

fn comparable_qualifier(value: &str) -> String {
    match QUALIFIERS.iter().position(|known| *known == value) {
        Some(index) => index.to_string(),
        None => format!("{}-{}", QUALIFIERS.len(), value),
    }
}

fn compare_ints(left: &str, right: &str) -> Ordering {
    left.len().cmp(&right.len()).then_with(|| left.cmp(right))
}

/// `right` が `None` のときは「欠けた要素」との比較。
fn compare_item(left: &Item, right: Option<&Item>) -> Ordering {
    match (left, right) {
        (Item::Int(digits), None) => {
            if digits == "0" {
                Ordering::Equal
            } else {
                Ordering::Greater
            }
        }
        (Item::Int(a), Some(Item::Int(b))) => compare_ints(a, b),
        (Item::Int(_), Some(_)) => Ordering::Greater,

        (Item::Str(value), None) => {
            comparable_qualifier(value).as_str().cmp(RELEASE_QUALIFIER_INDEX)
        }
        (Item::Str(_), Some(Item::Int(_))) => Ordering::Less,
        (Item::Str(a), Some(Item::Str(b))) => comparable_qualifier(a).cmp(&comparable_qualifier(b)),
        (Item::Str(_), Some(Item::List(_))) => Ordering::Less,

        (Item::List(items), None) => match items.first() {
            Some(first) => compare_item(first, None),
            None => Ordering::Equal,
        },
        (Item::List(_), Some(Item::Int(_))) => Ordering::Less,
        (Item::List(_), Some(Item::Str(_))) => Ordering::Greater,
        (Item::List(a), Some(Item::List(b))) => compare_lists(a, b),
    }
}

fn compare_lists(left: &[Item], right: &[Item]) -> Ordering {
    let len = left.len().max(right.len());
    for index in 0..len {
        let result = match (left.get(index), right.get(index)) {
            (None, None) => Ordering::Equal,
            (None, Some(r)) => compare_item(r, None).reverse(),
            (Some(l), r) => compare_item(l, r),
        };
        if result != Ordering::Equal {
            return result;
        }
    }
    Ordering::Equal
}
