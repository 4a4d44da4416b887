//! Engine version requirements on top of `semver`.
//!
//! Engine and plugin versions are strict semantic versions. Compatibility
//! expressions accept the `semver` requirement syntax plus two forms plugin
//! manifests commonly use: whitespace between comparators (`>=8.0.0 <9.0.0`)
//! and `||` alternatives (`7.x || >=9.1.0`).

use semver::{Comparator, Op, VersionReq};

pub use semver::Version;

/// One or more `semver` requirements, any of which may admit a version
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    /// Parses a compatibility expression.
    ///
    /// # Arguments
    ///
    /// * `expression` - `||`-separated alternatives; comparators inside an
    ///   alternative are separated by commas or whitespace. A bare full version
    ///   such as `8.1.0` means exactly that version.
    ///
    /// # Returns
    ///
    /// `None` if any alternative is empty or not a valid requirement.
    pub fn parse(expression: &str) -> Option<Self> {
        let alternatives = expression
            .split("||")
            .map(parse_alternative)
            .collect::<Option<Vec<_>>>()?;
        Some(Self { alternatives })
    }

    /// An inclusive `[min, max]` range
    pub fn between(min: &Version, max: &Version) -> Self {
        Self {
            alternatives: vec![VersionReq {
                comparators: vec![comparator(Op::GreaterEq, min), comparator(Op::LessEq, max)],
            }],
        }
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives.iter().any(|requirement| requirement.matches(version))
    }
}

fn comparator(op: Op, version: &Version) -> Comparator {
    Comparator {
        op,
        major: version.major,
        minor: Some(version.minor),
        patch: Some(version.patch),
        pre: version.pre.clone(),
    }
}

fn parse_alternative(alternative: &str) -> Option<VersionReq> {
    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op = String::new();

    for token in alternative.split([',', ' ', '\t']).filter(|token| !token.is_empty()) {
        // `>= 8.0.0` splits the operator from its version
        if token.chars().all(|c| matches!(c, '<' | '>' | '=' | '~' | '^')) {
            pending_op.push_str(token);
            continue;
        }

        let bare_version = pending_op.is_empty()
            && token.starts_with(|c: char| c.is_ascii_digit())
            && !token.contains(['x', 'X', '*']);
        let op = if bare_version { "=" } else { pending_op.as_str() };
        comparators.push(format!("{op}{token}"));
        pending_op.clear();
    }

    if comparators.is_empty() || !pending_op.is_empty() {
        return None;
    }
    VersionReq::parse(&comparators.join(", ")).ok()
}
