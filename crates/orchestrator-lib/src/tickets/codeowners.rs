//! CODEOWNERS parsing and matching
//!
//! Patterns follow gitignore rules as GitHub applies them: a pattern without
//! an interior slash matches at any depth, a leading slash anchors it to the
//! repository root, and a trailing slash matches everything below a
//! directory. The last matching rule wins.

use globset::{GlobBuilder, GlobMatcher};
use tracing::debug;

/// Standard CODEOWNERS locations, in lookup order
pub const CODEOWNERS_PATHS: &[&str] = &["CODEOWNERS", ".github/CODEOWNERS", "docs/CODEOWNERS"];

struct Rule {
    matchers: Vec<GlobMatcher>,
    owners: Vec<String>,
}

/// Parsed CODEOWNERS file
pub struct CodeOwners {
    rules: Vec<Rule>,
}

impl CodeOwners {
    pub fn parse(content: &str) -> Self {
        let rules = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let pattern = fields.next()?;
                let owners: Vec<String> = fields
                    .take_while(|f| !f.starts_with('#'))
                    .map(|owner| owner.trim_start_matches('@').to_string())
                    .collect();

                match compile(pattern) {
                    Some(matchers) => Some(Rule { matchers, owners }),
                    None => {
                        debug!(pattern = %pattern, "Skipping invalid CODEOWNERS pattern");
                        None
                    }
                }
            })
            .collect();

        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Owners of the last rule matching `path`
    ///
    /// A matching rule with no owners explicitly unassigns the path.
    pub fn owners_for(&self, path: &str) -> Option<&[String]> {
        let path = normalize(path);
        self.rules
            .iter()
            .rev()
            .find(|rule| rule.matchers.iter().any(|m| m.is_match(path)))
            .map(|rule| rule.owners.as_slice())
    }

    /// Owner to assign for `path`: the last owner listed on the winning rule
    pub fn owner_for(&self, path: &str) -> Option<String> {
        self.owners_for(path)
            .and_then(|owners| owners.last())
            .cloned()
    }
}

fn normalize(path: &str) -> &str {
    let path = path.strip_prefix("./").unwrap_or(path);
    path.trim_start_matches('/')
}

fn compile(pattern: &str) -> Option<Vec<GlobMatcher>> {
    let anchored = pattern.starts_with('/');
    let mut body = pattern.trim_start_matches('/').to_string();
    if body.is_empty() {
        return None;
    }
    if body.ends_with('/') {
        body.push_str("**");
    }

    let base = if anchored || body.trim_end_matches("/**").contains('/') {
        body
    } else {
        format!("**/{body}")
    };

    // A name may denote a directory, so it also covers everything below it.
    // A trailing `*` segment stays one level deep.
    let mut candidates = vec![base.clone()];
    if base.rsplit('/').next() != Some("*") {
        candidates.push(format!("{base}/**"));
    }
    let mut matchers = Vec::with_capacity(candidates.len());
    for glob in &candidates {
        let matcher = GlobBuilder::new(glob)
            .literal_separator(true)
            .build()
            .ok()?
            .compile_matcher();
        matchers.push(matcher);
    }
    Some(matchers)
}
