//! Log line filters
//!
//! Both filters are case-insensitive substring matches and pass everything
//! through when given an empty filter list.

/// Keep lines mentioning any of `levels`
pub fn by_level(lines: Vec<String>, levels: &[String]) -> Vec<String> {
    retain_matching(lines, levels)
}

/// Keep lines containing any of `patterns`
pub fn by_pattern(lines: Vec<String>, patterns: &[String]) -> Vec<String> {
    retain_matching(lines, patterns)
}

fn retain_matching(lines: Vec<String>, needles: &[String]) -> Vec<String> {
    let needles: Vec<String> = needles
        .iter()
        .filter(|n| !n.is_empty())
        .map(|n| n.to_lowercase())
        .collect();
    if needles.is_empty() {
        return lines;
    }

    lines
        .into_iter()
        .filter(|line| {
            let lower = line.to_lowercase();
            needles.iter().any(|n| lower.contains(n.as_str()))
        })
        .collect()
}

/// Level and pattern filter applied to every pod's lines
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub levels: Vec<String>,
    pub patterns: Vec<String>,
}

impl LogFilter {
    pub fn new(levels: Vec<String>, patterns: Vec<String>) -> Self {
        Self { levels, patterns }
    }

    pub fn apply(&self, lines: Vec<String>) -> Vec<String> {
        by_pattern(by_level(lines, &self.levels), &self.patterns)
    }
}
