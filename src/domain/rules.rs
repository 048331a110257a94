use regex::Regex;

use super::error::DomainError;

/// A set of selector rules given as literal strings and regular expressions.
///
/// Used both for exclusion (`ignore`/`ignoreRe`) and for force-inclusion
/// (`forceInclude`/`forceIncludeRe`). Literals match a selector exactly;
/// patterns are tested against the serialized selector text.
#[derive(Debug, Clone, Default)]
pub struct SelectorRules {
    literals: Vec<String>,
    patterns: Vec<Regex>,
}

impl SelectorRules {
    /// Compile literal and pattern strings into a matcher.
    pub fn compile(literals: &[String], patterns: &[String]) -> Result<Self, DomainError> {
        let patterns = patterns
            .iter()
            .map(|source| {
                Regex::new(source).map_err(|err| {
                    DomainError::validation(format!("invalid rule pattern `{source}`: {err}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            literals: literals.to_vec(),
            patterns,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty() && self.patterns.is_empty()
    }

    /// True when `selector` matches a literal exactly or any pattern.
    pub fn matches(&self, selector: &str) -> bool {
        self.literals.iter().any(|literal| literal == selector)
            || self.patterns.iter().any(|pattern| pattern.is_match(selector))
    }

    /// True when an at-rule name (for example `font-face`) is listed literally.
    pub fn matches_at_rule(&self, name: &str) -> bool {
        self.literals.iter().any(|literal| literal == name)
    }

    pub fn literals(&self) -> &[String] {
        &self.literals
    }

    pub fn pattern_sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }
}
