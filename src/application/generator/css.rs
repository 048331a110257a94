//! Aggregation and filtering of per-viewport critical CSS.
//!
//! `combine` must run before `filter`: exclusion is defined over the merged
//! ruleset, not over per-viewport fragments.

use lightningcss::{
    rules::{CssRule, CssRuleList},
    stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet},
    traits::ToCss,
};

use crate::domain::rules::SelectorRules;

use super::GenerateError;

const FRAGMENT_SEPARATOR: &str = " ";

/// Merge per-viewport fragments into one minified stylesheet.
///
/// Minification merges media queries and adjacent identical rules, which is
/// what de-duplicates rules extracted identically for several viewports.
pub fn combine(fragments: &[String]) -> Result<String, GenerateError> {
    minify(&fragments.join(FRAGMENT_SEPARATOR))
}

/// Strip rule blocks matching the exclusion rules, then re-minify.
///
/// With an empty rule set the input passes through unchanged.
pub fn filter(css: &str, ignore: &SelectorRules) -> Result<String, GenerateError> {
    if ignore.is_empty() {
        return Ok(css.to_string());
    }

    let mut sheet = parse(css)?;
    retain_rules(&mut sheet.rules, ignore)?;
    print_minified(sheet)
}

fn minify(css: &str) -> Result<String, GenerateError> {
    print_minified(parse(css)?)
}

fn parse(css: &str) -> Result<StyleSheet<'_>, GenerateError> {
    // Tolerate oddities in engine output rather than failing the whole job
    // on a single unparsable declaration.
    let options = ParserOptions {
        error_recovery: true,
        ..ParserOptions::default()
    };
    StyleSheet::parse(css, options).map_err(|err| GenerateError::css(err.to_string()))
}

fn print_minified(mut sheet: StyleSheet<'_>) -> Result<String, GenerateError> {
    sheet
        .minify(MinifyOptions::default())
        .map_err(|err| GenerateError::css(err.to_string()))?;
    let output = sheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|err| GenerateError::css(err.to_string()))?;
    Ok(output.code)
}

/// Drop matching style rules, recursing into grouping at-rules. The literal
/// `font-face` additionally strips `@font-face` blocks.
fn retain_rules(rules: &mut CssRuleList<'_>, ignore: &SelectorRules) -> Result<(), GenerateError> {
    let mut kept = Vec::with_capacity(rules.0.len());

    for mut rule in std::mem::take(&mut rules.0) {
        let keep = match &mut rule {
            CssRule::Style(style) => {
                let selectors = style
                    .selectors
                    .to_css_string(PrinterOptions::default())
                    .map_err(|err| GenerateError::css(err.to_string()))?;
                !selectors
                    .split(',')
                    .map(str::trim)
                    .any(|selector| ignore.matches(selector))
            }
            CssRule::Media(media) => {
                retain_rules(&mut media.rules, ignore)?;
                !media.rules.0.is_empty()
            }
            CssRule::Supports(supports) => {
                retain_rules(&mut supports.rules, ignore)?;
                !supports.rules.0.is_empty()
            }
            CssRule::FontFace(_) => !ignore.matches_at_rule("font-face"),
            _ => true,
        };

        if keep {
            kept.push(rule);
        }
    }

    rules.0 = kept;
    Ok(())
}
