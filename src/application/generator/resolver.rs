//! Stylesheet resolution: fetch the page, discover linked stylesheets,
//! download them all, and persist the concatenation as a transient document.

use std::{cell::RefCell, rc::Rc};

use futures::future;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use tracing::{debug, warn};
use url::Url;

use crate::infra::{
    fetch::{FetchError, ResourceFetcher},
    storage::CombinedStylesheet,
};

use super::GenerateError;

const HTML_MARKER: &str = "<html";
const CSS_SEPARATOR: &str = " ";

/// Resolve all stylesheets for `page_url` into one combined document.
///
/// Returns `Ok(None)` when the page yields no CSS at all; downstream treats
/// that as "nothing to extract", not as an error.
pub async fn resolve(
    fetcher: &dyn ResourceFetcher,
    page_url: &Url,
) -> Result<Option<CombinedStylesheet>, GenerateError> {
    let body = fetcher.fetch(page_url).await?;
    let html = String::from_utf8_lossy(&body);

    // Guards against having fetched an error page, a redirect stub, or a
    // non-HTML resource outright.
    if !html.to_lowercase().contains(HTML_MARKER) {
        return Err(GenerateError::invalid_content(page_url.as_str()));
    }

    let references = stylesheet_links(&html);
    let resolved = references
        .iter()
        .map(|href| {
            page_url.join(href).map_err(|err| {
                FetchError::new(href.clone(), format!("unresolvable stylesheet reference: {err}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        target = "application::generator::resolver",
        url = %page_url,
        stylesheets = resolved.len(),
        "discovered stylesheet links"
    );

    let downloads = resolved.iter().map(|stylesheet_url| fetcher.fetch(stylesheet_url));
    let bodies = future::try_join_all(downloads).await?;

    let css = bodies
        .iter()
        .map(|body| String::from_utf8_lossy(body))
        .collect::<Vec<_>>()
        .join(CSS_SEPARATOR);

    if css.is_empty() {
        return Ok(None);
    }

    let document = CombinedStylesheet::write(&css)?;
    Ok(Some(document))
}

/// Collect `href` values of stylesheet links, in document order.
fn stylesheet_links(html: &str) -> Vec<String> {
    let links = Rc::new(RefCell::new(Vec::new()));
    let collected = Rc::clone(&links);

    let result = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!(r#"link[rel="stylesheet" i]"#, move |el| {
                if let Some(href) = el.get_attribute("href") {
                    let href = href.trim().to_string();
                    if !href.is_empty() {
                        collected.borrow_mut().push(href);
                    }
                }
                Ok(())
            })],
            ..RewriteStrSettings::default()
        },
    );

    if let Err(err) = result {
        // lol_html tolerates almost anything; a rewriting error still leaves
        // us with whatever links were collected before it occurred.
        warn!(
            target = "application::generator::resolver",
            error = %err,
            "stylesheet link scan ended early"
        );
    }

    links.take()
}
