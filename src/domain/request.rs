use serde::Deserialize;
use url::Url;

use super::{error::DomainError, rules::SelectorRules};

/// A browser rendering area used for one critical-CSS computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, serde::Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// The unit of work submitted to the generation queue.
///
/// Fields are immutable once enqueued; only queue bookkeeping around the
/// request changes. The queue assigns the generation id at enqueue time.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Page whose critical CSS is requested. Must be http or https.
    pub url: Url,
    /// Viewports to extract for; at least one is required.
    pub dimensions: Vec<Viewport>,
    /// Selectors removed from the final stylesheet, matched exactly.
    #[serde(default)]
    pub ignore: Vec<String>,
    /// Regular expressions removed from the final stylesheet.
    #[serde(default)]
    pub ignore_re: Vec<String>,
    /// Selectors always retained by the extraction engine.
    #[serde(default)]
    pub force_include: Vec<String>,
    /// Regular expressions always retained by the extraction engine.
    #[serde(default)]
    pub force_include_re: Vec<String>,
    /// Endpoint notified when the job completes successfully.
    pub notification_url: Option<Url>,
    /// Largest image, in bytes, the engine may inline as base64.
    pub max_image_file_size: Option<u32>,
    /// Base URL under which the caller can fetch the result, derived from the
    /// submitting request by the boundary layer.
    #[serde(skip)]
    pub result_endpoint: String,
}

impl GenerationRequest {
    /// Validate the parts of a submission that serde typing cannot express.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !is_web_url(&self.url) {
            return Err(DomainError::validation("url must be http or https"));
        }
        if self.dimensions.is_empty() {
            return Err(DomainError::validation(
                "at least one viewport dimension is required",
            ));
        }
        if self
            .dimensions
            .iter()
            .any(|viewport| viewport.width == 0 || viewport.height == 0)
        {
            return Err(DomainError::validation(
                "viewport dimensions must be positive",
            ));
        }
        if let Some(notification_url) = &self.notification_url
            && !is_web_url(notification_url)
        {
            return Err(DomainError::validation(
                "notificationUrl must be http or https",
            ));
        }

        // Compile once here so malformed patterns fail the submission rather
        // than the job.
        SelectorRules::compile(&self.ignore, &self.ignore_re)?;
        SelectorRules::compile(&self.force_include, &self.force_include_re)?;

        Ok(())
    }

    pub fn ignore_rules(&self) -> Result<SelectorRules, DomainError> {
        SelectorRules::compile(&self.ignore, &self.ignore_re)
    }

    pub fn force_include_rules(&self) -> Result<SelectorRules, DomainError> {
        SelectorRules::compile(&self.force_include, &self.force_include_re)
    }
}

fn is_web_url(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> GenerationRequest {
        serde_json::from_value(serde_json::json!({
            "url": "http://example.org/some/page",
            "dimensions": [{"width": 1280, "height": 800}],
        }))
        .expect("valid request json")
    }

    #[test]
    fn minimal_request_is_valid() {
        assert!(sample_request().validate().is_ok());
    }

    #[test]
    fn camel_case_fields_deserialize() {
        let request: GenerationRequest = serde_json::from_value(serde_json::json!({
            "url": "https://example.org/",
            "dimensions": [{"width": 320, "height": 568}],
            "ignore": ["font-face"],
            "ignoreRe": ["some.*expression"],
            "forceInclude": [".keep"],
            "forceIncludeRe": ["^\\.hero"],
            "notificationUrl": "https://example.org/hook",
            "maxImageFileSize": 2048,
        }))
        .expect("valid request json");

        assert_eq!(request.ignore_re, vec!["some.*expression"]);
        assert_eq!(request.force_include, vec![".keep"]);
        assert_eq!(request.max_image_file_size, Some(2048));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn non_web_scheme_is_rejected() {
        let mut request = sample_request();
        request.url = Url::parse("ftp://example.org/page").expect("valid url");
        assert!(request.validate().is_err());
    }

    #[test]
    fn empty_dimensions_are_rejected() {
        let mut request = sample_request();
        request.dimensions.clear();
        assert!(request.validate().is_err());
    }

    #[test]
    fn zero_sized_viewport_is_rejected() {
        let mut request = sample_request();
        request.dimensions = vec![Viewport {
            width: 0,
            height: 600,
        }];
        assert!(request.validate().is_err());
    }

    #[test]
    fn malformed_ignore_pattern_is_rejected() {
        let mut request = sample_request();
        request.ignore_re = vec!["(".to_string()];
        assert!(request.validate().is_err());
    }
}
