//! Crawl output records, as written by the browser-driving crawler.
//!
//! Requests are DevTools `Network.requestWillBeSent` params and responses
//! are `Network.responseReceived` params; only the fields used here are
//! modeled, everything else is ignored.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{AttestResult, UsageEvent};

/// Names of the crawl stages, in the order they are analyzed.
pub const STAGES: [&str; 4] = ["first", "click", "second", "internal"];

/// Header map with case-insensitive lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Map<String, Value>);

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.keys().any(|k| k.eq_ignore_ascii_case(name))
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Headers {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Headers,
}

/// One outgoing request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    #[serde(default, rename = "documentURL")]
    pub document_url: Option<String>,
    #[serde(default)]
    pub request: RequestInfo,
}

impl RequestRecord {
    pub fn new(url: &str, headers: Headers) -> Self {
        Self {
            document_url: None,
            request: RequestInfo {
                url: Some(url.to_string()),
                headers,
            },
        }
    }

    /// The request's own URL, or the document URL when the crawler left it out.
    pub fn target_url(&self) -> Option<&str> {
        self.request.url.as_deref().or(self.document_url.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub headers: Headers,
}

/// One received response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    #[serde(default)]
    pub response: ResponseInfo,
}

impl ResponseRecord {
    pub fn new(url: &str, headers: Headers) -> Self {
        Self {
            response: ResponseInfo {
                url: Some(url.to_string()),
                headers,
            },
        }
    }

    pub fn target_url(&self) -> Option<&str> {
        self.response.url.as_deref()
    }
}

/// Network activity and API usage recorded during one crawl stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlStage {
    #[serde(default)]
    pub requests: Vec<RequestRecord>,
    #[serde(default)]
    pub responses: Vec<ResponseRecord>,
    #[serde(default)]
    pub topics_api_usages: Vec<UsageEvent>,
}

/// Everything one crawl of a site produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrawlOutput {
    #[serde(default)]
    pub first: Option<CrawlStage>,
    #[serde(default)]
    pub click: Option<CrawlStage>,
    #[serde(default)]
    pub second: Option<CrawlStage>,
    #[serde(default)]
    pub internal: Option<CrawlStage>,
    #[serde(default)]
    pub banner_data: Option<Value>,
}

impl CrawlOutput {
    pub fn load(path: &Path) -> AttestResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn stage(&self, name: &str) -> Option<&CrawlStage> {
        match name {
            "first" => self.first.as_ref(),
            "click" => self.click.as_ref(),
            "second" => self.second.as_ref(),
            "internal" => self.internal.as_ref(),
            _ => None,
        }
    }

    /// Whether the crawler clicked an element of the consent banner.
    pub fn banner_clicked(&self) -> bool {
        self.banner_data
            .as_ref()
            .and_then(|b| b.get("clicked_element"))
            .is_some_and(|e| !e.is_null())
    }

    /// The page URL of the first visit.
    pub fn site_url(&self) -> Option<&str> {
        self.first
            .as_ref()
            .and_then(|s| s.requests.first())
            .and_then(|r| r.document_url.as_deref().or(r.request.url.as_deref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_devtools_records() {
        let output: CrawlOutput = serde_json::from_value(json!({
            "first": {
                "requests": [{
                    "documentURL": "https://site.example/",
                    "requestId": "1",
                    "request": {
                        "url": "https://ads.example/bid",
                        "method": "GET",
                        "headers": { "Sec-Browsing-Topics": "?1" }
                    }
                }],
                "responses": [{
                    "response": {
                        "url": "https://ads.example/bid",
                        "status": 200,
                        "headers": { "Observe-Browsing-Topics": "?1" }
                    }
                }],
                "topics_api_usages": [{
                    "context_origin_url": "https://ads.example/",
                    "caller_source": "fetch",
                    "usage_time": 13350000000000000u64
                }]
            },
            "banner_data": { "clicked_element": { "tag": "button" } }
        }))
        .unwrap();

        let first = output.first.as_ref().unwrap();
        assert_eq!(first.requests[0].target_url(), Some("https://ads.example/bid"));
        assert!(first.requests[0].request.headers.contains("sec-browsing-topics"));
        assert!(first.responses[0].response.headers.contains("observe-browsing-topics"));
        assert_eq!(output.site_url(), Some("https://site.example/"));
        assert!(output.banner_clicked());
        assert!(output.stage("click").is_none());
    }

    #[test]
    fn request_falls_back_to_document_url() {
        let record: RequestRecord = serde_json::from_value(json!({
            "documentURL": "https://site.example/"
        }))
        .unwrap();
        assert_eq!(record.target_url(), Some("https://site.example/"));
    }

    #[test]
    fn header_lookup_ignores_case() {
        let headers = Headers::from([("Content-Type", "text/javascript; charset=utf-8")]);
        assert_eq!(headers.get("content-type"), Some("text/javascript; charset=utf-8"));
        assert!(!headers.contains("observe-browsing-topics"));
    }

    #[test]
    fn null_clicked_element_is_not_a_click() {
        let output: CrawlOutput =
            serde_json::from_value(json!({ "banner_data": { "clicked_element": null } })).unwrap();
        assert!(!output.banner_clicked());
    }
}
