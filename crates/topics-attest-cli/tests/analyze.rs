//! Crawl analysis end to end, with the network stubbed out.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use topics_attest::{
    AttestationDocument, AttestationFetcher, AttestationResolver, CrawlOutput, Domain, FetchError,
    MemoryCache, ScriptFetcher, UsageCorrelator,
};
use topics_attest_cli::{analyze, OperationLog};

// ─────────────────────── helpers ───────────────────────

/// Only `ads.example` publishes a valid attestation file.
struct StubNetwork;

#[async_trait]
impl AttestationFetcher for StubNetwork {
    async fn fetch(&self, domain: &Domain) -> Result<AttestationDocument, FetchError> {
        if domain.as_str() != "ads.example" {
            return Err(FetchError::Protocol {
                url: domain.to_string(),
                reason: "status 404".to_string(),
            });
        }
        Ok(AttestationDocument::from_value(json!({
            "privacy_sandbox_api_attestations": [{
                "issued_seconds_since_epoch": 1_700_000_000,
                "expiry_seconds_since_epoch": chrono::Utc::now().timestamp() + 3_600,
                "enrollment_site": "https://ads.example",
                "platform_attestations": [{
                    "platform": "chrome",
                    "attestations": {
                        "topics_api": { "ServiceNotUsedForIdentifyingUserAcrossSites": true }
                    }
                }]
            }]
        })))
    }
}

#[async_trait]
impl ScriptFetcher for StubNetwork {
    async fn fetch_script(&self, url: &str) -> Result<String, FetchError> {
        Err(FetchError::Protocol {
            url: url.to_string(),
            reason: "not stubbed".to_string(),
        })
    }
}

fn correlator() -> UsageCorrelator {
    let network = Arc::new(StubNetwork);
    let resolver = AttestationResolver::new(network.clone(), Arc::new(MemoryCache::new()));
    UsageCorrelator::new(Arc::new(resolver), network)
}

fn crawl_fixture() -> Value {
    json!({
        "first": {
            "requests": [{
                "documentURL": "https://site.example/",
                "request": { "url": "https://site.example/", "headers": {} }
            }],
            "responses": [],
            "topics_api_usages": []
        },
        "second": {
            "requests": [{
                "documentURL": "https://site.example/",
                "request": {
                    "url": "https://ads.example/topics",
                    "headers": { "Sec-Browsing-Topics": "(1 2);v=chrome.1:1:2" }
                }
            }],
            "responses": [{
                "response": {
                    "url": "https://ads.example/topics",
                    "headers": { "Observe-Browsing-Topics": "?1" }
                }
            }],
            "topics_api_usages": [
                { "context_origin_url": "https://ads.example/", "caller_source": "fetch", "usage_time": 1.5 }
            ]
        },
        "banner_data": { "clicked_element": { "text": "Accept all" } }
    })
}

// ═══════════════════════════════════════════════════════
// ANALYSIS
// ═══════════════════════════════════════════════════════

#[tokio::test]
async fn analyzes_present_stages() {
    let crawl: CrawlOutput = serde_json::from_value(crawl_fixture()).unwrap();
    let output = analyze(&crawl, &correlator(), OperationLog::new()).await;

    assert_eq!(output.url.as_deref(), Some("https://site.example/"));
    assert!(output.banner_clicked);
    assert!(output.click.is_none());
    assert!(output.internal.is_none());

    let first = output.first.as_ref().unwrap();
    assert!(first.attestations.is_empty());

    let second = output.second.as_ref().unwrap();
    assert_eq!(second.attestations.len(), 1);
    assert_eq!(second.attestations[0].domain, "ads.example");
    assert_eq!(second.topics_api_usages[0].possible_callers.len(), 2);

    assert!(!output.log_entries.is_empty());
}

#[tokio::test]
async fn writes_output_document() {
    let dir = TempDir::new().unwrap();
    let outfile = dir.path().join("out").join("topics_output.json");

    let crawl: CrawlOutput = serde_json::from_value(crawl_fixture()).unwrap();
    let output = analyze(&crawl, &correlator(), OperationLog::new()).await;
    output.write(&outfile, true).unwrap();

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&outfile).unwrap()).unwrap();
    assert_eq!(written["url"], "https://site.example/");
    assert_eq!(written["banner_clicked"], true);
    assert!(written.get("click").is_none());
    let usage = &written["second"]["topics_api_usages"][0];
    assert_eq!(usage["usage_time"], 1.5);
    assert_eq!(usage["possible_callers"][0]["reason"], "header-request");
    assert_eq!(usage["possible_callers"][1]["reason"], "header-response");
    assert_eq!(
        written["second"]["attestations"][0]["sandbox_attestations"][0]["issued"],
        1_700_000_000
    );
    assert_eq!(written["log_entries"][0].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn attested_domain_resolved_once_across_stages() {
    let mut fixture = crawl_fixture();
    fixture["internal"] = fixture["second"].clone();
    let crawl: CrawlOutput = serde_json::from_value(fixture).unwrap();

    let c = correlator();
    let output = analyze(&crawl, &c, OperationLog::new()).await;
    assert_eq!(output.internal.as_ref().unwrap().attestations.len(), 1);

    // Both hosts are two labels deep: one fetch each, the last stage hits the cache.
    let stats = c.resolver().stats();
    assert_eq!(stats.fetches, 2);
    assert!(stats.cache_hits >= 1);
}
