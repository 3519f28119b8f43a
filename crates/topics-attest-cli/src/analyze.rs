//! Crawl analysis: run the correlator over every stage of a crawl output.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use topics_attest::crawl::STAGES;
use topics_attest::{full_domain, registrable_domain, CrawlOutput, Domain, UsageCorrelator, UsageReport};

use crate::oplog::{LogEntry, OperationLog};

/// The document written by `analyze`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<UsageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click: Option<UsageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second: Option<UsageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal: Option<UsageReport>,
    pub banner_clicked: bool,
    pub log_entries: Vec<LogEntry>,
}

impl AnalysisOutput {
    fn set_stage(&mut self, name: &str, report: UsageReport) {
        let slot = match name {
            "first" => &mut self.first,
            "click" => &mut self.click,
            "second" => &mut self.second,
            "internal" => &mut self.internal,
            _ => return,
        };
        *slot = Some(report);
    }

    pub fn stage(&self, name: &str) -> Option<&UsageReport> {
        match name {
            "first" => self.first.as_ref(),
            "click" => self.click.as_ref(),
            "second" => self.second.as_ref(),
            "internal" => self.internal.as_ref(),
            _ => None,
        }
    }

    /// Write as JSON, creating parent directories as needed.
    pub fn write(&self, path: &Path, pretty: bool) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        std::fs::write(path, json)
            .with_context(|| format!("failed to write output: {}", path.display()))
    }
}

/// Analyze every stage present in `crawl`, in stage order.
///
/// Stage results are recorded as they complete; the operation log is moved
/// into the output at the end.
pub async fn analyze(
    crawl: &CrawlOutput,
    correlator: &UsageCorrelator,
    mut log: OperationLog,
) -> AnalysisOutput {
    let mut output = AnalysisOutput {
        url: crawl.site_url().map(str::to_string),
        banner_clicked: crawl.banner_clicked(),
        ..Default::default()
    };

    for name in STAGES {
        let Some(stage) = crawl.stage(name) else {
            continue;
        };
        log.log(format!(
            "Analyzing stage {name}: {} requests, {} responses, {} usages",
            stage.requests.len(),
            stage.responses.len(),
            stage.topics_api_usages.len()
        ));
        let report = correlator.correlate(stage).await;
        log.log(format!(
            "Stage {name}: {} attested domains, {} usages with evidence",
            report.attestations.len(),
            report
                .topics_api_usages
                .iter()
                .filter(|u| !u.possible_callers.is_empty())
                .count()
        ));
        output.set_stage(name, report);
    }

    let stats = correlator.resolver().stats();
    log.log(format!(
        "Resolver: {} fetches, {} cache hits, {} allow-list skips, {} cache errors",
        stats.fetches, stats.cache_hits, stats.allow_list_skips, stats.cache_errors
    ));

    output.log_entries = log.into_entries();
    output
}

/// Registrable domains of the post-consent stage's traffic.
///
/// Empty unless the consent banner was clicked.
pub fn extract_domains(crawl: &CrawlOutput) -> BTreeSet<Domain> {
    let mut domains = BTreeSet::new();
    if !crawl.banner_clicked() {
        return domains;
    }
    let Some(stage) = crawl.second.as_ref() else {
        return domains;
    };

    let urls = stage
        .requests
        .iter()
        .filter_map(|r| r.target_url())
        .chain(stage.responses.iter().filter_map(|r| r.target_url()));
    for url in urls {
        let host = full_domain(url);
        if host.is_empty() {
            continue;
        }
        domains.insert(registrable_domain(&host));
    }
    domains
}

/// `domain,"<record json>"` with CSV quote escaping.
pub fn csv_line(domain: &Domain, record_json: &str) -> String {
    format!("{domain},\"{}\"", record_json.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn domains_require_banner_click() {
        let mut crawl: CrawlOutput = serde_json::from_value(json!({
            "second": {
                "requests": [
                    { "request": { "url": "https://a.cdn.example.com/x.js" } },
                    { "request": { "url": "https://www.example.com/" } }
                ],
                "responses": [{ "response": { "url": "https://tracker.co.uk/p" } }]
            }
        }))
        .unwrap();
        assert!(extract_domains(&crawl).is_empty());

        crawl.banner_data = Some(json!({ "clicked_element": { "tag": "button" } }));
        let found: Vec<String> = extract_domains(&crawl).iter().map(|d| d.to_string()).collect();
        assert_eq!(found, vec!["example.com", "tracker.co.uk"]);
    }

    #[test]
    fn csv_quotes_are_doubled() {
        assert_eq!(
            csv_line(&Domain::new("a.example"), r#"{"domain":"a.example"}"#),
            r#"a.example,"{""domain"":""a.example""}""#
        );
    }

    #[test]
    fn absent_stages_are_omitted() {
        let output = AnalysisOutput {
            banner_clicked: true,
            ..Default::default()
        };
        let value = serde_json::to_value(&output).unwrap();
        assert!(value.get("click").is_none());
        assert_eq!(value["banner_clicked"], true);
        assert!(value["log_entries"].as_array().unwrap().is_empty());
    }
}
