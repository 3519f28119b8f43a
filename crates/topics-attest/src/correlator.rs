//! Correlates Topics API usage events with the traffic of a crawl stage.
//!
//! Requests are processed before responses, each in input order, and
//! evidence is appended in that order. Along the way every host seen in the
//! stage is resolved and positive attestations are collected.

use std::collections::HashMap;
use std::sync::Arc;

use crate::crawl::{CrawlStage, Headers};
use crate::domain::{full_domain, origin, Domain};
use crate::fetcher::ScriptFetcher;
use crate::resolver::AttestationResolver;
use crate::types::{
    AnnotatedUsage, AttestationRecord, CallerKind, EvidenceEntry, EvidenceReason, UsageReport,
};

/// Request header sent by the browser when a fetch/iframe asks for topics.
pub const REQUEST_HEADER: &str = "sec-browsing-topics";
/// Response header by which a server marks the topics as observed.
pub const RESPONSE_HEADER: &str = "observe-browsing-topics";
/// The JavaScript API entry point looked for in script bodies.
pub const API_SYMBOL: &str = "browsingTopics";

const SCRIPT_CONTENT_TYPES: [&str; 2] = ["text/javascript", "application/javascript"];

/// Settings for the (expensive) script-content check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptCheck {
    pub enabled: bool,
    pub case_insensitive: bool,
}

/// Produces a [`UsageReport`] per crawl stage.
pub struct UsageCorrelator {
    resolver: Arc<AttestationResolver>,
    scripts: Arc<dyn ScriptFetcher>,
    script_check: ScriptCheck,
}

impl UsageCorrelator {
    pub fn new(resolver: Arc<AttestationResolver>, scripts: Arc<dyn ScriptFetcher>) -> Self {
        Self {
            resolver,
            scripts,
            script_check: ScriptCheck::default(),
        }
    }

    pub fn with_script_check(mut self, script_check: ScriptCheck) -> Self {
        self.script_check = script_check;
        self
    }

    pub fn resolver(&self) -> &AttestationResolver {
        &self.resolver
    }

    /// Correlate one stage. Never fails: network problems only mean less evidence.
    pub async fn correlate(&self, stage: &CrawlStage) -> UsageReport {
        let mut run = Correlation::new(stage);

        for request in &stage.requests {
            let Some(url) = request.target_url() else {
                continue;
            };
            self.collect_attestation(&mut run, url).await;

            let Some(caller) = run.caller_for(url) else {
                continue;
            };
            if caller.uses_headers() && request.request.headers.contains(REQUEST_HEADER) {
                run.add_evidence(url, EvidenceReason::HeaderRequest);
            }
        }

        for response in &stage.responses {
            let Some(url) = response.target_url() else {
                continue;
            };
            self.collect_attestation(&mut run, url).await;

            let Some(caller) = run.caller_for(url) else {
                continue;
            };
            let headers = &response.response.headers;
            if caller.uses_headers() && headers.contains(RESPONSE_HEADER) {
                run.add_evidence(url, EvidenceReason::HeaderResponse);
            }
            if caller == CallerKind::Javascript
                && is_script(headers)
                && self.script_invokes_api(&mut run, url).await
            {
                run.add_evidence(url, EvidenceReason::ScriptContent);
            }
        }

        run.finish()
    }

    async fn collect_attestation(&self, run: &mut Correlation, url: &str) {
        let host = full_domain(url);
        if host.is_empty() {
            return;
        }
        let record = match run.resolved.get(&host) {
            Some(cached) => cached.clone(),
            None => {
                let record = self.resolver.resolve(&host).await;
                run.resolved.insert(host, record.clone());
                record
            }
        };
        if let Some(record) = record {
            run.add_attestation(record);
        }
    }

    async fn script_invokes_api(&self, run: &mut Correlation, url: &str) -> bool {
        if !self.script_check.enabled {
            return false;
        }
        if let Some(&known) = run.scripts_checked.get(url) {
            return known;
        }

        let found = match self.scripts.fetch_script(url).await {
            Ok(body) if self.script_check.case_insensitive => {
                body.to_lowercase().contains(&API_SYMBOL.to_lowercase())
            }
            Ok(body) => body.contains(API_SYMBOL),
            Err(e) => {
                tracing::debug!("script check skipped: {e}");
                false
            }
        };
        run.scripts_checked.insert(url.to_string(), found);
        found
    }
}

fn is_script(headers: &Headers) -> bool {
    headers
        .get("content-type")
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            SCRIPT_CONTENT_TYPES.iter().any(|t| ct.contains(t))
        })
        .unwrap_or(false)
}

/// Working state of one `correlate` call.
struct Correlation {
    usages: Vec<AnnotatedUsage>,
    by_origin: HashMap<String, usize>,
    attestations: Vec<AttestationRecord>,
    attestation_index: HashMap<String, usize>,
    resolved: HashMap<Domain, Option<AttestationRecord>>,
    scripts_checked: HashMap<String, bool>,
}

impl Correlation {
    fn new(stage: &CrawlStage) -> Self {
        let mut usages: Vec<AnnotatedUsage> = Vec::new();
        let mut by_origin = HashMap::new();

        // Later events for the same origin replace earlier ones in place.
        for event in &stage.topics_api_usages {
            let annotated = AnnotatedUsage {
                event: event.clone(),
                possible_callers: Vec::new(),
            };
            match by_origin.get(&event.context_origin_url) {
                Some(&i) => usages[i] = annotated,
                None => {
                    by_origin.insert(event.context_origin_url.clone(), usages.len());
                    usages.push(annotated);
                }
            }
        }

        Self {
            usages,
            by_origin,
            attestations: Vec::new(),
            attestation_index: HashMap::new(),
            resolved: HashMap::new(),
            scripts_checked: HashMap::new(),
        }
    }

    fn caller_for(&self, url: &str) -> Option<CallerKind> {
        self.by_origin
            .get(&origin(url))
            .map(|&i| self.usages[i].event.caller_source.clone())
    }

    fn add_evidence(&mut self, url: &str, reason: EvidenceReason) {
        if let Some(&i) = self.by_origin.get(&origin(url)) {
            self.usages[i].possible_callers.push(EvidenceEntry {
                url: url.to_string(),
                reason,
            });
        }
    }

    fn add_attestation(&mut self, record: AttestationRecord) {
        match self.attestation_index.get(&record.domain) {
            Some(&i) => self.attestations[i] = record,
            None => {
                self.attestation_index
                    .insert(record.domain.clone(), self.attestations.len());
                self.attestations.push(record);
            }
        }
    }

    fn finish(self) -> UsageReport {
        UsageReport {
            attestations: self.attestations,
            topics_api_usages: self.usages,
        }
    }
}
