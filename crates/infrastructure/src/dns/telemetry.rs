//! Telemetry: anonymized per-query records for the query-log and
//! statistics collaborators. Best effort end to end.

use bastion_dns_application::ports::{QueryLogSink, QueryRecord, StatsEntry, StatsResult, StatsSink};
use bastion_dns_application::services::IpAnonymizer;
use bastion_dns_domain::{FilterReason, RecordType};
use bytes::Bytes;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::context::DnsContext;

pub struct TelemetrySink {
    query_log: Option<Arc<dyn QueryLogSink>>,
    stats: Option<Arc<dyn StatsSink>>,
    anonymizer: IpAnonymizer,
    refuse_any: bool,
}

impl TelemetrySink {
    pub fn new(
        query_log: Option<Arc<dyn QueryLogSink>>,
        stats: Option<Arc<dyn StatsSink>>,
        anonymizer: IpAnonymizer,
        refuse_any: bool,
    ) -> Self {
        Self {
            query_log,
            stats,
            anonymizer,
            refuse_any,
        }
    }

    pub fn disabled() -> Self {
        Self {
            query_log: None,
            stats: None,
            anonymizer: IpAnonymizer::default(),
            refuse_any: false,
        }
    }

    pub async fn record(&self, ctx: &DnsContext) {
        if ctx.skip_telemetry {
            return;
        }
        let Some((host, qtype)) = ctx.question() else {
            return;
        };
        if self.refuse_any && qtype == RecordType::ANY {
            debug!(%host, "ANY query not recorded");
            return;
        }

        let client_ip = self.anonymizer.anonymize(ctx.client_ip());
        let ids: Vec<&str> = if ctx.client_id.is_empty() {
            Vec::new()
        } else {
            vec![&ctx.client_id]
        };

        if let Some(query_log) = &self.query_log {
            if query_log.should_log(&host, qtype, client_ip, &ids) {
                let record = QueryRecord {
                    question_host: Arc::from(host.as_str()),
                    question_type: qtype,
                    answer: wire_bytes(ctx.response.as_ref()),
                    orig_answer: wire_bytes(ctx.orig_response.as_ref()),
                    filter_result: ctx.filter_result.clone(),
                    elapsed: ctx.start_time.elapsed(),
                    client_ip,
                    client_id: Arc::clone(&ctx.client_id),
                    client_proto: ctx.proto,
                    upstream_addr: ctx.upstream_addr.clone(),
                    cached: ctx.cached,
                    authenticated_data: ctx.response_ad,
                    timestamp: Utc::now(),
                };
                query_log.add(record).await;
            }
        }

        if let Some(stats) = &self.stats {
            if stats.should_count(&host, qtype, client_ip, &ids) {
                let client: Arc<str> = if ctx.client_id.is_empty() {
                    Arc::from(client_ip.to_string().as_str())
                } else {
                    Arc::clone(&ctx.client_id)
                };
                let entry = StatsEntry {
                    domain: Arc::from(host.as_str()),
                    client,
                    elapsed_us: ctx.start_time.elapsed().as_micros() as u64,
                    result: result_bucket(ctx),
                };
                stats.update(entry).await;
            }
        }
    }
}

fn wire_bytes(msg: Option<&hickory_proto::op::Message>) -> Option<Bytes> {
    msg.and_then(|m| m.to_vec().ok()).map(Bytes::from)
}

fn result_bucket(ctx: &DnsContext) -> StatsResult {
    match ctx.filter_result.as_ref().map(|r| r.reason) {
        Some(FilterReason::FilteredSafeBrowsing) => StatsResult::SafeBrowsing,
        Some(FilterReason::FilteredSafeSearch) => StatsResult::SafeSearch,
        Some(FilterReason::FilteredParental) => StatsResult::Parental,
        Some(reason) if reason.is_filtered() => StatsResult::Filtered,
        _ => StatsResult::NotFiltered,
    }
}
