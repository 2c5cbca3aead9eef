//! Adapter between the pipeline and the external rule engine.
//!
//! The bridge owns only immutable policy (the blocking mode snapshot);
//! the context is passed into pure methods, never stored.

use bastion_dns_application::ports::{FilterEngine, FilterRequest};
use bastion_dns_domain::{BlockingMode, DnsConfig, FilterResult, RecordType};
use hickory_proto::rr::{RData, Record};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use tracing::debug;

use super::context::DnsContext;
use super::message;

/// Blocked-response policy snapshot.
#[derive(Debug, Clone, Copy)]
pub struct BlockingPolicy {
    pub mode: BlockingMode,
    pub custom_v4: Option<Ipv4Addr>,
    pub custom_v6: Option<Ipv6Addr>,
    pub ttl: u32,
}

impl BlockingPolicy {
    pub fn from_config(config: &DnsConfig) -> Self {
        Self {
            mode: config.blocking_mode,
            custom_v4: config.blocking_ipv4,
            custom_v6: config.blocking_ipv6,
            ttl: config.blocked_response_ttl,
        }
    }
}

pub struct FilterBridge {
    engine: Arc<dyn FilterEngine>,
    blocking: BlockingPolicy,
    rewrite_ttl: u32,
}

impl FilterBridge {
    pub fn new(engine: Arc<dyn FilterEngine>, blocking: BlockingPolicy) -> Self {
        Self {
            engine,
            blocking,
            rewrite_ttl: 60,
        }
    }

    fn engine_view(&self, ctx: &DnsContext, host: &str, qtype: RecordType) -> FilterRequest {
        FilterRequest {
            host: Arc::from(host),
            qtype,
            client_ip: ctx.client_ip(),
            client_id: Arc::clone(&ctx.client_id),
            settings: ctx.settings.clone(),
        }
    }

    /// Request-time filtering. May write a response (block, rewrite) or
    /// re-aim the question at a canonical name.
    pub async fn filter_request(&self, ctx: &mut DnsContext) {
        let Some((host, qtype)) = ctx.question() else {
            return;
        };

        let view = self.engine_view(ctx, &host, qtype);
        let result = self.engine.filter_request(&view).await;

        if result.is_filtered() {
            debug!(%host, rule = ?result.rule, "request blocked");
            ctx.response = Some(message::blocked(
                &ctx.request,
                self.blocking.mode,
                self.blocking.custom_v4,
                self.blocking.custom_v6,
                self.blocking.ttl,
            ));
            ctx.filter_result = Some(result);
            return;
        }

        if result.is_cname_only_rewrite() {
            self.apply_cname_rewrite(ctx, &result);
            ctx.filter_result = Some(result);
            return;
        }

        if result.is_rewrite() {
            self.apply_answer_rewrite(ctx, &result, qtype);
            ctx.filter_result = Some(result);
            return;
        }

        ctx.filter_result = Some(result);
    }

    /// Swap the question for the rewrite target, keeping the original
    /// around for the response-side restore.
    fn apply_cname_rewrite(&self, ctx: &mut DnsContext, result: &FilterResult) {
        let Some(target) = result.canonical_name.as_deref() else {
            return;
        };
        let Some(target_name) = message::absolute_name(target) else {
            return;
        };
        let Some(query) = ctx.request.queries().first().cloned() else {
            return;
        };

        debug!(from = %query.name(), to = %target_name, "question rewritten");
        ctx.orig_question = Some(query.clone());

        let mut rewritten = query;
        rewritten.set_name(target_name);
        let queries = ctx.request.take_queries();
        debug_assert_eq!(queries.len(), 1);
        ctx.request.add_query(rewritten);
    }

    /// Synthesize the rewrite answer directly.
    fn apply_answer_rewrite(&self, ctx: &mut DnsContext, result: &FilterResult, qtype: RecordType) {
        let Some(query) = ctx.request.queries().first() else {
            return;
        };
        let owner = query.name().clone();

        let mut answers: Vec<Record> = Vec::new();
        let mut address_owner = owner.clone();

        if let Some(target) = result.canonical_name.as_deref() {
            if let Some(target_name) = message::absolute_name(target) {
                answers.push(message::cname_record(
                    owner.clone(),
                    target_name.clone(),
                    self.rewrite_ttl,
                ));
                address_owner = target_name;
            }
        }

        for ip in &result.addresses {
            let matches_qtype = match qtype {
                RecordType::A => ip.is_ipv4(),
                RecordType::AAAA => ip.is_ipv6(),
                _ => false,
            };
            if matches_qtype {
                answers.push(message::address_record(
                    address_owner.clone(),
                    *ip,
                    self.rewrite_ttl,
                ));
            }
        }

        ctx.response = Some(message::with_answers(&ctx.request, answers));
    }

    /// Response-time filtering over the names the answer introduced.
    pub async fn filter_response(&self, ctx: &mut DnsContext) {
        if !ctx.response_from_upstream {
            return;
        }
        let Some((host, qtype)) = ctx.question() else {
            return;
        };
        let Some(response) = &ctx.response else {
            return;
        };

        let answer_hosts = answer_hosts(response);
        if answer_hosts.is_empty() {
            return;
        }

        let view = self.engine_view(ctx, &host, qtype);
        let Some(result) = self.engine.filter_response(&view, &answer_hosts).await else {
            return;
        };

        if result.is_filtered() {
            debug!(%host, rule = ?result.rule, "response blocked");
            let blocked = message::blocked(
                &ctx.request,
                self.blocking.mode,
                self.blocking.custom_v4,
                self.blocking.custom_v6,
                self.blocking.ttl,
            );
            ctx.replace_response(blocked);
            ctx.filter_result = Some(result);
        }
    }

    /// Undo a question rewrite in the outgoing response: restore the
    /// original question and prepend the CNAME hop.
    pub fn restore_rewrite(&self, ctx: &mut DnsContext) {
        let Some(orig_question) = ctx.orig_question.take() else {
            return;
        };
        let Some(response) = ctx.response.as_mut() else {
            ctx.orig_question = Some(orig_question);
            return;
        };

        let rewritten_name = response
            .queries()
            .first()
            .map(|q| q.name().clone());

        response.take_queries();
        response.add_query(orig_question.clone());

        if let Some(target) = rewritten_name {
            if target != *orig_question.name() {
                let hop = message::cname_record(
                    orig_question.name().clone(),
                    target,
                    self.rewrite_ttl,
                );
                let answers = response.take_answers();
                response.add_answer(hop);
                for answer in answers {
                    response.add_answer(answer);
                }
            }
        }

        // The request carries the rewritten question; put the original
        // back for telemetry.
        ctx.request.take_queries();
        ctx.request.add_query(orig_question);
    }
}

/// Names an answer introduces: CNAME targets plus address-record owners.
fn answer_hosts(response: &hickory_proto::op::Message) -> Vec<Arc<str>> {
    let mut hosts = Vec::new();
    for record in response.answers() {
        match record.data() {
            RData::CNAME(cname) => {
                hosts.push(normalized(&cname.0.to_ascii()));
                hosts.push(normalized(&record.name().to_ascii()));
            }
            RData::A(_) | RData::AAAA(_) => {
                hosts.push(normalized(&record.name().to_ascii()));
            }
            _ => {}
        }
    }
    hosts.dedup();
    hosts
}

fn normalized(name: &str) -> Arc<str> {
    let mut name = name.to_ascii_lowercase();
    if name.ends_with('.') {
        name.pop();
    }
    Arc::from(name.as_str())
}
