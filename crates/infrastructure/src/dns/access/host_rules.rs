//! Compiled host-pattern engine for the access manager's blocked hosts.
//!
//! Supported pattern forms:
//! - `example.org` — exact name;
//! - `*.example.org` — any subdomain (not the parent itself);
//! - either form with a `$dnstype=HTTPS` suffix restricting the rule to
//!   one question type.
//!
//! Wildcards are stored as reversed label paths in a suffix trie, so a
//! lookup walks at most `labels(domain)` nodes.

use bastion_dns_domain::{ForwardError, RecordType};
use compact_str::CompactString;
use rustc_hash::FxBuildHasher;
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct HostRule {
    /// Original pattern text, reported back on matches.
    text: Arc<str>,
    /// `None` matches every question type.
    qtype: Option<RecordType>,
}

impl HostRule {
    fn applies_to(&self, qtype: RecordType) -> bool {
        self.qtype.is_none() || self.qtype == Some(qtype)
    }
}

type RuleList = SmallVec<[HostRule; 1]>;

#[derive(Default)]
struct TrieNode {
    children: HashMap<CompactString, TrieNode, FxBuildHasher>,
    /// Wildcard rules terminating at this node. `*.ads.example` stores
    /// its rules at the "ads" node after traversing "example".
    wildcard_rules: RuleList,
}

/// Compiled blocked-host rule set.
#[derive(Default)]
pub struct HostRuleSet {
    exact: HashMap<CompactString, RuleList, FxBuildHasher>,
    wildcard_root: TrieNode,
    len: usize,
}

impl HostRuleSet {
    pub fn compile(patterns: &[String]) -> Result<Self, ForwardError> {
        let mut set = Self::default();
        for pattern in patterns {
            set.insert(pattern)?;
        }
        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }

    fn insert(&mut self, pattern: &str) -> Result<(), ForwardError> {
        let text: Arc<str> = Arc::from(pattern);
        let mut body = pattern.trim().to_ascii_lowercase();
        if body.is_empty() {
            return Err(ForwardError::Config("empty blocked-host pattern".into()));
        }

        let qtype = match body.split_once("$dnstype=") {
            Some((head, tail)) => {
                let qtype = RecordType::from_name(tail).ok_or_else(|| {
                    ForwardError::Config(format!("unknown dnstype in rule {pattern:?}"))
                })?;
                body = head.to_string();
                Some(qtype)
            }
            None => None,
        };

        let rule = HostRule { text, qtype };

        if let Some(domain) = body.strip_prefix("*.") {
            if domain.is_empty() {
                return Err(ForwardError::Config(format!(
                    "wildcard without a domain: {pattern:?}"
                )));
            }
            let mut node = &mut self.wildcard_root;
            for label in domain.split('.').rev() {
                node = node.children.entry(CompactString::new(label)).or_default();
            }
            node.wildcard_rules.push(rule);
        } else {
            self.exact
                .entry(CompactString::new(&body))
                .or_default()
                .push(rule);
        }

        self.len += 1;
        Ok(())
    }

    /// Rule text of the first rule matching (domain, qtype), if any.
    /// `domain` must already be lower-cased, without a trailing dot.
    pub fn match_host(&self, domain: &str, qtype: RecordType) -> Option<Arc<str>> {
        if let Some(rules) = self.exact.get(domain) {
            if let Some(rule) = rules.iter().find(|r| r.applies_to(qtype)) {
                return Some(Arc::clone(&rule.text));
            }
        }

        let labels: SmallVec<[&str; 8]> = domain.split('.').rev().collect();
        let n = labels.len();
        let mut node = &self.wildcard_root;
        for (i, label) in labels.iter().enumerate() {
            match node.children.get(*label) {
                Some(child) => {
                    // A wildcard needs at least one more label below the
                    // node: `*.ads.example` matches `x.ads.example`, not
                    // `ads.example` itself.
                    if i + 1 < n {
                        if let Some(rule) =
                            child.wildcard_rules.iter().find(|r| r.applies_to(qtype))
                        {
                            return Some(Arc::clone(&rule.text));
                        }
                    }
                    node = child;
                }
                None => break,
            }
        }

        None
    }
}
