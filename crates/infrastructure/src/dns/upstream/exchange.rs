//! Exchange strategies over an upstream set.

use bastion_dns_application::ports::UpstreamResolver;
use bastion_dns_domain::{ForwardError, UpstreamMode};
use bytes::Bytes;
use futures::future::{join_all, select_ok, FutureExt};
use hickory_proto::op::Message;
use hickory_proto::rr::RData;
use rustc_hash::FxHashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, warn};

/// TCP port probed by the fastest-address race.
const PROBE_PORT: u16 = 80;

#[derive(Debug, Clone)]
pub struct ExchangeOutcome {
    pub response: Message,
    pub upstream_addr: Arc<str>,
    pub elapsed: Duration,
}

pub struct UpstreamExchanger {
    mode: UpstreamMode,
    timeout: Duration,
    fastest_ping_timeout: Duration,
    /// Last observed round-trip per upstream, feeding the load-balance
    /// ordering.
    rtt: Mutex<FxHashMap<Arc<str>, Duration>>,
}

impl UpstreamExchanger {
    pub fn new(mode: UpstreamMode, timeout: Duration, fastest_ping_timeout: Duration) -> Self {
        Self {
            mode,
            timeout,
            fastest_ping_timeout,
            rtt: Mutex::new(FxHashMap::default()),
        }
    }

    /// Exchange `request` with the given set according to the configured
    /// strategy.
    pub async fn exchange(
        &self,
        upstreams: &[Arc<dyn UpstreamResolver>],
        request: &Message,
    ) -> Result<ExchangeOutcome, ForwardError> {
        self.exchange_with_deadline(upstreams, request, None).await
    }

    /// Like [`exchange`](Self::exchange), with the per-upstream timeout
    /// clamped to the request's remaining ambient deadline.
    pub async fn exchange_with_deadline(
        &self,
        upstreams: &[Arc<dyn UpstreamResolver>],
        request: &Message,
        deadline: Option<Instant>,
    ) -> Result<ExchangeOutcome, ForwardError> {
        if upstreams.is_empty() {
            return Err(ForwardError::NoUpstreams);
        }

        let timeout = match deadline {
            Some(deadline) => self
                .timeout
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.timeout,
        };

        let payload = Bytes::from(
            request
                .to_vec()
                .map_err(|e| ForwardError::BadRequest(e.to_string()))?,
        );

        match self.mode {
            UpstreamMode::LoadBalance => self.load_balance(upstreams, payload, timeout).await,
            UpstreamMode::Parallel => self.parallel(upstreams, payload, timeout).await,
            UpstreamMode::FastestAddr => self.fastest_addr(upstreams, payload, timeout).await,
        }
    }

    async fn exchange_one(
        &self,
        upstream: &Arc<dyn UpstreamResolver>,
        payload: Bytes,
        timeout: Duration,
    ) -> Result<ExchangeOutcome, ForwardError> {
        let started = Instant::now();
        let address: Arc<str> = Arc::from(upstream.address());

        let bytes = tokio::time::timeout(timeout, upstream.exchange(payload))
            .await
            .map_err(|_| ForwardError::UpstreamTimeout {
                server: address.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })??;

        let response = Message::from_vec(&bytes).map_err(|e| ForwardError::Upstream {
            server: address.to_string(),
            reason: format!("bad response: {e}"),
        })?;

        let elapsed = started.elapsed();
        self.rtt
            .lock()
            .expect("rtt table poisoned")
            .insert(Arc::clone(&address), elapsed);

        Ok(ExchangeOutcome {
            response,
            upstream_addr: address,
            elapsed,
        })
    }

    /// Try servers one at a time, fastest recent responder first; ties
    /// (and never-seen servers) in random order.
    async fn load_balance(
        &self,
        upstreams: &[Arc<dyn UpstreamResolver>],
        payload: Bytes,
        timeout: Duration,
    ) -> Result<ExchangeOutcome, ForwardError> {
        let mut order: Vec<usize> = (0..upstreams.len()).collect();
        fastrand::shuffle(&mut order);
        {
            let rtt = self.rtt.lock().expect("rtt table poisoned");
            order.sort_by_key(|&i| {
                rtt.get(upstreams[i].address())
                    .copied()
                    .unwrap_or(Duration::ZERO)
            });
        }

        let mut last_err = ForwardError::NoUpstreams;
        for i in order {
            match self.exchange_one(&upstreams[i], payload.clone(), timeout).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) => {
                    debug!(upstream = upstreams[i].address(), error = %e, "upstream failed, trying next");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Race every server; the first useful answer wins.
    async fn parallel(
        &self,
        upstreams: &[Arc<dyn UpstreamResolver>],
        payload: Bytes,
        timeout: Duration,
    ) -> Result<ExchangeOutcome, ForwardError> {
        let races = upstreams
            .iter()
            .map(|u| self.exchange_one(u, payload.clone(), timeout).boxed());
        match select_ok(races).await {
            Ok((outcome, _rest)) => Ok(outcome),
            Err(e) => Err(e),
        }
    }

    /// Race every server, then prefer the answer whose address answers a
    /// TCP probe first, bounded by the ping timeout.
    async fn fastest_addr(
        &self,
        upstreams: &[Arc<dyn UpstreamResolver>],
        payload: Bytes,
        timeout: Duration,
    ) -> Result<ExchangeOutcome, ForwardError> {
        let results = join_all(
            upstreams
                .iter()
                .map(|u| self.exchange_one(u, payload.clone(), timeout)),
        )
        .await;

        let mut outcomes = Vec::new();
        let mut last_err = ForwardError::NoUpstreams;
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => last_err = e,
            }
        }
        if outcomes.is_empty() {
            return Err(last_err);
        }
        if outcomes.len() == 1 {
            return Ok(outcomes.into_iter().next().expect("one outcome"));
        }

        let mut candidates: Vec<(usize, IpAddr)> = Vec::new();
        for (i, outcome) in outcomes.iter().enumerate() {
            for record in outcome.response.answers() {
                match record.data() {
                    RData::A(a) => candidates.push((i, IpAddr::V4(a.0))),
                    RData::AAAA(aaaa) => candidates.push((i, IpAddr::V6(aaaa.0))),
                    _ => {}
                }
            }
        }
        if candidates.is_empty() {
            return Ok(outcomes.into_iter().next().expect("outcome"));
        }

        let probes = candidates
            .iter()
            .map(|&(i, ip)| probe(ip, i).boxed())
            .collect::<Vec<_>>();
        let winner = match tokio::time::timeout(self.fastest_ping_timeout, select_ok(probes)).await
        {
            Ok(Ok((i, _rest))) => i,
            Ok(Err(e)) => {
                debug!(error = %e, "no probed address reachable, keeping first answer");
                0
            }
            Err(_) => {
                debug!("address race timed out, keeping first answer");
                0
            }
        };

        Ok(outcomes
            .into_iter()
            .nth(winner)
            .expect("winner index in range"))
    }
}

async fn probe(ip: IpAddr, index: usize) -> Result<usize, ForwardError> {
    match TcpStream::connect(SocketAddr::new(ip, PROBE_PORT)).await {
        Ok(_) => Ok(index),
        Err(e) => {
            warn!(%ip, error = %e, "address probe failed");
            Err(ForwardError::Io(e.to_string()))
        }
    }
}
