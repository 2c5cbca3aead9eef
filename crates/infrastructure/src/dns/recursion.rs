//! Recursion loop detection.
//!
//! When private-RDNS forwarding is enabled the server can end up
//! forwarding a PTR question to itself through the router. A short-lived
//! fingerprint cache of recently forwarded questions breaks the loop:
//! a question whose fingerprint is already cached is answered NXDOMAIN
//! instead of being forwarded again.

use hickory_proto::op::Message;
use lru::LruCache;
use rustc_hash::FxBuildHasher;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Big-endian id ‖ big-endian qtype ‖ lower-cased name bytes, padded to
/// the maximum domain-name length. Total and stable.
const FINGERPRINT_LEN: usize = 2 + 2 + 255;

type Fingerprint = [u8; FINGERPRINT_LEN];

pub const DEFAULT_CAPACITY: usize = 1000;
pub const DEFAULT_TTL: Duration = Duration::from_secs(1);

pub struct RecursionDetector {
    entries: Mutex<LruCache<Fingerprint, Instant, FxBuildHasher>>,
    ttl: Duration,
}

impl RecursionDetector {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            entries: Mutex::new(LruCache::with_hasher(capacity, FxBuildHasher)),
            ttl,
        }
    }

    /// True iff the message's fingerprint was added within the TTL.
    pub fn check(&self, msg: &Message) -> bool {
        let Some(fp) = fingerprint(msg) else {
            return false;
        };
        let mut entries = self.entries.lock().expect("recursion cache poisoned");
        match entries.get(&fp) {
            Some(expiry) if Instant::now() < *expiry => true,
            Some(_) => {
                entries.pop(&fp);
                false
            }
            None => false,
        }
    }

    /// Remember the message for the TTL. Messages without a question are
    /// a no-op.
    pub fn add(&self, msg: &Message) {
        let Some(fp) = fingerprint(msg) else {
            return;
        };
        let expiry = Instant::now() + self.ttl;
        self.entries
            .lock()
            .expect("recursion cache poisoned")
            .put(fp, expiry);
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .expect("recursion cache poisoned")
            .clear();
    }
}

impl Default for RecursionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

fn fingerprint(msg: &Message) -> Option<Fingerprint> {
    let query = msg.queries().first()?;

    let mut fp = [0u8; FINGERPRINT_LEN];
    fp[0..2].copy_from_slice(&msg.id().to_be_bytes());
    fp[2..4].copy_from_slice(&u16::from(query.query_type()).to_be_bytes());

    let name = query.name().to_ascii().to_ascii_lowercase();
    let bytes = name.as_bytes();
    let n = bytes.len().min(FINGERPRINT_LEN - 4);
    fp[4..4 + n].copy_from_slice(&bytes[..n]);

    Some(fp)
}
