// ─────────────────────────────────────────────────────────────────────
// X-108 Gate — Transparency Feed Interface
// ─────────────────────────────────────────────────────────────────────
//! Publication collaborator for gate decisions.
//!
//! Every decision, ACT or HOLD, may be published to a public feed for
//! audit. The record is built from `GateDecision` alone. The in-memory
//! feed keeps posts and counters for demos and tests; production
//! deployments put a social-feed client behind `DecisionPublisher`.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use x108_types::{GateDecision, GateResult};

/// Audit record handed to a publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationRecord {
    /// `"ALLOW"` or `"BLOCK"`.
    pub status: String,
    pub amount: f64,
    pub recipient: String,
    pub coherence: f64,
    pub temporal_passed: bool,
    /// Evaluation time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Human-readable gate reason.
    pub reason: String,
}

impl PublicationRecord {
    /// Build the record from a decision's details without re-deriving
    /// anything. A temporal check that was never reached is reported as
    /// not passed.
    pub fn from_decision(decision: &GateDecision) -> Self {
        let d = decision.details();
        Self {
            status: if decision.allow() { "ALLOW" } else { "BLOCK" }.to_string(),
            amount: d.amount.unwrap_or(0.0),
            recipient: d.recipient.clone().unwrap_or_else(|| "unknown".to_string()),
            coherence: d.coherence_score.unwrap_or(0.0),
            temporal_passed: d.temporal_passed.unwrap_or(false),
            timestamp: d.evaluated_at.unwrap_or(0.0),
            reason: decision.reason().to_string(),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.status == "ALLOW"
    }

    /// Feed message body.
    pub fn message(&self) -> String {
        let verdict = if self.is_allowed() { "ALLOWED" } else { "BLOCKED" };
        let temporal = if self.temporal_passed { "passed" } else { "failed" };
        let mut msg = format!(
            "X-108 Safety Gate: Payment {verdict}\n\n\
             Amount: {} USDC\n\
             Coherence Score: {:.2}\n\
             Temporal Check: {temporal}\n\n",
            self.amount, self.coherence
        );
        if self.is_allowed() {
            msg.push_str("This payment survived the mandatory HOLD and passed all safety checks.");
        } else {
            msg.push_str(&format!(
                "This payment was blocked by the Safety Gate ({}).",
                self.reason
            ));
        }
        msg
    }
}

/// Acknowledgement from a publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub post_id: u64,
    pub url: String,
}

/// Trait for publication backends.
pub trait DecisionPublisher: Send + Sync {
    fn publish(&self, record: &PublicationRecord) -> GateResult<PublishReceipt>;
}

/// Post counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStats {
    pub total_posts: u64,
    pub allowed_posts: u64,
    pub blocked_posts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPost {
    pub id: u64,
    pub url: String,
    pub record: PublicationRecord,
    pub message: String,
}

#[derive(Default)]
struct FeedInner {
    posts: VecDeque<FeedPost>,
    stats: FeedStats,
}

/// In-memory feed for demos and tests.
///
/// Keeps the most recent `retain` posts; the counters cover every post
/// ever published. Posts and counters share one `parking_lot::Mutex`.
pub struct InMemoryFeed {
    base_url: String,
    retain: usize,
    inner: Mutex<FeedInner>,
}

impl Default for InMemoryFeed {
    fn default() -> Self {
        Self::new("https://moltbook.com/posts")
    }
}

impl InMemoryFeed {
    pub const DEFAULT_RETAIN: usize = 1_000;

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            retain: Self::DEFAULT_RETAIN,
            inner: Mutex::new(FeedInner::default()),
        }
    }

    /// Keep at most `retain` posts (at least one).
    pub fn with_retention(mut self, retain: usize) -> Self {
        self.retain = retain.max(1);
        self
    }

    pub fn stats(&self) -> FeedStats {
        self.inner.lock().stats
    }

    /// The last `limit` posts, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<FeedPost> {
        let inner = self.inner.lock();
        let start = inner.posts.len().saturating_sub(limit);
        inner.posts.iter().skip(start).cloned().collect()
    }
}

impl DecisionPublisher for InMemoryFeed {
    fn publish(&self, record: &PublicationRecord) -> GateResult<PublishReceipt> {
        let mut inner = self.inner.lock();
        let id = inner.stats.total_posts + 1;
        let url = format!("{}/{id}", self.base_url.trim_end_matches('/'));
        if inner.posts.len() >= self.retain {
            inner.posts.pop_front();
        }
        inner.posts.push_back(FeedPost {
            id,
            url: url.clone(),
            record: record.clone(),
            message: record.message(),
        });
        inner.stats.total_posts += 1;
        if record.is_allowed() {
            inner.stats.allowed_posts += 1;
        } else {
            inner.stats.blocked_posts += 1;
        }
        log::debug!("published decision {} as post {id}", record.status);
        Ok(PublishReceipt { post_id: id, url })
    }
}

/// External publisher that calls a function pointer.
///
/// Used by the PyO3 FFI layer to delegate publication to Python.
type PublishFn = Box<dyn Fn(&PublicationRecord) -> GateResult<PublishReceipt> + Send + Sync>;

pub struct ExternalPublisher {
    publish_fn: PublishFn,
}

impl ExternalPublisher {
    pub fn new(
        publish_fn: impl Fn(&PublicationRecord) -> GateResult<PublishReceipt> + Send + Sync + 'static,
    ) -> Self {
        Self {
            publish_fn: Box::new(publish_fn),
        }
    }
}

impl DecisionPublisher for ExternalPublisher {
    fn publish(&self, record: &PublicationRecord) -> GateResult<PublishReceipt> {
        (self.publish_fn)(record)
    }
}
