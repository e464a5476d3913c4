//! Per-request options passed through to the transport.

use serde_json::Value;

/// Consistency level override for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsistencyLevel {
    /// Linearizable reads
    Strong,
    /// Reads lag writes by a bounded window
    BoundedStaleness,
    /// Read-your-writes within a session
    Session,
    /// Reads never see out-of-order writes
    ConsistentPrefix,
    /// No ordering guarantee
    Eventual,
}

impl std::str::FromStr for ConsistencyLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "strong" => Ok(Self::Strong),
            "boundedstaleness" | "bounded_staleness" => Ok(Self::BoundedStaleness),
            "session" => Ok(Self::Session),
            "consistentprefix" | "consistent_prefix" => Ok(Self::ConsistentPrefix),
            "eventual" => Ok(Self::Eventual),
            other => Err(format!("unknown consistency level '{other}'")),
        }
    }
}

/// Options for one request.
///
/// The client never interprets these beyond merging them over its defaults;
/// they reach the transport exactly as given.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// Consistency override
    pub consistency_level: Option<ConsistencyLevel>,
    /// Triggers to run before the operation
    pub pre_triggers: Vec<String>,
    /// Triggers to run after the operation
    pub post_triggers: Vec<String>,
    /// Provisioned throughput for collection creation
    pub offer_throughput: Option<u32>,
    /// Partition key value for document operations
    pub partition_key: Option<Value>,
    /// Explicit session token, overriding the cached one
    pub session_token: Option<String>,
    /// Optimistic concurrency check for replace and delete
    pub if_match_etag: Option<String>,
}

impl RequestOptions {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the consistency override.
    pub fn consistency_level(mut self, level: ConsistencyLevel) -> Self {
        self.consistency_level = Some(level);
        self
    }

    /// Add a pre-trigger.
    pub fn pre_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.pre_triggers.push(trigger.into());
        self
    }

    /// Add a post-trigger.
    pub fn post_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.post_triggers.push(trigger.into());
        self
    }

    /// Set provisioned throughput.
    pub fn offer_throughput(mut self, throughput: u32) -> Self {
        self.offer_throughput = Some(throughput);
        self
    }

    /// Set the partition key.
    pub fn partition_key(mut self, key: impl Into<Value>) -> Self {
        self.partition_key = Some(key.into());
        self
    }

    /// Pin a session token.
    pub fn session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    /// Require the current etag to match.
    pub fn if_match(mut self, etag: impl Into<String>) -> Self {
        self.if_match_etag = Some(etag.into());
        self
    }

    /// Merge these options over `defaults`, with `self` taking precedence.
    pub fn merged_over(self, defaults: &RequestOptions) -> Self {
        Self {
            consistency_level: self.consistency_level.or(defaults.consistency_level),
            pre_triggers: if self.pre_triggers.is_empty() {
                defaults.pre_triggers.clone()
            } else {
                self.pre_triggers
            },
            post_triggers: if self.post_triggers.is_empty() {
                defaults.post_triggers.clone()
            } else {
                self.post_triggers
            },
            offer_throughput: self.offer_throughput.or(defaults.offer_throughput),
            partition_key: self.partition_key.or_else(|| defaults.partition_key.clone()),
            session_token: self.session_token.or_else(|| defaults.session_token.clone()),
            if_match_etag: self.if_match_etag.or_else(|| defaults.if_match_etag.clone()),
        }
    }
}
