//! Result types returned by the generation client.

use std::mem::size_of;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::MindmapNode;
use crate::error::ErrorKind;

/// Generated summary text plus usage of the call that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub text: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_ms: u64,
}

/// Validated mindmap tree plus usage of the call that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MindmapResult {
    pub root: MindmapNode,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub latency_ms: u64,
}

/// A cacheable generation payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Summary(SummaryResult),
    Mindmap(MindmapResult),
}

impl Payload {
    /// Approximate heap + inline footprint, used for cache capacity accounting.
    pub fn size_bytes(&self) -> usize {
        match self {
            Payload::Summary(s) => size_of::<SummaryResult>() + s.text.len(),
            Payload::Mindmap(m) => size_of::<MindmapResult>() + node_bytes(&m.root),
        }
    }
}

fn node_bytes(node: &MindmapNode) -> usize {
    size_of::<MindmapNode>()
        + node.title.len()
        + node.children.iter().map(node_bytes).sum::<usize>()
}

/// How one remote-call attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    RetryableFailure,
    FatalFailure,
}

/// One attempt inside a logical request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-indexed.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub error_kind: Option<ErrorKind>,
    pub latency: Duration,
}

/// Successful output of a logical request.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation<T> {
    pub output: T,
    /// Empty when served from cache.
    pub attempts: Vec<AttemptRecord>,
    pub cached: bool,
}

impl<T> Generation<T> {
    pub(crate) fn cached(output: T) -> Self {
        Self {
            output,
            attempts: Vec::new(),
            cached: true,
        }
    }

    /// Unwrap the generated artifact, discarding attempt history.
    pub fn into_output(self) -> T {
        self.output
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Generation<U> {
        Generation {
            output: f(self.output),
            attempts: self.attempts,
            cached: self.cached,
        }
    }
}
