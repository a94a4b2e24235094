// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Trace context propagation
//!
//! Builds outlive the request that created them, so the active span is
//! serialized onto the build as plain key/value pairs. The execution engine
//! extracts it later to parent its own spans. Nothing here depends on a
//! particular tracing backend.

mod propagation;

pub use propagation::{Propagator, W3cTraceContext};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identity of one span within a distributed trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanContext {
    /// 128-bit trace identifier, non-zero when valid
    pub trace_id: u128,
    /// 64-bit span identifier, non-zero when valid
    pub span_id: u64,
    pub sampled: bool,
    /// Vendor-specific `tracestate` entries, passed through untouched
    pub trace_state: Option<String>,
}

impl SpanContext {
    pub fn new(trace_id: u128, span_id: u64) -> Self {
        Self {
            trace_id,
            span_id,
            sampled: true,
            trace_state: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.trace_id != 0 && self.span_id != 0
    }

    /// Trace ID as 32 lowercase hex digits
    pub fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.trace_id)
    }

    /// Span ID as 16 lowercase hex digits
    pub fn span_id_hex(&self) -> String {
        format!("{:016x}", self.span_id)
    }
}

/// The caller's context: an active span, or none
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceContext {
    span: Option<SpanContext>,
}

impl TraceContext {
    /// A context without an active span
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_span(span: SpanContext) -> Self {
        Self { span: Some(span) }
    }

    /// The active span, if it is valid
    pub fn span(&self) -> Option<&SpanContext> {
        self.span.as_ref().filter(|s| s.is_valid())
    }
}

/// Serialized trace context attached to a persisted entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpanCarrier(BTreeMap<String, String>);

impl SpanCarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_span_is_not_active() {
        assert!(TraceContext::with_span(SpanContext::new(0, 1)).span().is_none());
        assert!(TraceContext::with_span(SpanContext::new(1, 0)).span().is_none());
        assert!(TraceContext::with_span(SpanContext::new(1, 1)).span().is_some());
        assert!(TraceContext::none().span().is_none());
    }

    #[test]
    fn test_hex_ids_are_zero_padded() {
        let span = SpanContext::new(0xabc, 0x12);
        assert_eq!(span.trace_id_hex(), "00000000000000000000000000000abc");
        assert_eq!(span.span_id_hex(), "0000000000000012");
    }
}
