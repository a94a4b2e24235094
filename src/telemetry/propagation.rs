// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 checkflow contributors

//! Carrier formats

use super::{SpanCarrier, SpanContext, TraceContext};

const TRACEPARENT: &str = "traceparent";
const TRACESTATE: &str = "tracestate";

/// Serializes a trace context to and from key/value pairs
pub trait Propagator: Send + Sync {
    /// Write the context's active span, if any, into `carrier`
    fn inject(&self, context: &TraceContext, carrier: &mut SpanCarrier);

    /// Read a context back out of `carrier`
    fn extract(&self, carrier: &SpanCarrier) -> TraceContext;
}

/// W3C Trace Context (`traceparent` / `tracestate` headers)
#[derive(Debug, Clone, Copy, Default)]
pub struct W3cTraceContext;

impl Propagator for W3cTraceContext {
    fn inject(&self, context: &TraceContext, carrier: &mut SpanCarrier) {
        let Some(span) = context.span() else {
            return;
        };

        let flags = if span.sampled { "01" } else { "00" };
        carrier.set(
            TRACEPARENT,
            format!("00-{}-{}-{}", span.trace_id_hex(), span.span_id_hex(), flags),
        );

        if let Some(ref state) = span.trace_state {
            if !state.is_empty() {
                carrier.set(TRACESTATE, state.clone());
            }
        }
    }

    fn extract(&self, carrier: &SpanCarrier) -> TraceContext {
        let Some(traceparent) = carrier.get(TRACEPARENT) else {
            return TraceContext::none();
        };

        match parse_traceparent(traceparent) {
            Some(mut span) => {
                span.trace_state = carrier.get(TRACESTATE).map(str::to_string);
                TraceContext::with_span(span)
            }
            None => {
                tracing::debug!(traceparent, "ignoring malformed traceparent");
                TraceContext::none()
            }
        }
    }
}

fn parse_traceparent(value: &str) -> Option<SpanContext> {
    let mut parts = value.split('-');
    let version = parts.next()?;
    let trace_id = parts.next()?;
    let span_id = parts.next()?;
    let flags = parts.next()?;

    if version != "00" || parts.next().is_some() {
        return None;
    }
    if trace_id.len() != 32 || span_id.len() != 16 || flags.len() != 2 {
        return None;
    }
    // from_str_radix alone would also take uppercase digits and a leading '+'
    if ![trace_id, span_id, flags].iter().all(|field| is_lower_hex(field)) {
        return None;
    }

    let span = SpanContext {
        trace_id: u128::from_str_radix(trace_id, 16).ok()?,
        span_id: u64::from_str_radix(span_id, 16).ok()?,
        sampled: u8::from_str_radix(flags, 16).ok()? & 0x01 == 0x01,
        trace_state: None,
    };

    span.is_valid().then_some(span)
}

fn is_lower_hex(field: &str) -> bool {
    field.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
