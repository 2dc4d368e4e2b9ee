//! Minimal distributed tracing carried on batch requests.
//!
//! A client attaches a [`Trace`] (binary span context plus baggage) to a
//! request. The node joins that trace with a fresh child span, records log
//! events while serving the call and hands the finished span back, encoded,
//! in the response's `collected_spans`.

use bincode::{Decode, Encode};
use std::collections::BTreeMap;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

use crate::clock::now_millis;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    #[error("failed to decode span context: {0}")]
    DecodeContext(String),
    #[error("failed to encode span: {0}")]
    Encode(String),
    #[error("failed to decode span: {0}")]
    DecodeSpan(String),
}

/// Trace information attached to an inbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct Trace {
    /// Encoded [`SpanContext`] of the caller's span.
    pub context: Vec<u8>,
    pub attributes: BTreeMap<String, String>,
}

impl Trace {
    pub fn new(context: &SpanContext, attributes: BTreeMap<String, String>) -> Result<Self, TraceError> {
        let context = bincode::encode_to_vec(context, bincode::config::standard())
            .map_err(|e| TraceError::Encode(e.to_string()))?;
        Ok(Trace {
            context,
            attributes,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct SpanContext {
    pub trace_id: u128,
    pub span_id: u64,
}

impl SpanContext {
    /// Root context of a brand new trace.
    pub fn new_root() -> Self {
        SpanContext {
            trace_id: Uuid::new_v4().as_u128(),
            span_id: new_span_id(),
        }
    }
}

fn new_span_id() -> u64 {
    Uuid::new_v4().as_u64_pair().0
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct LogRecord {
    pub timestamp_millis: u64,
    pub event: String,
}

/// A finished span as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct RawSpan {
    pub trace_id: u128,
    pub span_id: u64,
    pub parent_span_id: u64,
    pub operation: String,
    pub start_millis: u64,
    pub duration_micros: u64,
    pub attributes: BTreeMap<String, String>,
    pub logs: Vec<LogRecord>,
}

#[derive(Debug)]
pub struct RecordingSpan {
    raw: RawSpan,
    started: Instant,
}

#[derive(Debug)]
pub enum Span {
    Noop,
    Recording(RecordingSpan),
}

impl Span {
    pub fn is_noop(&self) -> bool {
        matches!(self, Span::Noop)
    }

    pub fn log_event(&mut self, event: impl Into<String>) {
        if let Span::Recording(span) = self {
            span.raw.logs.push(LogRecord {
                timestamp_millis: now_millis(),
                event: event.into(),
            });
        }
    }

    /// Ends the span. Returns the recorded span, or `None` for a no-op span.
    pub fn finish(self) -> Option<RawSpan> {
        match self {
            Span::Noop => None,
            Span::Recording(mut span) => {
                span.raw.duration_micros = span.started.elapsed().as_micros() as u64;
                Some(span.raw)
            }
        }
    }
}

/// Creates spans joined to a caller's trace.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tracer;

impl Tracer {
    pub fn join_trace_from_binary(&self, operation: &str, trace: &Trace) -> Result<Span, TraceError> {
        let (parent, _): (SpanContext, usize) =
            bincode::decode_from_slice(&trace.context, bincode::config::standard())
                .map_err(|e| TraceError::DecodeContext(e.to_string()))?;
        Ok(Span::Recording(RecordingSpan {
            raw: RawSpan {
                trace_id: parent.trace_id,
                span_id: new_span_id(),
                parent_span_id: parent.span_id,
                operation: operation.to_string(),
                start_millis: now_millis(),
                duration_micros: 0,
                attributes: trace.attributes.clone(),
                logs: vec![],
            },
            started: Instant::now(),
        }))
    }
}

pub fn encode_raw_span(span: &RawSpan) -> Result<Vec<u8>, TraceError> {
    bincode::encode_to_vec(span, bincode::config::standard())
        .map_err(|e| TraceError::Encode(e.to_string()))
}

pub fn decode_raw_span(bytes: &[u8]) -> Result<RawSpan, TraceError> {
    bincode::decode_from_slice(bytes, bincode::config::standard())
        .map(|(span, _)| span)
        .map_err(|e| TraceError::DecodeSpan(e.to_string()))
}
