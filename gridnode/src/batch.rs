//! Batched commands routed by a node to its local stores.

use async_trait::async_trait;
use bincode::{Decode, Encode};
use std::fmt;
use thiserror::Error;

use crate::clock::HLC;
use crate::store::StoreId;
use crate::trace::Trace;

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum Request {
    Get { key: Vec<u8> },
    Put { key: Vec<u8>, value: Vec<u8> },
    Increment { key: Vec<u8>, increment: i64 },
}

impl Request {
    pub fn key(&self) -> &[u8] {
        match self {
            Request::Get { key } => key,
            Request::Put { key, .. } => key,
            Request::Increment { key, .. } => key,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Request::Get { .. } => "Get",
            Request::Put { .. } => "Put",
            Request::Increment { .. } => "Increment",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum Response {
    Get {
        value: Option<Vec<u8>>,
        timestamp: Option<HLC>,
    },
    Put,
    Increment {
        new_value: i64,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct BatchHeader {
    /// Sender's clock reading; the receiving node's clock is advanced past it.
    pub timestamp: HLC,
    /// Target store. Zero routes by the key of the first request.
    pub store_id: StoreId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct BatchRequest {
    pub header: BatchHeader,
    pub requests: Vec<Request>,
    pub trace: Option<Trace>,
}

impl BatchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request(mut self, request: Request) -> Self {
        self.requests.push(request);
        self
    }

    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Key the batch is routed by.
    pub fn key(&self) -> Option<&[u8]> {
        self.requests.first().map(Request::key)
    }
}

impl fmt::Display for BatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<&str> = self.requests.iter().map(Request::method).collect();
        write!(f, "[{}]", methods.join(", "))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct BatchResponse {
    pub responses: Vec<Response>,
    pub timestamp: HLC,
    pub error: Option<BatchError>,
    /// Encoded spans recorded while serving a traced request.
    pub collected_spans: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub enum ErrorDetail {
    EmptyBatch,
    StoreNotFound { store_id: StoreId },
    RangeNotFound { key: Vec<u8> },
    RangeKeyMismatch { key: Vec<u8>, store_id: StoreId },
    StoreStopped { store_id: StoreId },
    InvalidValue { key: Vec<u8> },
    Overflow { key: Vec<u8> },
    Engine,
}

impl ErrorDetail {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorDetail::EmptyBatch => "EmptyBatch",
            ErrorDetail::StoreNotFound { .. } => "StoreNotFound",
            ErrorDetail::RangeNotFound { .. } => "RangeNotFound",
            ErrorDetail::RangeKeyMismatch { .. } => "RangeKeyMismatch",
            ErrorDetail::StoreStopped { .. } => "StoreStopped",
            ErrorDetail::InvalidValue { .. } => "InvalidValue",
            ErrorDetail::Overflow { .. } => "Overflow",
            ErrorDetail::Engine => "Engine",
        }
    }
}

/// Structured error returned alongside (never inside) a routed response.
#[derive(Error, Debug, Clone, PartialEq, Eq, Encode, Decode)]
#[error("{message}")]
pub struct BatchError {
    pub message: String,
    pub detail: ErrorDetail,
}

impl BatchError {
    pub fn new(detail: ErrorDetail, message: impl Into<String>) -> Self {
        BatchError {
            message: message.into(),
            detail,
        }
    }
}


/// Executes batches against whatever serves them locally.
#[async_trait]
pub trait Sender: Send + Sync {
    /// A routing failure is returned as `Err`; the `error` field of a
    /// returned response is always `None`.
    async fn send(&self, ba: &BatchRequest) -> Result<BatchResponse, BatchError>;
}
