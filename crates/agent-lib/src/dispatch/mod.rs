//! Delivery of scaling signals to the decision endpoint
//!
//! This module provides:
//! - an HTTP dispatcher posting signals as JSON
//! - a bounded dispatch queue with capped concurrency and a drop policy

mod client;
mod queue;

pub use client::{HttpDispatcher, DEFAULT_ENDPOINT, STATS_PATH};
pub use queue::{
    DispatchHandle, DispatchQueue, DispatchQueueConfig, DispatchStats, MAX_CAPACITY,
    MAX_CONCURRENCY,
};

use crate::error::DispatchError;
use crate::models::ScalingSignal;
use async_trait::async_trait;

/// Destination for scaling signals
#[async_trait]
pub trait SignalSink: Send + Sync {
    /// Deliver one signal, once
    async fn dispatch(&self, signal: &ScalingSignal) -> Result<(), DispatchError>;
}
