//! Agent-side metric sampling.
//!
//! A sampler probes its source on every poll tick and rebuilds its private
//! sample store from scratch; the agent core snapshots the store on every
//! report tick.

pub mod runtime;
pub mod store;
pub mod system;

use async_trait::async_trait;
use pulsemon_common::error::MetricsError;
use store::SampleStore;

#[async_trait]
pub trait Sampler: Send {
    fn name(&self) -> &'static str;
    /// Refreshes the sample store with a new observation cycle. Probes that
    /// measure over a time window wait with the runtime's timer rather than
    /// blocking the thread.
    async fn sample(&mut self) -> Result<(), MetricsError>;
    fn store(&self) -> &SampleStore;
}
