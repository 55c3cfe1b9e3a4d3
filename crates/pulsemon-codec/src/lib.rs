pub mod compress;
pub mod crypt;
pub mod pipeline;
pub mod sign;

pub use pipeline::{Pipeline, PipelineContext, Stage};
