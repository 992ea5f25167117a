//! Parameter hand-off and block rendering.
//!
//! [`params::ParamStore`] is the only state shared between the control thread
//! and the producer thread. [`pipeline::SamplePipeline`] turns a snapshot of
//! it into blocks of 16-bit samples.

pub mod params;
pub mod pipeline;

pub use params::{ParamSnapshot, ParamStore};
pub use pipeline::SamplePipeline;
