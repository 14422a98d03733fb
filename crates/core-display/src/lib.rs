//! Pipeline terminators: display objects and the main executor.
//!
//! A display object is a node whose `apply` bridges the compute pipeline
//! to the single-threaded rendering surface. Stage 1
//! (`DisplayRenderer::prepare`) runs on the node's worker and turns
//! payloads into render-ready form (color mapping, resampling,
//! windowing); stage 2 (`DisplayRenderer::display`) runs on the
//! [`MainExecutor`] and performs only the payload swap the paint pass
//! reads. Nothing is shared between the stages beyond the prepared
//! payload, and the executor stage always observes a complete object.

pub mod display;
pub mod executor;

pub use display::{
    DisplayCurve, DisplayFormat, DisplayImage, DisplayObject, DisplayRenderer,
};
pub use executor::MainExecutor;
