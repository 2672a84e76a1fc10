//! Public types for the Abridge API.

mod mindmap;
mod request;
mod result;

pub use mindmap::MindmapNode;
pub use request::{GenerationRequest, OperationKind};
pub use result::{
    AttemptOutcome, AttemptRecord, Generation, MindmapResult, Payload, SummaryResult,
};
