pub mod pipeline;

pub use pipeline::{RetrievalConfig, SearchHit, SearchPipeline};
