pub mod pipeline;

pub use pipeline::{IngestError, IngestPipeline, IngestReport, UploadedFile};
