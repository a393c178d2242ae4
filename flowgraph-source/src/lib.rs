pub mod error;
pub mod reader;
pub mod record;

pub use error::SourceError;
pub use reader::{BatchEvent, BatchReader, BatchStream, BatchSummary, read_batch};
pub use record::{Header, HttpRequest, HttpResponse, Label, RequestRecord};
