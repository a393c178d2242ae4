pub mod error;
pub mod features;
pub mod gexf;
pub mod graph;
pub mod identity;
pub mod ingest;

pub use error::IngestError;
pub use features::{Feature, FeatureRegistry, FeatureValues, ratio};
pub use graph::{AggregatedGraph, AttrValue, FlowEdge, FlowGraph, HostNode, Phase};
pub use identity::{HostResolver, IdentityMode, Rejection, ResolvedRequest};
pub use ingest::{
    IngestOptions, IngestOutcome, IngestProgressCallback, IngestStats, Ingestor, execute_ingest,
    generate_ingest_report,
};
