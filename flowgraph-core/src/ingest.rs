use crate::error::Result;
use crate::features::{FeatureRegistry, INDEGREE};
use crate::graph::{AggregatedGraph, FlowGraph};
use crate::identity::{HostResolver, IdentityMode, Rejection};
use colored::Colorize;
use flowgraph_source::{BatchEvent, BatchReader, BatchSummary, RequestRecord};
use indicatif::{ProgressBar, ProgressStyle};
use petgraph::graph::EdgeIndex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, trace};

/// Options for configuring an ingestion run
pub struct IngestOptions {
    pub reader: BatchReader,
    pub identity: IdentityMode,
    pub include_first_party: bool,
    pub show_progress: bool,
}

/// Callback for reporting ingestion progress
pub type IngestProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub batches: usize,
    pub records: usize,
    pub accepted: usize,
    pub malformed: usize,
    pub rejected: BTreeMap<Rejection, usize>,
}

impl IngestStats {
    pub fn rejected(&self, reason: Rejection) -> usize {
        self.rejected.get(&reason).copied().unwrap_or(0)
    }

    pub fn rejected_total(&self) -> usize {
        self.rejected.values().sum()
    }
}

/// Single writer folding records into one graph.
pub struct Ingestor {
    resolver: HostResolver,
    graph: FlowGraph,
    stats: IngestStats,
}

impl Ingestor {
    pub fn new(resolver: HostResolver, registry: FeatureRegistry) -> Self {
        Self {
            resolver,
            graph: FlowGraph::new(registry),
            stats: IngestStats::default(),
        }
    }

    /// Resolve one record and fold it into the graph, or report why it was
    /// skipped.
    pub fn ingest(&mut self, record: &RequestRecord) -> std::result::Result<EdgeIndex, Rejection> {
        self.stats.records += 1;

        let outcome = self
            .resolver
            .resolve(record)
            .and_then(|resolved| self.graph.add_edge(&resolved).ok_or(Rejection::SelfLoop));

        match outcome {
            Ok(_) => self.stats.accepted += 1,
            Err(reason) => {
                trace!("Skipping record ({}): {:?}", reason, record.target_url());
                *self.stats.rejected.entry(reason).or_default() += 1;
            }
        }

        outcome
    }

    pub fn finish_batch(&mut self, summary: &BatchSummary) {
        self.stats.batches += 1;
        self.stats.malformed += summary.malformed;
    }

    pub fn graph(&self) -> &FlowGraph {
        &self.graph
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    /// End ingestion and run node aggregation.
    pub fn finish(self) -> IngestOutcome {
        info!(
            "Ingested {} of {} record(s) into {} node(s), {} edge(s)",
            self.stats.accepted,
            self.stats.records,
            self.graph.node_count(),
            self.graph.edge_count()
        );

        IngestOutcome {
            graph: self.graph.aggregate(),
            stats: self.stats,
        }
    }
}

#[derive(Debug)]
pub struct IngestOutcome {
    pub graph: AggregatedGraph,
    pub stats: IngestStats,
}

/// Read every batch in order, fold each record into the graph and
/// aggregate once the last batch is exhausted.
pub async fn execute_ingest(
    options: IngestOptions,
    progress_callback: Option<IngestProgressCallback>,
) -> Result<IngestOutcome> {
    let IngestOptions {
        reader,
        identity,
        include_first_party,
        show_progress,
    } = options;

    let progress_bar = if show_progress {
        let pb = ProgressBar::new(reader.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} batches {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb.set_message("starting...");
        Some(pb)
    } else {
        None
    };

    let mut ingestor = Ingestor::new(
        HostResolver::new(identity, include_first_party),
        FeatureRegistry::standard(),
    );
    let mut stream = reader.stream();

    while let Some(event) = stream.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                if let Some(ref pb) = progress_bar {
                    pb.abandon_with_message("failed");
                }
                return Err(e.into());
            }
        };

        match event {
            BatchEvent::Started { index, total, path } => {
                if let Some(ref callback) = progress_callback {
                    callback(format!("Reading batch {}/{}: {}", index + 1, total, path.display()));
                }
                if let Some(ref pb) = progress_bar {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    pb.set_message(name);
                }
            }
            BatchEvent::Record(record) => {
                // Rejections are already counted in the stats.
                let _ = ingestor.ingest(&record);
            }
            BatchEvent::Finished { summary, .. } => {
                ingestor.finish_batch(&summary);
                if let Some(ref pb) = progress_bar {
                    pb.inc(1);
                }
            }
        }
    }

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!("{} records", ingestor.stats().records));
    }

    Ok(ingestor.finish())
}

/// Generate a run summary from the ingestion outcome
pub fn generate_ingest_report(stats: &IngestStats, graph: &AggregatedGraph) -> String {
    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str(&format!("{}\n", "# Summary:".bright_white().bold()));
    report.push_str(&format!("  Batches read: {}\n", stats.batches));
    report.push_str(&format!("  Records seen: {}\n", stats.records));
    report.push_str(&format!("  Records accepted: {}\n", stats.accepted));
    report.push_str(&format!("  Records skipped: {}\n", stats.rejected_total()));

    for reason in Rejection::ALL {
        let count = stats.rejected(reason);
        if count > 0 {
            report.push_str(&format!("    {}: {}\n", reason, count));
        }
    }
    if stats.malformed > 0 {
        report.push_str(&format!("  Malformed records: {}\n", stats.malformed));
    }

    report.push_str(&format!("  Nodes: {}\n", graph.node_count()));
    report.push_str(&format!("  Edges: {}\n", graph.edge_count()));

    let mut ranked: Vec<_> = graph
        .nodes()
        .filter_map(|n| n.number(INDEGREE).map(|d| (n.label(), d)))
        .filter(|(_, d)| *d > 0.0)
        .collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    if !ranked.is_empty() {
        report.push_str(&format!("\n{}\n", "# Most referenced hosts:".bright_white().bold()));
        for (label, indegree) in ranked.into_iter().take(10) {
            report.push_str(&format!("  {:>5}  {}\n", indegree, label));
        }
    }

    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    report
}
