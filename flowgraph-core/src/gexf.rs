// GEXF 1.2 output of an aggregated graph

use crate::error::{IngestError, Result};
use crate::features::INDEGREE;
use crate::graph::AggregatedGraph;
use chrono::Utc;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

const CREATOR: &str = concat!("flowgraph ", env!("CARGO_PKG_VERSION"));

/// Serialize `graph` as a GEXF document.
///
/// Nodes carry their label, every feature's final value and `indegree`.
/// Edges carry the raw per-feature accumulators.
pub fn write_gexf<W: Write>(graph: &AggregatedGraph, mut out: W) -> io::Result<()> {
    let features: Vec<&str> = graph.registry().names().collect();
    let node_columns: Vec<&str> = features.iter().copied().chain([INDEGREE]).collect();

    writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#)?;
    writeln!(
        out,
        r#"<gexf xmlns="http://gexf.net/1.2" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="http://gexf.net/1.2 http://gexf.net/1.2/gexf.xsd" version="1.2">"#
    )?;
    writeln!(
        out,
        r#"  <meta lastmodifieddate="{}">"#,
        Utc::now().format("%Y-%m-%d")
    )?;
    writeln!(out, "    <creator>{}</creator>", escape_xml(CREATOR))?;
    writeln!(out, "  </meta>")?;
    writeln!(out, r#"  <graph defaultedgetype="directed" mode="static">"#)?;

    write_attribute_decls(&mut out, "node", &node_columns)?;
    write_attribute_decls(&mut out, "edge", &features)?;

    writeln!(out, "    <nodes>")?;
    for node in graph.nodes() {
        writeln!(
            out,
            r#"      <node id="{}" label="{}">"#,
            escape_xml(&node.id),
            escape_xml(node.label())
        )?;
        writeln!(out, "        <attvalues>")?;
        for (i, column) in node_columns.iter().enumerate() {
            let value = node.number(column).unwrap_or(0.0);
            writeln!(out, r#"          <attvalue for="{}" value="{}"/>"#, i, value)?;
        }
        writeln!(out, "        </attvalues>")?;
        writeln!(out, "      </node>")?;
    }
    writeln!(out, "    </nodes>")?;

    writeln!(out, "    <edges>")?;
    for (id, (source, target, edge)) in graph.edges().enumerate() {
        writeln!(
            out,
            r#"      <edge id="{}" source="{}" target="{}">"#,
            id,
            escape_xml(&source.id),
            escape_xml(&target.id)
        )?;
        writeln!(out, "        <attvalues>")?;
        for (i, feature) in features.iter().enumerate() {
            let value = edge.get(feature).unwrap_or(0.0);
            writeln!(out, r#"          <attvalue for="{}" value="{}"/>"#, i, value)?;
        }
        writeln!(out, "        </attvalues>")?;
        writeln!(out, "      </edge>")?;
    }
    writeln!(out, "    </edges>")?;

    writeln!(out, "  </graph>")?;
    writeln!(out, "</gexf>")?;
    out.flush()
}

/// Write `graph` to `path`, replacing any existing file. On failure the
/// previous contents of `path` are left untouched.
pub fn save_gexf(graph: &AggregatedGraph, path: &Path) -> Result<()> {
    write_atomically(path, |out| write_gexf(graph, out)).map_err(|source| IngestError::Output {
        path: path.to_path_buf(),
        source,
    })
}

/// Run `write` against a sibling temporary file, then rename it over `path`.
/// The temporary file is removed when any step fails.
pub fn write_atomically<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let temp_path = temp_path_for(path);

    let result = File::create(&temp_path)
        .and_then(|file| {
            let mut writer = BufWriter::new(file);
            write(&mut writer)?;
            writer.flush()
        })
        .and_then(|()| fs::rename(&temp_path, path));

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("graph.gexf"));
    name.push(".tmp");
    path.with_file_name(name)
}

pub fn gexf_string(graph: &AggregatedGraph) -> String {
    let mut buf = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_gexf(graph, &mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

fn write_attribute_decls<W: Write>(out: &mut W, class: &str, titles: &[&str]) -> io::Result<()> {
    writeln!(out, r#"    <attributes class="{}" mode="static">"#, class)?;
    for (i, title) in titles.iter().enumerate() {
        writeln!(
            out,
            r#"      <attribute id="{}" title="{}" type="double"/>"#,
            i,
            escape_xml(title)
        )?;
    }
    writeln!(out, "    </attributes>")
}

pub fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
