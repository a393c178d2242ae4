use crate::CLAP_STYLING;
use clap::{ArgAction, arg};

pub fn command_argument_builder() -> clap::Command {
    clap::Command::new("flowgraph")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("flowgraph")
        .about(
            "Build a directed host-to-host request graph from batches of captured browser \
            traffic and write it as GEXF.",
        )
        .styles(CLAP_STYLING)
        .arg(
            arg!(<INPUT_DIR>)
                .required(true)
                .help("Directory containing the *.json request batches"),
        )
        .arg(
            arg!(-o --"output" <PATH>)
                .required(false)
                .help("Destination GEXF file")
                .default_value("graph.gexf"),
        )
        .arg(
            arg!(--"sld")
                .required(false)
                .help(
                    "Use second-level domains (e.g. tracker.com) as node identities instead of \
                    full hostnames",
                )
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg!(--"first-party")
                .required(false)
                .help("Keep requests whose source and target share a second-level domain")
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg!(-s --"silent")
                .required(false)
                .help("Suppress the progress bar and the run summary")
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg!(-b --"base-dir" <PATH>)
                .required(false)
                .help(
                    "Base directory used to resolve a relative INPUT_DIR that does not exist \
                    as given",
                ),
        )
        .arg(
            arg!(-v --"verbose")
                .required(false)
                .help("Raise log verbosity (-v info, -vv debug, -vvv trace)")
                .action(ArgAction::Count),
        )
}
