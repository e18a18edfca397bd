//! `touchgraph` CLI entry-point.
//!
//! Available sub-commands:
//! - `explore`: print the nested ID tree reachable from a node.
//! - `touch`:   touch a node with a JSON state and report what ran.

mod topology;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use topology::{Document, Topology};

#[derive(Parser)]
#[command(
    name = "touchgraph",
    about = "Run and inspect dataflow node graphs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the tree of node IDs reachable from `root`.
    Explore {
        /// Path to the topology JSON file.
        path: PathBuf,
        /// Node to start from.
        #[arg(long)]
        root: String,
        /// Nest the tree under the root's own ID.
        #[arg(long)]
        wrap: bool,
    },
    /// Touch `entry` with a JSON state and print the nodes that ran.
    Touch {
        /// Path to the topology JSON file.
        path: PathBuf,
        /// Node to touch.
        #[arg(long)]
        entry: String,
        /// Initial state as a JSON object.
        #[arg(long, default_value = "{}")]
        input: String,
        /// How long to let fire-and-forget fan-out run before exiting.
        #[arg(long, env = "TOUCHGRAPH_SETTLE_MS", default_value_t = 100)]
        settle_ms: u64,
    },
}

/// Parse `--input`; node steps merge fields into it, so it must be an object.
fn parse_input(input: &str) -> anyhow::Result<serde_json::Value> {
    let state: serde_json::Value =
        serde_json::from_str(input).context("--input is not valid JSON")?;
    if !state.is_object() {
        anyhow::bail!("--input must be a JSON object, got `{state}`");
    }
    Ok(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("touchgraph=info,engine=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Explore { path, root, wrap } => {
            let graph = Topology::load(&path)?.build()?;
            let node = graph
                .node(&root)
                .with_context(|| format!("no node '{root}' in {}", path.display()))?;

            let tree = if wrap { node.explore_wrapped() } else { node.explore() };
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        Command::Touch {
            path,
            entry,
            input,
            settle_ms,
        } => {
            let graph = Topology::load(&path)?.build()?;
            let node = graph
                .node(&entry)
                .with_context(|| format!("no node '{entry}' in {}", path.display()))?;
            let state = parse_input(&input)?;

            let doc = Document::new(state);
            info!("touching '{entry}'");
            node.touch(Arc::clone(&doc)).await?;

            // Fan-out is never awaited, so give it a fixed window to finish.
            tokio::time::sleep(Duration::from_millis(settle_ms)).await;

            println!("ran: {}", doc.trace().join(" -> "));
            println!("state: {}", doc.state());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_input_is_accepted() {
        assert_eq!(parse_input(r#"{"n": 5}"#).unwrap(), json!({ "n": 5 }));
    }

    #[test]
    fn non_object_input_is_rejected() {
        for input in ["5", "[1]", "\"text\"", "null"] {
            let err = parse_input(input).expect_err("non-object input");
            assert!(err.to_string().contains("must be a JSON object"), "{input}: {err}");
        }
    }

    #[test]
    fn malformed_input_is_rejected() {
        let err = parse_input("{").expect_err("invalid JSON");
        assert!(err.to_string().contains("not valid JSON"));
    }
}
