//! EG-016: CLI subcommands: validate, show, fmt, check, edges.

use crate::core::config::LoaderConfig;
use crate::core::dumper;
use crate::core::fingerprint;
use crate::core::graph::Graph;
use crate::core::group::Member;
use crate::core::loader::{self, Document};
use crate::core::registry::Registry;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a document and report what it contains
    Validate {
        /// Path to the YAML document
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the summary of a loaded document
    Show {
        /// Path to the YAML document
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Re-emit a document in canonical form
    Fmt {
        /// Path to the YAML document
        #[arg(short, long)]
        file: PathBuf,

        /// Rewrite the file in place instead of printing
        #[arg(long)]
        write: bool,
    },

    /// Verify that a document survives a dump/load round trip
    Check {
        /// Path to the YAML document
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Print the expanded edge list of a graph or experiment
    Edges {
        /// Path to the YAML document
        #[arg(short, long)]
        file: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands, config_path: Option<&Path>) -> Result<(), String> {
    let config = match config_path {
        Some(path) => LoaderConfig::from_file(path).map_err(|e| e.to_string())?,
        None => LoaderConfig::default(),
    };
    let registry = Registry::with_builtins();

    match cmd {
        Commands::Validate { file } => cmd_validate(&file, &registry, config),
        Commands::Show { file } => cmd_show(&file, &registry, config),
        Commands::Fmt { file, write } => cmd_fmt(&file, &registry, config, write),
        Commands::Check { file } => cmd_check(&file, &registry, config),
        Commands::Edges { file } => cmd_edges(&file, &registry, config),
    }
}

fn load(file: &Path, registry: &Registry, config: LoaderConfig) -> Result<Document, String> {
    loader::load_file(file, registry, config).map_err(|e| e.to_string())
}

/// One-line description used by `validate`.
fn describe(doc: &Document) -> String {
    let name = doc.name().unwrap_or("-");
    match doc {
        Document::Graph(g) => format!(
            "graph {} ({} nodes, {} edges)",
            name,
            g.nodes.len(),
            g.edges().len()
        ),
        Document::Experiment(e) => format!(
            "experiment {} ({} nodes, {} edges, {} modifiers)",
            name,
            e.graph.nodes.len(),
            e.graph.edges().len(),
            e.modifiers.len()
        ),
        Document::Group(g) => format!(
            "group {} ({} shared nodes, {} members)",
            name,
            g.nodes.len(),
            g.members().len()
        ),
        Document::Nodes(nodes) => format!("nodes ({} nodes)", nodes.len()),
        other => format!("{} {}", other.kind(), name),
    }
}

fn cmd_validate(file: &Path, registry: &Registry, config: LoaderConfig) -> Result<(), String> {
    let doc = load(file, registry, config)?;
    println!("OK: {}", describe(&doc));
    Ok(())
}

fn cmd_show(file: &Path, registry: &Registry, config: LoaderConfig) -> Result<(), String> {
    match load(file, registry, config)? {
        Document::Experiment(e) => print!("{}", e),
        Document::Graph(g) => print!("{}", g),
        Document::Group(g) => print!("{}", g),
        Document::Function(f) => println!("{}", f),
        other => print!("{}", dumper::dump(&other).map_err(|e| e.to_string())?),
    }
    Ok(())
}

fn cmd_fmt(
    file: &Path,
    registry: &Registry,
    config: LoaderConfig,
    write: bool,
) -> Result<(), String> {
    let doc = load(file, registry, config)?;
    if write {
        dumper::dump_file(&doc, file).map_err(|e| e.to_string())?;
        println!("Formatted {}", file.display());
    } else {
        print!("{}", dumper::dump(&doc).map_err(|e| e.to_string())?);
    }
    Ok(())
}

fn cmd_check(file: &Path, registry: &Registry, config: LoaderConfig) -> Result<(), String> {
    let doc = load(file, registry, config)?;
    let text = dumper::dump(&doc).map_err(|e| e.to_string())?;
    let again = loader::load_with(&text, registry, config).map_err(|e| e.to_string())?;
    if again != doc {
        return Err(format!(
            "{}: reloading the canonical dump produced a different document",
            file.display()
        ));
    }
    println!("OK: round trip preserved {}", describe(&doc));
    println!("fingerprint: {}", fingerprint::hash_string(&text));
    Ok(())
}

fn print_edges(graph: &Graph) {
    println!("{}:", graph.name);
    for edge in graph.edges() {
        println!("  {}", edge);
    }
}

fn cmd_edges(file: &Path, registry: &Registry, config: LoaderConfig) -> Result<(), String> {
    match load(file, registry, config)? {
        Document::Graph(g) => print_edges(&g),
        Document::Experiment(e) => print_edges(&e.graph),
        Document::Group(group) => {
            for member in group.members().values() {
                match member {
                    Member::Experiment(e) => print_edges(&e.graph),
                    Member::Graph(g) => print_edges(g),
                }
            }
        }
        other => {
            return Err(format!(
                "{}: a {} document has no edges",
                file.display(),
                other.kind()
            ))
        }
    }
    Ok(())
}
