#[macro_use]
extern crate log;

use std::path::PathBuf;

use clap::Parser;
use laminar_backend::run_backend;

/// Multi-threaded C code emitter for partitioned dataflow designs
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// The partitioned, scheduled design graph (YAML)
    graph: PathBuf,

    /// The emission configuration (YAML)
    config: PathBuf,

    /// Directory receiving the generated files
    #[arg(short, long, default_value = "generated")]
    out_dir: PathBuf,
}

/// Helper to print top-level errors through [log::error]
#[quit::main]
fn main() {
    let level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    std::env::set_var("RUST_LOG", level.clone());

    pretty_env_logger::formatted_builder()
        .parse_filters(&level)
        .format_timestamp_secs()
        .init();

    let args = Args::parse();

    match run_backend(&args.graph, &args.config, &args.out_dir) {
        Ok(_) => {}
        Err(e) => {
            error!("{e}");
            quit::with_code(1);
        }
    }
}
