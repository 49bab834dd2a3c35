use clap::Parser;
use lazyrange::{error::Error, iterable::LazyIterable, result::Result};
use serde::Serialize;
use std::path::PathBuf;
use tracing::Level;

mod lines;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Newline-delimited files, scanned one after the other
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Index of the first line to keep
    #[arg(short, long, default_value_t = 0)]
    start: usize,

    /// Index of the last line to keep, included in the output
    #[arg(short, long)]
    end: Option<usize>,

    /// Only keep lines containing this text
    #[arg(short, long)]
    contains: Option<String>,

    /// Split lines into whitespace-separated words before filtering
    #[arg(short, long)]
    words: bool,

    #[arg(short, long)]
    upper: bool,

    /// Print a JSON report instead of plain lines
    #[arg(long)]
    json: bool,

    #[arg(long, default_value_t = Level::WARN)]
    log_level: Level,
}

#[derive(Serialize)]
struct Report<'a> {
    files: &'a [PathBuf],
    lines: &'a LazyIterable<String>,
}

/// Builds the scan pipeline described by the arguments. Nothing is read
/// until the pipeline is materialized.
fn pipeline(cli: &Args) -> LazyIterable<String> {
    let mut scan = cli
        .paths
        .iter()
        .map(|path| lines::file_lines(path.clone()))
        .reduce(|first, second| first.concat(&second))
        .unwrap_or_else(LazyIterable::empty);

    if cli.words {
        scan = scan.flat_map(|line: String| {
            line.split_whitespace()
                .map(str::to_owned)
                .collect::<Vec<String>>()
        });
    }

    if let Some(needle) = cli.contains.clone() {
        scan = scan.filter(move |line| line.contains(needle.as_str()));
    }

    if cli.start > 0 || cli.end.is_some() {
        scan = scan.slice(cli.start, cli.end.unwrap_or(usize::MAX));
    }

    if cli.upper {
        scan = scan.map(|line| line.to_uppercase());
    }

    scan
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    let scan = pipeline(&cli);
    let lines = scan.materialize().await?;

    tracing::info!("scanned {} files, kept {} lines", cli.paths.len(), lines.len());

    if cli.json {
        let report = Report {
            files: &cli.paths,
            lines: &scan,
        };

        println!(
            "{}",
            serde_json::to_string_pretty(&report).map_err(Error::other)?
        );

        return Ok(());
    }

    for line in lines.iter() {
        println!("{}", line);
    }

    Ok(())
}
