use arcbatch_analysis::{create_output, Aggregation, Summary};
use clap::Parser;
use std::{
    fs::File,
    io::{BufReader, Write},
    path::PathBuf,
    process::exit,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Fold the result files of several machines into one summary table
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// format of the result lines
    #[arg(value_enum)]
    kind: Aggregation,
    /// write the summary to this new file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
    /// result files, usually `<output>_<machine>`
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output = cli.output.as_deref().map(|path| match create_output(path) {
        Ok(file) => (path, file),
        Err(error) => {
            error!("{error}");
            exit(1);
        }
    });
    let mut summary = Summary::new(cli.kind);

    for path in &cli.files {
        if !path.is_file() {
            error!("The file '{}' is not valid!", path.display());
            exit(1);
        }

        let stats = match File::open(path).map(BufReader::new) {
            Ok(reader) => summary.fold(reader),
            Err(error) => {
                error!(path = ?path, "Failed to open result file: {error}");
                exit(1);
            }
        };

        match stats {
            Ok(stats) => info!(
                path = ?path,
                lines = stats.lines,
                bad_lines = stats.bad_lines,
                "Folded result file"
            ),
            Err(error) => {
                error!(path = ?path, "{error}");
                exit(1);
            }
        }
    }

    match output {
        Some((path, mut file)) => {
            if let Err(error) = write!(file, "{summary}") {
                error!(path = ?path, "Failed to write summary: {error}");
                exit(1);
            }
        }
        None => print!("{summary}"),
    }
}
