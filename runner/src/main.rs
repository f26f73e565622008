use arcbatch_runner::cli::{usage_exit_code, Cli, CommandError};
use clap::{error::ErrorKind, CommandFactory, Parser};
use std::{error::Error, process::exit};
use tracing::error;
use tracing_subscriber::EnvFilter;

fn print_usage() {
    if let Err(error) = Cli::command().print_help() {
        error!("Cannot print usage: {error}");
    }
}

/// message of an error followed by all its causes
fn describe(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(&format!(": {cause}"));
        source = cause.source();
    }
    message
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(parse_error) => {
            if matches!(
                parse_error.kind(),
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion
            ) {
                if let Err(error) = parse_error.print() {
                    error!("Cannot print usage: {error}");
                }
                exit(0);
            }

            // the flag itself may be what failed to parse
            let strict = std::env::args().any(|arg| arg == "--strict-exit");
            eprintln!("{parse_error}");
            print_usage();
            exit(usage_exit_code(strict));
        }
    };

    match cli.execute() {
        Ok(()) => {}
        Err(CommandError::Usage(usage)) => {
            error!("{}", describe(&usage));
            print_usage();
            exit(usage_exit_code(cli.strict_exit));
        }
        Err(fatal) => {
            error!("{}", describe(&fatal));
            exit(1);
        }
    }
}
