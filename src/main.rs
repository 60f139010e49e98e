// Copyright 2024 Cornell University
// released under BSD 3-Clause License
// author: Kevin Laeufer <laeufer@cornell.edu>

use clap::Parser;
use std::io::Write;
use std::process::ExitCode;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;
use witness2test::error::WARNING_TARGET;
use witness2test::{process_witness, Options};

#[derive(Parser, Debug)]
#[command(name = "witness2test")]
#[command(author = "Kevin Laeufer <laeufer@cornell.edu>")]
#[command(version)]
#[command(about = "Turns a violation witness into a replayable test vector.", long_about = None)]
struct Args {
    #[arg(short, long, help = "GraphML witness file.")]
    witness: String,
    #[arg(short, long, help = "C benchmark the witness was produced for.")]
    benchmark: String,
    #[arg(short = 'm', value_name = "BITWIDTH", help = "Expected architecture width.")]
    bitwidth: Option<u32>,
    #[arg(
        long,
        default_value = witness2test::c::DEFAULT_PREPROCESSOR,
        help = "C preprocessor to run."
    )]
    preprocessor: String,
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,
    #[arg(short, long)]
    quiet: bool,
}

/// Witness warnings are part of the tool's output, neither `-q` nor `RUST_LOG` hides them.
fn with_warnings(filter: EnvFilter) -> EnvFilter {
    match format!("{WARNING_TARGET}=warn").parse::<Directive>() {
        Ok(warnings) => filter.add_directive(warnings),
        Err(_) => filter,
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let default_level = if args.verbose {
        "debug"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let filter = with_warnings(filter);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let options = Options {
        bitwidth: args.bitwidth,
        preprocessor: args.preprocessor,
        ..Options::new(args.witness, args.benchmark)
    };
    match process_witness(&options) {
        Ok(outcome) => {
            let mut stdout = std::io::stdout().lock();
            match outcome
                .manifest
                .write(&mut stdout)
                .and_then(|_| stdout.flush())
            {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("failed to write manifest: {e}");
                    ExitCode::from(4)
                }
            }
        }
        Err(e) => {
            e.report();
            eprintln!("{e}");
            ExitCode::from(e.exit_code())
        }
    }
}
