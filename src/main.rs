use std::{
    fs::File,
    io::{stdin, BufRead, BufReader},
    path::PathBuf,
};

use anyhow::{Context, Error};
use clap::{Parser, ValueEnum};
use log::info;

use stgen_core::logger::{NullLoggerFactory, PackedLoggerFactory, TextLoggerFactory};

#[derive(Parser)]
struct Cli {
    /// Output directory for trace and metadata files
    #[arg(short = 'o', default_value = ".")]
    output_dir: PathBuf,

    /// Loads/stores folded into one computation event
    #[arg(short = 'c', default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..=100))]
    prims_per_comp: u64,

    /// Trace serialization backend
    #[arg(short = 'l', value_enum, default_value = "text")]
    logger: LoggerBackend,

    /// Primitive-event stream; stdin when omitted
    input: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LoggerBackend {
    Text,
    Capnp,
    Null,
}

fn main() -> Result<(), Error> {
    env_logger::init();

    let args = Cli::parse();

    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating output directory {}", args.output_dir.display()))?;

    let input: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(stdin().lock()),
    };

    match args.logger {
        LoggerBackend::Text => stgen::generate(
            input,
            TextLoggerFactory::new(&args.output_dir),
            args.prims_per_comp,
            &args.output_dir,
        )?,
        LoggerBackend::Capnp => stgen::generate(
            input,
            PackedLoggerFactory::new(&args.output_dir),
            args.prims_per_comp,
            &args.output_dir,
        )?,
        LoggerBackend::Null => stgen::generate(
            input,
            NullLoggerFactory,
            args.prims_per_comp,
            &args.output_dir,
        )?,
    }

    info!("trace written to {}", args.output_dir.display());

    Ok(())
}
