// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::PathBuf;
use std::thread;

use clap::{Parser, ValueEnum};
use env_logger;
use log::{error, info};

use otsu_binarize::{binarize, ExecutionMode, ImageSource};

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Mode {
    /// Partition the image over a group of workers.
    Distributed,
    /// One process, data-parallel histogram and thresholding.
    Threaded,
    /// One thread.
    Serial,
}

/// Binarizes a raw 8-bit grayscale raster with Otsu's threshold.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about=None)]
struct Args {
    /// Input raster: exactly height*width bytes, row-major, no header.
    input: PathBuf,

    /// Raster height in pixels.
    height: u32,

    /// Raster width in pixels.
    width: u32,

    /// Where the binarized raster is written.
    output: PathBuf,

    /// Number of workers in distributed mode. Defaults to the CPU count.
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(short, long, value_enum, default_value_t = Mode::Distributed)]
    mode: Mode,

    /// Print the time spent in each phase.
    #[arg(short, long, default_value_t = false)]
    timing: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mode = match args.mode {
        Mode::Serial => ExecutionMode::Serial,
        Mode::Threaded => ExecutionMode::Threaded,
        Mode::Distributed => {
            let workers = args.workers.unwrap_or_else(|| {
                thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
            });
            ExecutionMode::Distributed{workers}
        },
    };
    info!("Processing {:?} ({}x{}) in {:?} mode",
          args.input, args.width, args.height, mode);

    let source = ImageSource::RawFile{
        path: args.input.clone(), height: args.height, width: args.width};
    let result = binarize(source, Some(args.output.clone()), mode).await
        .map_err(|e| {
            error!("{}", e);
            e
        })?;

    println!("Calculated Otsu threshold: {}", result.threshold);
    if args.timing {
        let timings = &result.timings;
        println!("I/O Time: {:.6} seconds", timings.io.as_secs_f64());
        println!("Distribute Time: {:.6} seconds", timings.distribute.as_secs_f64());
        println!("Compute Time: {:.6} seconds", timings.compute.as_secs_f64());
        println!("Gather Time: {:.6} seconds", timings.gather.as_secs_f64());
        println!("Total Execution Time: {:.6} seconds", timings.total.as_secs_f64());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_is_a_switch() {
        let args = Args::try_parse_from(
            ["otsu-binarize", "in.raw", "4", "4", "out.raw", "--timing"]).unwrap();
        assert!(args.timing);
        assert!(matches!(args.mode, Mode::Distributed));
        assert_eq!(args.workers, None);

        let args = Args::try_parse_from(
            ["otsu-binarize", "in.raw", "4", "4", "out.raw", "-t", "-w", "3"]).unwrap();
        assert!(args.timing);
        assert_eq!(args.workers, Some(3));

        let args = Args::try_parse_from(
            ["otsu-binarize", "in.raw", "4", "4", "out.raw"]).unwrap();
        assert!(!args.timing);
    }

    #[test]
    fn test_missing_positional_is_usage_error() {
        let err = Args::try_parse_from(["otsu-binarize", "in.raw", "4", "4"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }
}  // mod tests.
