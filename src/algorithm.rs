// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use image::GrayImage;
use log::{debug, info};

use crate::comm::{run_group, CommError, Communicator};
use crate::error::BinarizeError;
use crate::histogram_funcs::{build_histogram, build_histogram_sequential, histogram_count};
use crate::image_funcs::{apply_threshold, apply_threshold_sequential, Partitioning};
use crate::otsu::select_threshold;
use crate::raw_io::{read_raw_image, write_raw_image};

/// Where the orchestrator obtains the image.
#[derive(Debug)]
pub enum ImageSource {
    /// Headerless raster file; see [`crate::raw_io`].
    RawFile { path: PathBuf, height: u32, width: u32 },
    Memory(GrayImage),
}

impl ImageSource {
    /// (width, height) of the image, known without loading it.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            ImageSource::RawFile { height, width, .. } => (*width, *height),
            ImageSource::Memory(image) => image.dimensions(),
        }
    }

    fn load(self) -> Result<GrayImage, BinarizeError> {
        match self {
            ImageSource::RawFile { path, height, width } =>
                read_raw_image(&path, height, width),
            ImageSource::Memory(image) => Ok(image),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ExecutionMode {
    /// Single thread, no parallelism at all.
    Serial,
    /// Single process; histogram and thresholding spread over rayon's pool.
    Threaded,
    /// A group of `workers` ranks, each owning one partition of the image.
    Distributed { workers: usize },
}

/// Wall-clock time spent in each phase of a run, as seen by the orchestrator.
#[derive(Copy, Clone, Debug, Default)]
pub struct PhaseTimings {
    // Reading the input plus writing the output.
    pub io: Duration,
    pub distribute: Duration,
    // Local histograms, reduction, selection, broadcast and local thresholding.
    pub compute: Duration,
    pub gather: Duration,
    pub total: Duration,
}

#[derive(Debug)]
pub struct Binarized {
    /// The black/white output. Pixels not covered by `partitioning` keep their
    /// input values.
    pub image: GrayImage,
    pub threshold: u8,
    pub partitioning: Partitioning,
    pub timings: PhaseTimings,
}

/// Binarizes `image` in place on the calling thread. Returns the threshold.
pub fn binarize_serial(image: &mut GrayImage) -> u8 {
    let total_pixels = image.as_raw().len() as u64;
    let histogram = build_histogram_sequential(image.as_raw());
    let threshold = select_threshold(&histogram, total_pixels);
    apply_threshold_sequential(image, threshold);
    threshold
}

/// Binarizes `image` in place using rayon's pool. Returns the threshold.
pub fn binarize_threaded(image: &mut GrayImage) -> u8 {
    let total_pixels = image.as_raw().len() as u64;
    let histogram = build_histogram(image.as_raw());
    let threshold = select_threshold(&histogram, total_pixels);
    apply_threshold(image, threshold);
    threshold
}

/// Binarizes the image from `source` with a group of `worker_count` ranks.
///
/// Rank 0 loads the image, cuts it into `worker_count` equal chunks (see
/// [`Partitioning`]) and keeps the first for itself. Every rank counts its
/// chunk; rank 0 sums the counts, selects the Otsu threshold over the whole
/// image's pixel count and broadcasts it; every rank thresholds its chunk and
/// rank 0 gathers the chunks back into its image buffer. If `output` is given,
/// rank 0 then writes the image there.
///
/// Any failure on any rank aborts all ranks and nothing is written.
pub async fn binarize_distributed(source: ImageSource, output: Option<PathBuf>,
                                  worker_count: usize)
                                  -> Result<Binarized, BinarizeError> {
    let (width, height) = source.dimensions();
    let partitioning =
        Partitioning::new(width as usize * height as usize, worker_count)?;
    info!("Binarizing {}x{} image with {} workers of {} pixels each",
          width, height, worker_count, partitioning.chunk_len);
    if partitioning.dropped_pixels() > 0 {
        info!("{} trailing pixels are assigned to no worker",
              partitioning.dropped_pixels());
    }

    let mut root_job = Some((source, output));
    let outcomes = run_group(worker_count, |comm| {
        let job = if comm.is_root() { root_job.take() } else { None };
        run_rank(comm, partitioning, job)
    }).await?;
    outcomes.into_iter().flatten().next()
        .ok_or(BinarizeError::Comm(CommError::MissingRootData))
}

/// Runs one of the execution modes end to end: load, binarize, and write to
/// `output` if given.
pub async fn binarize(source: ImageSource, output: Option<PathBuf>,
                      mode: ExecutionMode) -> Result<Binarized, BinarizeError> {
    let workers = match mode {
        ExecutionMode::Distributed { workers } =>
            return binarize_distributed(source, output, workers).await,
        ExecutionMode::Serial | ExecutionMode::Threaded => 1,
    };
    let total_start = Instant::now();
    let mut timings = PhaseTimings::default();

    let io_start = Instant::now();
    let mut image = source.load()?;
    timings.io = io_start.elapsed();
    let partitioning = Partitioning::new(image.as_raw().len(), workers)?;

    let compute_start = Instant::now();
    let threshold = if mode == ExecutionMode::Serial {
        binarize_serial(&mut image)
    } else {
        binarize_threaded(&mut image)
    };
    timings.compute = compute_start.elapsed();
    info!("{:?} binarization selected threshold {} in {:?}",
          mode, threshold, timings.compute);

    if let Some(output) = &output {
        let write_start = Instant::now();
        write_raw_image(output, &image)?;
        timings.io += write_start.elapsed();
    }
    timings.total = total_start.elapsed();
    Ok(Binarized{image, threshold, partitioning, timings})
}

// The pipeline every rank runs. `job` is Some only on the root. Returns the
// root's result; other ranks return None.
async fn run_rank(mut comm: Communicator, partitioning: Partitioning,
                  job: Option<(ImageSource, Option<PathBuf>)>)
                  -> Result<Option<Binarized>, BinarizeError> {
    let total_start = Instant::now();
    let mut timings = PhaseTimings::default();
    let rank = comm.rank();
    let (source, output) = match job {
        Some((source, output)) => (Some(source), output),
        None => (None, None),
    };

    let io_start = Instant::now();
    let mut image = source.map(ImageSource::load).transpose()?;
    timings.io = io_start.elapsed();

    let distribute_start = Instant::now();
    let mut chunk = comm.scatter(image.as_ref().map(|image| image.as_raw().as_slice()),
                                 partitioning.chunk_len).await?;
    timings.distribute = distribute_start.elapsed();

    let compute_start = Instant::now();
    let local_histogram = build_histogram(&chunk);
    let global_histogram = comm.reduce_histogram(&local_histogram).await?;
    if let Some(histogram) = &global_histogram {
        debug!("Global histogram counts {} of {} pixels",
               histogram_count(histogram), partitioning.total_pixels);
    }
    let selected = global_histogram.map(|histogram| {
        select_threshold(&histogram, partitioning.total_pixels as u64)
    });
    let threshold = comm.broadcast_threshold(selected).await?;
    apply_threshold(&mut chunk, threshold);
    timings.compute = compute_start.elapsed();
    debug!("Rank {} thresholded {} pixels at {}", rank, chunk.len(), threshold);

    let gather_start = Instant::now();
    comm.gather(chunk, image.as_mut().map(|image| &mut **image)).await?;
    timings.gather = gather_start.elapsed();

    if let (Some(image), Some(output)) = (&image, &output) {
        let write_start = Instant::now();
        write_raw_image(output, image)?;
        timings.io += write_start.elapsed();
    }
    comm.finalize().await?;
    timings.total = total_start.elapsed();

    Ok(image.map(|image| {
        info!("Distributed binarization selected threshold {} in {:?}",
              threshold, timings.total);
        Binarized{image, threshold, partitioning, timings}
    }))
}

// mod tests.
