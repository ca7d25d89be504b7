// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Global Otsu binarization of 8-bit grayscale rasters, computed by a group of
//! cooperating workers.
//!
//! Given a raster, the crate selects the intensity level that maximizes the
//! between-class variance of the pixels below and above it (Otsu's method) and
//! maps every pixel to 0 or 255 around that level.
//!
//! # Distributed pipeline
//!
//! [binarize_distributed()] runs a fixed group of ranks in lockstep through
//! these phases, each ending in a group-wide rendezvous:
//!
//! 1. Rank 0 loads the image and splits the row-major pixel buffer into one
//!    equal contiguous chunk per rank (itself included).
//! 2. Every rank builds the 256-bin histogram of its chunk.
//! 3. The histograms are summed on rank 0, which selects the threshold.
//! 4. The threshold is broadcast; every rank binarizes its chunk.
//! 5. Rank 0 gathers the chunks back, in rank order, into its own buffer and
//!    optionally writes the result.
//!
//! A failure on any rank (an unreadable input file, say) aborts every rank and
//! no output is written.
//!
//! # Caveats
//!
//! ## Remainder pixels
//!
//! Chunks are `total_pixels / worker_count` pixels long, rounded down. The
//! remaining `total_pixels % worker_count` pixels at the end of the image are
//! not counted in the histogram and are not thresholded; the output carries
//! their input values unchanged. See [image_funcs::Partitioning].
//!
//! ## Degenerate images
//!
//! When no level yields a positive between-class variance, e.g. for an image
//! of a single intensity, the threshold is 0.
//!
//! ## Baselines
//!
//! [binarize_serial()] and [binarize_threaded()] compute the same result in a
//! single process, without and with data parallelism.

pub mod algorithm;
pub mod comm;
pub mod error;
pub mod histogram_funcs;
pub mod image_funcs;
pub mod otsu;
pub mod raw_io;

pub use algorithm::{binarize, binarize_distributed, binarize_serial, binarize_threaded,
                    Binarized, ExecutionMode, ImageSource, PhaseTimings};
pub use error::BinarizeError;
