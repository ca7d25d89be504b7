// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::ops::Range;

use rayon::prelude::*;

use crate::error::BinarizeError;

const PIXELS_PER_UNIT: usize = 64 * 1024;

/// Split of a flattened raster into equal contiguous chunks, one per worker.
///
/// The chunk length is `total_pixels / worker_count` rounded down. The
/// `total_pixels % worker_count` pixels at the end of the buffer belong to no
/// worker: they are never counted nor thresholded, and they keep whatever value
/// the gather buffer held.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Partitioning {
    pub total_pixels: usize,
    pub worker_count: usize,
    pub chunk_len: usize,
}

impl Partitioning {
    pub fn new(total_pixels: usize, worker_count: usize)
               -> Result<Partitioning, BinarizeError> {
        if worker_count == 0 {
            return Err(BinarizeError::NoWorkers);
        }
        Ok(Partitioning{total_pixels, worker_count,
                        chunk_len: total_pixels / worker_count})
    }

    /// Buffer range owned by `rank`.
    pub fn chunk_range(&self, rank: usize) -> Range<usize> {
        debug_assert!(rank < self.worker_count);
        rank * self.chunk_len .. (rank + 1) * self.chunk_len
    }

    /// Number of pixels assigned to some worker.
    pub fn covered_pixels(&self) -> usize {
        self.chunk_len * self.worker_count
    }

    /// Number of trailing pixels assigned to no worker.
    pub fn dropped_pixels(&self) -> usize {
        self.total_pixels - self.covered_pixels()
    }
}

// Output value for one pixel: strictly brighter than `threshold` is white.
#[inline]
fn binarize_pixel(pixel: u8, threshold: u8) -> u8 {
    if pixel > threshold { 255 } else { 0 }
}

/// Maps every pixel to 255 if it exceeds `threshold`, else to 0, on the
/// calling thread.
pub fn apply_threshold_sequential(pixels: &mut [u8], threshold: u8) {
    for pixel in pixels.iter_mut() {
        *pixel = binarize_pixel(*pixel, threshold);
    }
}

/// Same as [`apply_threshold_sequential`], with the buffer split across
/// rayon's pool. Pixels are independent so the order of execution is free.
pub fn apply_threshold(pixels: &mut [u8], threshold: u8) {
    if pixels.len() <= PIXELS_PER_UNIT {
        apply_threshold_sequential(pixels, threshold);
        return;
    }
    pixels.par_chunks_mut(PIXELS_PER_UNIT).for_each(|piece| {
        apply_threshold_sequential(piece, threshold);
    });
}

// mod tests.
