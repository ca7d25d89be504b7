// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use rayon::prelude::*;

/// Number of intensity levels of an 8-bit sample.
pub const GRAY_LEVELS: usize = 256;

/// Per-level pixel counts.
pub type Histogram = [u32; GRAY_LEVELS];

// Pixels handed to each rayon unit when building a histogram. Each unit owns a
// private count array for its pieces.
const PIXELS_PER_UNIT: usize = 64 * 1024;

/// Counts the occurrences of each intensity value in `pixels`, one pass over
/// the data on the calling thread.
pub fn build_histogram_sequential(pixels: &[u8]) -> Histogram {
    let mut histogram = [0_u32; GRAY_LEVELS];
    for &pixel in pixels {
        histogram[pixel as usize] += 1;
    }
    histogram
}

/// Counts the occurrences of each intensity value in `pixels`.
///
/// The buffer is split across rayon's pool. Every unit accumulates into its
/// own array and the arrays are combined with [`merge_histogram`], so the
/// result is identical to [`build_histogram_sequential`].
pub fn build_histogram(pixels: &[u8]) -> Histogram {
    if pixels.len() <= PIXELS_PER_UNIT {
        return build_histogram_sequential(pixels);
    }
    pixels.par_chunks(PIXELS_PER_UNIT)
        .fold(|| [0_u32; GRAY_LEVELS], |mut histogram, piece| {
            for &pixel in piece {
                histogram[pixel as usize] += 1;
            }
            histogram
        })
        .reduce(|| [0_u32; GRAY_LEVELS], |mut accum, part| {
            merge_histogram(&mut accum, &part);
            accum
        })
}

/// Adds `part` into `accum`, bin by bin.
pub fn merge_histogram(accum: &mut Histogram, part: &Histogram) {
    for (total, &count) in accum.iter_mut().zip(part.iter()) {
        *total += count;
    }
}

/// Elementwise sum of `histograms`. An empty slice yields an all-zero
/// histogram.
pub fn reduce_histograms(histograms: &[Histogram]) -> Histogram {
    histograms.iter().fold([0_u32; GRAY_LEVELS], |mut accum, part| {
        merge_histogram(&mut accum, part);
        accum
    })
}

/// Total number of pixels counted by `histogram`.
pub fn histogram_count(histogram: &Histogram) -> u64 {
    histogram.iter().map(|&count| count as u64).sum()
}

// mod tests.
