// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use log::debug;

use crate::histogram_funcs::Histogram;

/// Between-class variance of the split where the lower class holds `q1`
/// pixels with intensity sum `sum_b`, and the upper class holds `q2` pixels
/// carrying the rest of `total_intensity`. Both `q1` and `q2` must be
/// non-zero.
pub fn between_class_variance(q1: u64, q2: u64, sum_b: u64, total_intensity: u64) -> f64 {
    debug_assert!(q1 > 0 && q2 > 0);
    let m1 = sum_b as f64 / q1 as f64;
    let m2 = (total_intensity - sum_b) as f64 / q2 as f64;
    q1 as f64 * q2 as f64 * (m1 - m2) * (m1 - m2)
}

/// Selects the Otsu threshold for `histogram`.
///
/// `total_pixels` is the pixel count of the whole image. It is normally the
/// sum of `histogram`, but a partitioned run may have counted fewer pixels
/// than the image holds; the background class size is always taken relative
/// to `total_pixels`.
///
/// Levels are scanned upwards. A level only replaces the current best when its
/// variance is strictly greater, so among equal maxima the lowest level wins.
/// When no level has positive variance (e.g. every pixel has the same value)
/// the result is 0.
pub fn select_threshold(histogram: &Histogram, total_pixels: u64) -> u8 {
    let total_intensity: u64 = histogram.iter().enumerate()
        .map(|(level, &count)| level as u64 * count as u64)
        .sum();

    let mut q1 = 0_u64;
    let mut sum_b = 0_u64;
    let mut max_variance = 0.0_f64;
    let mut threshold = 0_u8;
    for (level, &count) in histogram.iter().enumerate() {
        q1 += count as u64;
        if q1 == 0 {
            continue;
        }
        let q2 = match total_pixels.checked_sub(q1) {
            Some(q2) if q2 > 0 => q2,
            _ => break,  // No background pixels left.
        };
        sum_b += level as u64 * count as u64;
        let variance = between_class_variance(q1, q2, sum_b, total_intensity);
        if variance > max_variance {
            max_variance = variance;
            threshold = level as u8;
        }
    }
    debug!("Otsu threshold {} with between-class variance {}",
           threshold, max_variance);
    threshold
}

#[cfg(test)]
mod tests {
    extern crate approx;
    use approx::assert_abs_diff_eq;
    use super::*;
    use crate::histogram_funcs::GRAY_LEVELS;

    fn histogram_of(entries: &[(usize, u32)]) -> Histogram {
        let mut histogram = [0_u32; GRAY_LEVELS];
        for &(level, count) in entries {
            histogram[level] = count;
        }
        histogram
    }

    #[test]
    fn test_between_class_variance() {
        // Two pixels at 0, two at 10.
        assert_abs_diff_eq!(between_class_variance(2, 2, 0, 20), 400.0);
        // Lower class {10, 10}, upper class {30}.
        assert_abs_diff_eq!(between_class_variance(2, 1, 20, 50), 800.0);
    }

    #[test]
    fn test_tie_break_prefers_lowest_level() {
        // Every level from 10 up to 19 splits {10} from {20} identically.
        let histogram = histogram_of(&[(10, 1), (20, 1)]);
        assert_eq!(select_threshold(&histogram, 2), 10);
    }

    #[test]
    fn test_three_level_histogram() {
        // Split after 10: q1=2, q2=2, means 10 and 25 -> 900.
        // Split after 20: q1=3, q2=1, means 13.3 and 30 -> 833.3.
        let histogram = histogram_of(&[(10, 2), (20, 1), (30, 1)]);
        assert_eq!(select_threshold(&histogram, 4), 10);
    }

    #[test]
    fn test_bimodal_picks_gap() {
        let histogram = histogram_of(&[(40, 30), (45, 20), (50, 10),
                                       (180, 10), (190, 25), (200, 30)]);
        let threshold = select_threshold(&histogram, 125);
        assert!(threshold >= 50 && threshold < 180, "threshold {}", threshold);
    }

    #[test]
    fn test_uniform_histogram_is_degenerate() {
        let histogram = histogram_of(&[(128, 64)]);
        assert_eq!(select_threshold(&histogram, 64), 0);
    }

    #[test]
    fn test_empty_histogram() {
        assert_eq!(select_threshold(&[0_u32; GRAY_LEVELS], 0), 0);
    }

    #[test]
    fn test_deterministic() {
        let histogram = histogram_of(&[(3, 7), (90, 2), (91, 5), (250, 9)]);
        let first = select_threshold(&histogram, 23);
        for _ in 0..10 {
            assert_eq!(select_threshold(&histogram, 23), first);
        }
    }

    #[test]
    fn test_uncounted_pixels_join_background() {
        // 8 pixels at 128 were counted but the image holds 10: the missing two
        // act as an empty-intensity background, so 128 is a real split.
        let histogram = histogram_of(&[(128, 8)]);
        assert_eq!(select_threshold(&histogram, 10), 128);
    }

    #[test]
    fn test_total_smaller_than_histogram_stops() {
        let histogram = histogram_of(&[(5, 4), (9, 4)]);
        assert_eq!(select_threshold(&histogram, 3), 0);
    }
}  // mod tests.
