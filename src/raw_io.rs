// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

//! Headerless 8-bit raster files: exactly `height * width` bytes in row-major
//! order. Dimensions are not stored in the file and must be supplied by the
//! caller.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

use image::GrayImage;
use log::{debug, info};
use tempfile::NamedTempFile;

use crate::error::BinarizeError;

/// Loads a `width` x `height` raster from `path`. Bytes past the end of the
/// raster are ignored; a file shorter than the raster is an error.
pub fn read_raw_image(path: &Path, height: u32, width: u32)
                      -> Result<GrayImage, BinarizeError> {
    let read_start = Instant::now();
    let expected = height as usize * width as usize;
    let mut pixels = fs::read(path).map_err(|e| BinarizeError::io(path, e))?;
    let actual = pixels.len();
    let short_read = || BinarizeError::ShortRead {
        path: path.to_path_buf(), width, height, expected, actual };
    if actual < expected {
        return Err(short_read());
    }
    if actual > expected {
        debug!("Ignoring {} trailing bytes of {:?}", actual - expected, path);
        pixels.truncate(expected);
    }
    let image = GrayImage::from_raw(width, height, pixels).ok_or_else(short_read)?;
    info!("Read {}x{} raster from {:?} in {:?}",
          width, height, path, read_start.elapsed());
    Ok(image)
}

/// Stores `image` at `path` as raw bytes. The data goes to a temporary file
/// next to `path` which is renamed over `path` only once fully written; on
/// failure no file is left behind.
pub fn write_raw_image(path: &Path, image: &GrayImage) -> Result<(), BinarizeError> {
    let write_start = Instant::now();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(|e| BinarizeError::io(path, e))?;
    file.write_all(image.as_raw()).map_err(|e| BinarizeError::io(path, e))?;
    file.as_file().sync_all().map_err(|e| BinarizeError::io(path, e))?;
    file.persist(path).map_err(|e| BinarizeError::io(path, e.error))?;
    info!("Wrote {}x{} raster to {:?} in {:?}",
          image.width(), image.height(), path, write_start.elapsed());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use imageproc::gray_image;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raster.raw");
        let image = gray_image!(
            0, 1, 2;
            127, 253, 254);
        write_raw_image(&path, &image).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![0, 1, 2, 127, 253, 254]);

        let loaded = read_raw_image(&path, 2, 3).unwrap();
        assert_eq!(loaded.dimensions(), (3, 2));
        assert_eq!(loaded.as_raw(), image.as_raw());
    }

    #[test]
    fn test_overwrites_existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raster.raw");
        fs::write(&path, [9_u8; 32]).unwrap();
        write_raw_image(&path, &gray_image!(7, 8)).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_missing_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_input.raw");
        let err = read_raw_image(&path, 4, 4).unwrap_err();
        assert!(matches!(err, BinarizeError::Io { .. }));
        assert!(err.to_string().contains("no_such_input.raw"), "{}", err);
    }

    #[test]
    fn test_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.raw");
        fs::write(&path, [1_u8; 10]).unwrap();
        match read_raw_image(&path, 4, 4) {
            Err(BinarizeError::ShortRead { expected, actual, .. }) => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 10);
            },
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.raw");
        fs::write(&path, [1_u8, 2, 3, 4, 5, 6]).unwrap();
        let image = read_raw_image(&path, 2, 2).unwrap();
        assert_eq!(image.as_raw(), &vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_failed_write_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("out.raw");
        let err = write_raw_image(&path, &gray_image!(1, 2)).unwrap_err();
        assert!(err.to_string().contains("out.raw"), "{}", err);
        assert!(!path.exists());
    }
}  // mod tests.
