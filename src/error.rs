// Copyright (c) 2025 Steven Rosenthal smr@dt3.org
// See LICENSE file in root directory for license terms.

use std::path::PathBuf;

use thiserror::Error;

use crate::comm::CommError;

#[derive(Debug, Error)]
pub enum BinarizeError {
    #[error("error accessing file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file {} holds {actual} bytes, expected {expected} for a {width}x{height} raster",
            .path.display())]
    ShortRead {
        path: PathBuf,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("worker count must be at least 1")]
    NoWorkers,

    #[error(transparent)]
    Comm(#[from] CommError),

    #[error("worker rank {rank} panicked")]
    WorkerPanicked { rank: usize },
}

impl BinarizeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BinarizeError::Io { path: path.into(), source }
    }

    /// True for failures that only report that some other rank went down
    /// first.
    pub fn is_secondary(&self) -> bool {
        match self {
            BinarizeError::Comm(e) => e.is_secondary(),
            _ => false,
        }
    }
}
