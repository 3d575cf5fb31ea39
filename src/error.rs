use std::path::PathBuf;

use thiserror::Error;

/// An error when building or loading a point set
#[derive(Error, Debug)]
pub enum PointsError {
    #[error("expected 2 columns (x, y), got {0}")]
    Columns(usize),
    #[error("point {0} has a non-finite coordinate")]
    NonFinite(usize),
    #[error("invalid blob spread {0}")]
    Spread(f32),
    #[error("{path}:{line}: cannot parse point from {text:?}")]
    Parse {
        path: PathBuf,
        line: usize,
        text: String,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read npy file {path}: {source}")]
    ReadNpy {
        path: PathBuf,
        #[source]
        source: ndarray_npy::ReadNpyError,
    },
    #[error("failed to write npy file {path}: {source}")]
    WriteNpy {
        path: PathBuf,
        #[source]
        source: ndarray_npy::WriteNpyError,
    },
}

/// An error when fitting with an invalid hyperparameter
#[derive(Error, Debug, PartialEq)]
pub enum KMeansParamsError {
    #[error("n_clusters cannot be 0")]
    NClusters,
    #[error("n_runs cannot be 0")]
    NRuns,
    #[error("max_iters cannot be 0")]
    MaxIters,
    #[error("tolerance must be finite and greater than 0")]
    Tolerance,
}

/// An error when fitting or using a k-means model
#[derive(Error, Debug, PartialEq)]
pub enum KMeansError {
    #[error("invalid hyperparameter: {0}")]
    InvalidParams(#[from] KMeansParamsError),
    #[error("cannot find {n_clusters} clusters in {n_samples} points")]
    NotEnoughPoints { n_samples: usize, n_clusters: usize },
    #[error("model was fitted on {expected} features, got {found}")]
    FeatureMismatch { expected: usize, found: usize },
}

/// An error when rendering a chart
#[derive(Error, Debug)]
pub enum PlotError {
    #[error("got {labels} labels for {points} points")]
    LabelCount { points: usize, labels: usize },
    #[error("expected 2 centroid columns (x, y), got {0}")]
    CentroidColumns(usize),
    #[error("nothing to plot")]
    Empty,
    #[error("drawing failed: {0}")]
    Drawing(String),
}
