//! k-means clustering of 2D point sets: load points, fit a model, predict
//! labels for new points and plot the result.

pub mod error;
pub mod kmeans;
pub mod plot;
pub mod points;

pub use error::{KMeansError, KMeansParamsError, PlotError, PointsError};
pub use kmeans::{DistanceMetric, FittedKMeans, KMeans, KMeansInit};
pub use plot::{cluster_scatter, scatter, PlotOptions};
pub use points::{generate_blobs, PointSet};
