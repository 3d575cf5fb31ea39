use std::fs;
use std::path::Path;

use log::debug;
use ndarray::{s, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_npy::{read_npy, write_npy, ReadNpyError};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Normal;

use crate::error::PointsError;

/// An ordered set of 2D points, one row per point.
#[derive(Clone, Debug, PartialEq)]
pub struct PointSet {
    coords: Array2<f32>,
}

impl PointSet {
    /// Wraps an `(n, 2)` array. Rejects other shapes and non-finite values.
    pub fn new(coords: Array2<f32>) -> Result<Self, PointsError> {
        if coords.ncols() != 2 {
            return Err(PointsError::Columns(coords.ncols()));
        }
        if let Some(i) = coords
            .axis_iter(Axis(0))
            .position(|row| row.iter().any(|v| !v.is_finite()))
        {
            return Err(PointsError::NonFinite(i));
        }
        Ok(PointSet { coords })
    }

    pub fn from_rows(rows: &[(f32, f32)]) -> Result<Self, PointsError> {
        let pairs: Vec<[f32; 2]> = rows.iter().map(|&(x, y)| [x, y]).collect();
        Self::new(Array2::from(pairs))
    }

    /// Loads points from a `.npy` file or a text file of `x,y` lines.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PointsError> {
        let path = path.as_ref();
        let points = if is_npy(path) {
            Self::new(load_npy(path)?)?
        } else {
            let text = fs::read_to_string(path).map_err(|source| PointsError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_text(path, &text)?
        };
        debug!("loaded {} points from {}", points.len(), path.display());
        Ok(points)
    }

    /// Writes the points as `.npy` or as `x,y` text lines, depending on the extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PointsError> {
        let path = path.as_ref();
        if is_npy(path) {
            return write_npy(path, &self.coords).map_err(|source| PointsError::WriteNpy {
                path: path.to_path_buf(),
                source,
            });
        }
        let mut out = String::with_capacity(self.len() * 24);
        for row in self.coords.axis_iter(Axis(0)) {
            out.push_str(&format!("{},{}\n", row[0], row[1]));
        }
        fs::write(path, out).map_err(|source| PointsError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn len(&self) -> usize {
        self.coords.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.nrows() == 0
    }

    pub fn view(&self) -> ArrayView2<'_, f32> {
        self.coords.view()
    }

    /// Column 0.
    pub fn xs(&self) -> ArrayView1<'_, f32> {
        self.coords.column(0)
    }

    /// Column 1.
    pub fn ys(&self) -> ArrayView1<'_, f32> {
        self.coords.column(1)
    }

    /// `((min_x, max_x), (min_y, max_y))`, or `None` for an empty set.
    pub fn bounds(&self) -> Option<((f32, f32), (f32, f32))> {
        if self.is_empty() {
            return None;
        }
        let span = |col: ArrayView1<f32>| {
            col.iter()
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v), hi.max(v))
                })
        };
        Some((span(self.xs()), span(self.ys())))
    }

    pub fn into_inner(self) -> Array2<f32> {
        self.coords
    }
}

fn is_npy(path: &Path) -> bool {
    path.extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("npy"))
}

fn load_npy(path: &Path) -> Result<Array2<f32>, PointsError> {
    let err = |source| PointsError::ReadNpy {
        path: path.to_path_buf(),
        source,
    };
    match read_npy::<_, Array2<f32>>(path) {
        Ok(coords) => Ok(coords),
        // numpy writes float64 unless told otherwise
        Err(ReadNpyError::WrongDescriptor(_)) => read_npy::<_, Array2<f64>>(path)
            .map(|coords| coords.mapv(|v| v as f32))
            .map_err(err),
        Err(e) => Err(err(e)),
    }
}

fn parse_text(path: &Path, text: &str) -> Result<PointSet, PointsError> {
    let mut pairs: Vec<[f32; 2]> = Vec::new();
    // one non-numeric line is allowed ahead of the data
    let mut header_allowed = true;
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let parsed: Option<Vec<f32>> = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|f| !f.is_empty())
            .map(|f| f.parse::<f32>().ok())
            .collect();
        match parsed {
            Some(values) if values.len() == 2 => pairs.push([values[0], values[1]]),
            None if header_allowed => {}
            _ => {
                return Err(PointsError::Parse {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    text: raw.to_string(),
                })
            }
        }
        header_allowed = false;
    }
    PointSet::new(Array2::from(pairs))
}

/// Samples `blob_size` points around each center from a normal
/// distribution with the given standard deviation. Blobs are laid out
/// one after the other.
pub fn generate_blobs(
    blob_size: usize,
    centers: &ArrayView2<f32>,
    std_dev: f32,
    rng: &mut impl Rng,
) -> Result<PointSet, PointsError> {
    if centers.ncols() != 2 {
        return Err(PointsError::Columns(centers.ncols()));
    }
    let noise = Normal::new(0.0, std_dev).map_err(|_| PointsError::Spread(std_dev))?;
    let mut coords = Array2::<f32>::zeros((centers.nrows() * blob_size, 2));
    for (i, center) in centers.axis_iter(Axis(0)).enumerate() {
        let mut blob = Array2::random_using((blob_size, 2), noise, rng);
        blob += &center;
        coords
            .slice_mut(s![i * blob_size..(i + 1) * blob_size, ..])
            .assign(&blob);
    }
    PointSet::new(coords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::io::Write;

    #[test]
    fn rejects_wrong_shape() {
        let err = PointSet::new(Array2::zeros((4, 3))).unwrap_err();
        assert!(matches!(err, PointsError::Columns(3)));
    }

    #[test]
    fn rejects_nan() {
        let err = PointSet::new(array![[0.0, 1.0], [f32::NAN, 2.0]]).unwrap_err();
        assert!(matches!(err, PointsError::NonFinite(1)));
    }

    #[test]
    fn columns_and_bounds() {
        let points = PointSet::from_rows(&[(1.0, -2.0), (3.0, 4.0), (-1.0, 0.5)]).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points.xs().to_vec(), vec![1.0, 3.0, -1.0]);
        assert_eq!(points.ys().to_vec(), vec![-2.0, 4.0, 0.5]);
        assert_eq!(points.bounds(), Some(((-1.0, 3.0), (-2.0, 4.0))));
        assert_eq!(PointSet::from_rows(&[]).unwrap().bounds(), None);
    }

    #[test]
    fn parses_text_with_header_comments_and_mixed_separators() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "x,y").unwrap();
        writeln!(file, "# three points").unwrap();
        writeln!(file, "0.06, -0.36").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "-0.08 0.07   # trailing comment").unwrap();
        writeln!(file, "-0.57\t-0.34").unwrap();

        let points = PointSet::load(file.path()).unwrap();
        assert_eq!(points.len(), 3);
        assert_abs_diff_eq!(points.xs()[2], -0.57, epsilon = 1e-6);
        assert_abs_diff_eq!(points.ys()[1], 0.07, epsilon = 1e-6);
    }

    #[test]
    fn reports_bad_line_number() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1,2").unwrap();
        writeln!(file, "3,oops").unwrap();

        match PointSet::load(file.path()).unwrap_err() {
            PointsError::Parse { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn second_header_line_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "x,y").unwrap();
        writeln!(file, "again").unwrap();
        writeln!(file, "1,2").unwrap();

        assert!(matches!(
            PointSet::load(file.path()),
            Err(PointsError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn three_fields_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "1,2,3").unwrap();
        assert!(matches!(
            PointSet::load(file.path()),
            Err(PointsError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn save_and_load_text_and_npy() {
        let dir = tempfile::tempdir().unwrap();
        let points = PointSet::from_rows(&[(0.25, 1.5), (-3.0, 2.0)]).unwrap();

        for name in ["points.txt", "points.npy"] {
            let path = dir.path().join(name);
            points.save(&path).unwrap();
            assert_eq!(PointSet::load(&path).unwrap(), points);
        }
    }

    #[test]
    fn loads_float64_npy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f64.npy");
        write_npy(&path, &array![[1.0f64, 2.0], [3.0, 4.0]]).unwrap();

        let points = PointSet::load(&path).unwrap();
        assert_eq!(points.xs().to_vec(), vec![1.0, 3.0]);
    }

    #[test]
    fn blobs_surround_their_centers() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let centers = array![[10.0f32, 10.0], [-5.0, 3.0]];
        let points = generate_blobs(200, &centers.view(), 0.5, &mut rng).unwrap();
        assert_eq!(points.len(), 400);

        let first = points.view().slice_move(s![..200, ..]);
        let mean = first.mean_axis(Axis(0)).unwrap();
        assert_abs_diff_eq!(mean[0], 10.0, epsilon = 0.2);
        assert_abs_diff_eq!(mean[1], 10.0, epsilon = 0.2);
    }
}
