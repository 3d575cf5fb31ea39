use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::info;
use ndarray::{array, Array1};
use ndarray_npy::write_npy;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use pointclust::{
    cluster_scatter, generate_blobs, scatter, FittedKMeans, KMeans, KMeansInit, PlotOptions,
    PointSet,
};

#[derive(Parser)]
#[command(name = "pointclust", about = "k-means clustering of 2D points", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scatter plot of the raw points, to eyeball how many clusters there are
    Scatter {
        points: PathBuf,
        #[arg(short, long, default_value = "scatter.png")]
        out: PathBuf,
    },
    /// Fit on POINTS and print the cluster labels of NEW_POINTS
    Predict {
        points: PathBuf,
        new_points: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
        /// Also write the labels as a .npy file
        #[arg(long)]
        labels_out: Option<PathBuf>,
    },
    /// Fit, predict, then plot NEW_POINTS colored by label with the centroids
    Inspect {
        points: PathBuf,
        new_points: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
        #[arg(short, long, default_value = "clusters.png")]
        out: PathBuf,
    },
    /// Generate three blobs and walk through scatter, predict and inspect
    Tour {
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[derive(Args)]
struct ModelArgs {
    /// Number of clusters
    #[arg(short = 'k', long, default_value_t = 3)]
    clusters: usize,
    #[arg(long, default_value_t = 300)]
    max_iters: usize,
    #[arg(long, default_value_t = 10)]
    n_runs: usize,
    #[arg(long, value_enum, default_value_t = Init::KmeansPlusPlus)]
    init: Init,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Clone, Copy, ValueEnum)]
enum Init {
    Random,
    KmeansPlusPlus,
}

impl ModelArgs {
    fn params(&self) -> KMeans {
        let init = match self.init {
            Init::Random => KMeansInit::Random,
            Init::KmeansPlusPlus => KMeansInit::KMeansPlusPlus,
        };
        let params = KMeans::new(self.clusters)
            .max_iters(self.max_iters)
            .n_runs(self.n_runs)
            .init(init);
        match self.seed {
            Some(seed) => params.seed(seed),
            None => params,
        }
    }
}

fn load(path: &Path) -> Result<PointSet> {
    PointSet::load(path).with_context(|| format!("loading points from {}", path.display()))
}

fn run_scatter(points: &PointSet, out: &Path) -> Result<()> {
    info!("plotting {} points", points.len());
    let opts = PlotOptions {
        title: "How many clusters?".into(),
        ..Default::default()
    };
    scatter(points, out, &opts).with_context(|| format!("plotting {}", out.display()))
}

fn fit_and_predict(
    points: &PointSet,
    new_points: &PointSet,
    model: &ModelArgs,
) -> Result<(FittedKMeans, Array1<usize>)> {
    let fitted = model.params().fit(&points.view()).context("fitting k-means")?;
    let labels = fitted
        .predict(&new_points.view())
        .context("predicting labels")?;
    Ok((fitted, labels))
}

fn run_predict(
    points: &PointSet,
    new_points: &PointSet,
    model: &ModelArgs,
) -> Result<(FittedKMeans, Array1<usize>)> {
    let (fitted, labels) = fit_and_predict(points, new_points, model)?;
    println!("{}", labels);
    Ok((fitted, labels))
}

/// Prints the per-cluster counts of `labels` and plots `new_points` with the
/// model's centroids.
fn render_clusters(
    new_points: &PointSet,
    fitted: &FittedKMeans,
    labels: &Array1<usize>,
    out: &Path,
) -> Result<()> {
    println!("Centroids:\n{}", fitted.centroids());
    println!("Cluster Assignment Counts:");
    for cluster_id in 0..fitted.n_clusters() {
        let count = labels.iter().filter(|&&x| x == cluster_id).count();
        println!("Cluster {}: {} points", cluster_id, count);
    }

    let opts = PlotOptions {
        title: format!("{} clusters", fitted.n_clusters()),
        ..Default::default()
    };
    cluster_scatter(new_points, labels, fitted.centroids(), out, &opts)
        .with_context(|| format!("plotting {}", out.display()))
}

fn run_inspect(points: &PointSet, new_points: &PointSet, model: &ModelArgs, out: &Path) -> Result<()> {
    let (fitted, labels) = fit_and_predict(points, new_points, model)?;
    render_clusters(new_points, &fitted, &labels, out)
}

/// Runs the three steps on generated data. The model fitted in step 2 and
/// the labels it printed are the ones plotted in step 3, and are returned.
fn run_tour(out_dir: &Path, model: &ModelArgs) -> Result<(FittedKMeans, Array1<usize>)> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let mut rng = match model.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };
    let centers = array![[-1.5f32, -0.5], [0.3, 1.2], [1.4, -0.8]];
    let points = generate_blobs(100, &centers.view(), 0.35, &mut rng)?;
    let new_points = generate_blobs(30, &centers.view(), 0.35, &mut rng)?;

    let points_path = out_dir.join("points.txt");
    let new_points_path = out_dir.join("new_points.txt");
    points.save(&points_path)?;
    new_points.save(&new_points_path)?;
    println!(
        "Generated {} points and {} new points around {} centers",
        points.len(),
        new_points.len(),
        centers.nrows()
    );

    println!("\nStep 1: scatter plot of the points");
    run_scatter(&points, &out_dir.join("scatter.png"))?;

    println!("\nStep 2: labels of the new points");
    let (fitted, labels) = run_predict(&points, &new_points, model)?;

    println!("\nStep 3: clusters and centroids");
    render_clusters(&new_points, &fitted, &labels, &out_dir.join("clusters.png"))?;
    Ok((fitted, labels))
}

fn main() -> Result<()> {
    env_logger::init_from_env(Env::default().filter_or("RUST_LOG", "info"));

    match Cli::parse().command {
        Command::Scatter { points, out } => run_scatter(&load(&points)?, &out),
        Command::Predict {
            points,
            new_points,
            model,
            labels_out,
        } => {
            let (_, labels) = run_predict(&load(&points)?, &load(&new_points)?, &model)?;
            if let Some(path) = labels_out {
                write_npy(&path, &labels.mapv(|l| l as u64))
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            Ok(())
        }
        Command::Inspect {
            points,
            new_points,
            model,
            out,
        } => run_inspect(&load(&points)?, &load(&new_points)?, &model, &out),
        Command::Tour { out_dir, model } => run_tour(&out_dir, &model).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn model_flags() {
        let cli = Cli::parse_from([
            "pointclust", "predict", "a.txt", "b.npy", "-k", "4", "--init", "random", "--seed", "7",
        ]);
        let Command::Predict { model, .. } = cli.command else {
            panic!("expected predict");
        };
        let params = model.params();
        assert_eq!(params.n_clusters, 4);
        assert_eq!(params.init, KMeansInit::Random);
        assert_eq!(params.seed, Some(7));
        assert_eq!(params.n_runs, 10);
    }

    #[test]
    fn predict_on_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let centers = array![[0.0f32, 0.0], [10.0, 10.0]];
        let points = generate_blobs(20, &centers.view(), 0.5, &mut rng).unwrap();
        let new_points = PointSet::from_rows(&[(0.2, -0.1), (9.8, 10.3), (0.1, 0.4)]).unwrap();
        points.save(dir.path().join("p.txt")).unwrap();
        new_points.save(dir.path().join("n.npy")).unwrap();

        let cli = Cli::parse_from(["pointclust", "predict", "p.txt", "n.npy", "-k", "2", "--seed", "1"]);
        let Command::Predict { model, .. } = cli.command else {
            panic!("expected predict");
        };
        let (_, labels) = run_predict(
            &load(&dir.path().join("p.txt")).unwrap(),
            &load(&dir.path().join("n.npy")).unwrap(),
            &model,
        )
        .unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels[0], labels[2]);
        assert_ne!(labels[0], labels[1]);
    }

    fn tour_args(seed: Option<u64>) -> ModelArgs {
        let mut args = vec!["pointclust".to_string(), "tour".to_string()];
        if let Some(seed) = seed {
            args.extend(["--seed".to_string(), seed.to_string()]);
        }
        let Command::Tour { model, .. } = Cli::parse_from(args).command else {
            panic!("expected tour");
        };
        model
    }

    #[test]
    fn tour_writes_all_outputs() {
        let dir = tempfile::tempdir().unwrap();
        run_tour(dir.path(), &tour_args(Some(3))).unwrap();
        for name in ["points.txt", "new_points.txt", "scatter.png", "clusters.png"] {
            let meta = fs::metadata(dir.path().join(name)).unwrap();
            assert!(meta.len() > 0, "{name} is empty");
        }
        assert_eq!(load(&dir.path().join("points.txt")).unwrap().len(), 300);
    }

    #[test]
    fn tour_plots_the_labels_it_printed() {
        // unseeded, so a second fit would likely relabel the clusters
        let dir = tempfile::tempdir().unwrap();
        let (fitted, labels) = run_tour(dir.path(), &tour_args(None)).unwrap();

        let new_points = load(&dir.path().join("new_points.txt")).unwrap();
        assert_eq!(labels.len(), new_points.len());
        assert_eq!(fitted.predict(&new_points.view()).unwrap(), labels);
    }

    #[test]
    fn inspect_on_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let centers = array![[0.0f32, 0.0], [6.0, 6.0]];
        let points = generate_blobs(15, &centers.view(), 0.3, &mut rng).unwrap();
        let new_points = generate_blobs(5, &centers.view(), 0.3, &mut rng).unwrap();

        let out = dir.path().join("clusters.svg");
        run_inspect(&points, &new_points, &tour_args(Some(1)), &out).unwrap();
        assert!(fs::metadata(&out).unwrap().len() > 0);
    }
}
