use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use image::{GrayImage, Luma};
use log::info;
use momentinvariants::config::{MomentsConfig, Radii};
use momentinvariants::moment_integrator::MomentIntegrator;
use momentinvariants::pattern_detector::PatternDetector;
use momentinvariants::similarity_balls::similarity_balls;
use momentinvariants::uniform_grid::{PointArray, UniformGrid};

use std::fs::File;
use std::io::{BufWriter, Write};

const INTENSITY: &str = "intensity";

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(author, version, about = "Moment invariants of grayscale images and pattern detection.")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the moments of an image at every pixel
    Moments {
        /// Image filename, read as grayscale
        image: String,

        #[command(flatten)]
        options: Options,

        /// Output text file, one `name value...` line per moment array
        #[arg(long, default_value = "moments.txt")]
        output: String,
    },

    /// Compute the similarity of every pixel of a field image to a pattern image
    Detect {
        /// Pattern image filename
        pattern: String,

        /// Field image filename
        field: String,

        #[command(flatten)]
        options: Options,

        /// Output text file, one `radius value...` line per radius
        #[arg(long, default_value = "similarity.txt")]
        output: String,

        /// Write one grayscale heat map per radius, named `<prefix>_<radius>.png`
        #[arg(long)]
        heat_map_prefix: Option<String>,

        /// Also write the local similarity maxima and their balls
        #[arg(long)]
        balls: bool,
    },
}

/// Options overriding the configuration file.
#[derive(Args, Debug)]
struct Options {
    /// JSON configuration file
    #[arg(long)]
    config: Option<String>,

    /// Maximum moment order (0..=5)
    #[arg(long)]
    order: Option<usize>,

    /// Integration radius in pixels; repeat for several radii
    #[arg(long)]
    radius: Vec<f64>,

    /// Integration radius relative to the smaller image side; repeat for several radii
    #[arg(long, conflicts_with = "radius")]
    relative_radius: Vec<f64>,

    /// Stencil nodes per axis; 0 integrates over the pixels themselves
    #[arg(long)]
    integration_steps: Option<usize>,

    /// Orientation samples per full turn when no dominant direction exists
    #[arg(long)]
    angle_resolution: Option<usize>,

    /// Treat mirror images as equal
    #[arg(long)]
    reflection: bool,

    /// Compare without rotation normalization
    #[arg(long)]
    no_rotation: bool,
}

impl Options {
    fn to_config(&self) -> Result<MomentsConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path).with_context(|| format!("Could not open config file {path}"))?;
                serde_json::from_reader(file).with_context(|| format!("Could not parse config file {path}"))?
            }
            None => MomentsConfig::default(),
        };
        if let Some(order) = self.order {
            config.order = order;
        }
        if !self.radius.is_empty() {
            config.radii = Radii::Absolute(self.radius.clone());
        }
        if !self.relative_radius.is_empty() {
            config.radii = Radii::Relative(self.relative_radius.clone());
        }
        if let Some(steps) = self.integration_steps {
            config.number_of_integration_steps = steps;
        }
        if let Some(resolution) = self.angle_resolution {
            config.angle_resolution = resolution;
        }
        if self.reflection {
            config.is_reflection = true;
        }
        if self.no_rotation {
            config.is_rotation = false;
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_micros()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Moments { image, options, output } => {
            let config = options.to_config()?;
            let grid = read_grid(&image)?;
            let moments = MomentIntegrator::compute(&grid, &config).context("Moment computation failed")?;
            let arrays = moments.to_named_arrays()?;
            write_arrays(&output, &arrays)?;
        }
        Command::Detect {
            pattern,
            field,
            options,
            output,
            heat_map_prefix,
            balls,
        } => {
            let config = options.to_config()?;
            let pattern = read_grid(&pattern)?;
            let field = read_grid(&field)?;
            let result = PatternDetector::new(config)
                .detect(&pattern, &field)
                .context("Pattern detection failed")?;
            write_arrays(&output, &result.similarities)?;

            if let Some(prefix) = heat_map_prefix {
                for array in &result.similarities {
                    save_heat_map(&field, array, &format!("{prefix}_{}.png", array.name))?;
                }
            }
            if balls {
                let balls = similarity_balls(&field, result.normalized_field.radii(), &result.similarities)?;
                let path = format!("{output}.balls");
                write_arrays(&path, &[balls.local_max_similarity, balls.balls])?;
            }
        }
    }

    info!("Done.");
    Ok(())
}

/// Writes one line per array: the name followed by its values.
fn write_arrays(path: &str, arrays: &[PointArray]) -> Result<()> {
    info!("Writing {} arrays to {path}", arrays.len());
    let file = File::create(path).with_context(|| format!("Could not create output file {path}"))?;
    let mut out = BufWriter::new(file);
    for array in arrays {
        write!(out, "{}", array.name)?;
        for value in &array.values {
            write!(out, " {value:.6e}")?;
        }
        writeln!(out)?;
    }
    out.flush().context("Failed to write output file")?;
    Ok(())
}

/// Loads an image as a 2D scalar field of intensities in `[0, 1]`, one grid
/// point per pixel, rows along y.
fn read_grid(filename: &str) -> Result<UniformGrid> {
    info!("Reading image file: {filename}");
    let img = image::open(filename)
        .with_context(|| format!("Could not load image {filename}"))?
        .to_luma8();
    let (width, height) = img.dimensions();
    if width < 2 || height < 2 {
        bail!("Image {filename} must be at least 2x2 pixels");
    }
    let values = img.pixels().map(|p| p.0[0] as f64 / 255.0).collect();
    let grid = UniformGrid::new([width as usize, height as usize, 1], [0.0; 3], [1.0; 3])?
        .with_point_array(PointArray::scalars(INTENSITY, values))?;
    Ok(grid)
}

/// Saves a similarity array as a grayscale image, scaled to the largest
/// finite similarity.
fn save_heat_map(grid: &UniformGrid, array: &PointArray, filename: &str) -> Result<()> {
    info!("Writing image {filename}");
    let [width, height, _] = grid.dimensions();
    let max = array
        .values
        .iter()
        .copied()
        .filter(|v| *v < f64::MAX)
        .fold(0.0, f64::max);
    let scale = if max > 0.0 { 255.0 / max } else { 0.0 };
    let img = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let value = array.values[x as usize + width * y as usize].min(max);
        Luma([(value * scale).round() as u8])
    });
    img.save(filename)
        .with_context(|| format!("Could not write image {filename}"))?;
    Ok(())
}
