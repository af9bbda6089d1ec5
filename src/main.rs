use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use geoglyph::core::{
    generate_cloud_mask, validate_directory, CoverageThresholds, SiteOutcome,
    DEFAULT_CLOUD_CLASSES,
};
use geoglyph::{ExtractionConfig, FeatureExtractor, RasterizeMode};

#[derive(Parser, Debug)]
#[command(
    name = "geoglyph",
    version,
    about = "Per-site feature extraction from vegetation, terrain and hydrography layers"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract one feature row per site and write the labeled table
    Extract {
        /// JSON configuration (omit to use the default data layout)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Site table (CSV with lat,lon columns or a point vector layer)
        #[arg(long)]
        sites: Option<PathBuf>,

        /// Root directory for raster inputs
        #[arg(long)]
        raster_root: Option<PathBuf>,

        /// Root directory for hydrography vectors
        #[arg(long)]
        vector_root: Option<PathBuf>,

        /// Output CSV path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sample hydrography segments at half-pixel spacing instead of vertices only
        #[arg(long)]
        densify: bool,

        /// Process sites concurrently (rows are sorted by lat, lon)
        #[arg(long)]
        parallel: bool,
    },

    /// Derive a binary cloud mask from a scene classification layer
    CloudMask {
        /// Input SCL raster
        #[arg(long)]
        scl: PathBuf,

        /// Output mask GeoTIFF
        #[arg(short, long)]
        output: PathBuf,

        /// SCL classes flagged as invalid (defaults to 3,8,9)
        #[arg(long, value_delimiter = ',')]
        classes: Vec<u16>,
    },

    /// Screen the scenes on disk for coverage problems
    Validate {
        /// JSON configuration (omit to use the default data layout)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// 1-based scene band holding NDVI (scenes stack B04, B03, B02, NDVI)
        #[arg(long, default_value = "4")]
        band: usize,

        /// Largest acceptable cloud fraction
        #[arg(long, default_value = "0.5")]
        max_cloud_fraction: f64,

        /// Smallest acceptable mean vegetation index
        #[arg(long, default_value = "5.0")]
        min_mean_ndvi: f64,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<ExtractionConfig> {
    match path {
        Some(path) => ExtractionConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(ExtractionConfig::default()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Extract {
            config,
            sites,
            raster_root,
            vector_root,
            output,
            densify,
            parallel,
        } => {
            let mut config = load_config(config.as_ref())?;
            if let Some(sites) = sites {
                config.site_table_path = sites;
            }
            if let Some(root) = raster_root {
                config.raster_root = root;
            }
            if let Some(root) = vector_root {
                config.vector_root = root;
            }
            if let Some(output) = output {
                config.output_path = output;
            }
            if densify {
                config.rasterize = RasterizeMode::Densified;
            }
            config.parallel |= parallel;

            let extractor = FeatureExtractor::new(config).context("Invalid configuration")?;
            let report = extractor.run().context("Feature extraction failed")?;

            for outcome in &report.outcomes {
                match outcome {
                    SiteOutcome::Skipped { key, missing } => {
                        println!("skipped {}: missing {:?}", key, missing)
                    }
                    SiteOutcome::Failed { key, reason } => println!("failed {}: {}", key, reason),
                    SiteOutcome::RowAppended { .. } => {}
                }
            }
            println!(
                "Saved {} rows to {} ({} skipped, {} failed)",
                report.appended_count(),
                extractor.config().output_path.display(),
                report.skipped_count(),
                report.failed_count()
            );
        }

        Command::CloudMask {
            scl,
            output,
            classes,
        } => {
            let classes = if classes.is_empty() {
                DEFAULT_CLOUD_CLASSES.to_vec()
            } else {
                classes
            };
            let mask = generate_cloud_mask(&scl, &output, &classes)
                .with_context(|| format!("Failed to build cloud mask from {}", scl.display()))?;
            let cloudy = mask.data.iter().filter(|&&v| v == 1).count();
            println!(
                "Cloud mask saved to {} ({:.1}% flagged)",
                output.display(),
                100.0 * cloudy as f64 / mask.data.len().max(1) as f64
            );
        }

        Command::Validate {
            config,
            band,
            max_cloud_fraction,
            min_mean_ndvi,
        } => {
            let config = load_config(config.as_ref())?;
            if band == 0 {
                anyhow::bail!("--band is 1-based; 0 is not a band");
            }
            let thresholds = CoverageThresholds {
                band,
                max_cloud_fraction,
                min_mean_ndvi,
            };
            let verdicts = validate_directory(&config, &thresholds).context("Validation failed")?;

            let mut acceptable = 0usize;
            for (key, verdict) in &verdicts {
                let marker = if verdict.is_acceptable() {
                    acceptable += 1;
                    "ok"
                } else {
                    "!!"
                };
                println!("[{}] {}: {}", marker, key, verdict);
            }
            println!("{} of {} scenes acceptable", acceptable, verdicts.len());
        }
    }

    Ok(())
}
