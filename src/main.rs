use std::{
	fs::{self, File},
	path::{Path, PathBuf},
};

use clap::{Args, Parser, Subcommand};
use evopaint::{
	checkpoint::{Checkpoint, Snapshot},
	evolve::{random_seed, Evolution, Progress},
	fitness::ImageFitness,
	genes::{CircleKind, LetterKind, PolygonKind},
	genetic::Representation,
	genome::DnaTools,
	mesh::MeshTools,
	params::{GeneSpecs, Kind, RunConfig},
	raster::{FontGlyphs, SoftRasterizer},
	selection::AnyPolicy,
};
use eyre::WrapErr;
use image::{imageops::FilterType, RgbImage};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
	#[command(subcommand)]
	pub command: Command,

	/// Seed for the run; random if unset
	#[arg(short, long, global = true)]
	pub seed: Option<u64>,

	/// TrueType font for letter genomes; a system sans-serif if unset
	#[arg(long, global = true)]
	pub font: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Evolve a fresh population towards a target image
	Evolve {
		/// Target image
		target: PathBuf,

		/// Run configuration (TOML)
		#[arg(short = 'F', long)]
		config: PathBuf,

		#[command(flatten)]
		run: RunArgs,
	},
	/// Continue evolving the genome stored in a checkpoint
	Resume {
		/// Target image; resized to the checkpoint's canvas if needed
		target: PathBuf,

		/// Checkpoint to continue from
		#[arg(short, long)]
		checkpoint: PathBuf,

		/// Mutations applied to each copy of the checkpoint genome
		#[arg(long, default_value_t = 5)]
		reseed_mutations: usize,

		#[command(flatten)]
		run: RunArgs,
	},
	/// Render a checkpoint, optionally at a larger width
	Draw {
		checkpoint: PathBuf,

		/// Output image
		#[arg(short, long)]
		out: PathBuf,

		/// Width of the rendering; height follows the checkpoint's aspect
		#[arg(short, long)]
		width: Option<u32>,
	},
}

#[derive(Args, Debug)]
pub struct RunArgs {
	/// Number of generations to run
	#[arg(short = 'g', long, default_value_t = 1000)]
	pub steps: usize,

	/// Output image of the best genome
	#[arg(short, long, default_value = "out.png")]
	pub out: PathBuf,

	/// Checkpoint output (defaults to the output image with a .json extension)
	#[arg(long)]
	pub save: Option<PathBuf>,

	/// Log progress every this many generations (0 to disable)
	#[arg(long, default_value_t = 100)]
	pub report: usize,

	/// Shrink the target to this width before evolving
	#[arg(short, long)]
	pub width: Option<u32>,

	/// Directory for progress frames, written whenever the best improves by 5%
	#[arg(long)]
	pub frames: Option<PathBuf>,

	/// CSV file for per-report statistics
	#[arg(long)]
	pub stats: Option<PathBuf>,
}

#[derive(Serialize)]
struct StatsRow {
	generation: usize,
	best: f64,
	mean: f64,
	worst: f64,
}

/// Progress observer: logs, dumps frames and writes statistics.
struct Reporter {
	report: usize,
	frames: Option<PathBuf>,
	last_frame: f64,
	stats: Option<csv::Writer<File>>,
}

impl Reporter {
	fn new(args: &RunArgs) -> eyre::Result<Self> {
		if let Some(dir) = &args.frames {
			fs::create_dir_all(dir).wrap_err_with(|| format!("creating {}", dir.display()))?;
		}
		let stats = match &args.stats {
			Some(path) => Some(csv::Writer::from_path(path).wrap_err_with(|| format!("creating {}", path.display()))?),
			None => None,
		};
		Ok(Reporter {
			report: args.report,
			frames: args.frames.clone(),
			last_frame: f64::INFINITY,
			stats,
		})
	}

	fn observe<R: Representation>(&mut self, progress: &Progress<'_, R, SoftRasterizer>) -> eyre::Result<()> {
		let generation = progress.generation();
		let (Some(best), Some(worst)) = (progress.best(), progress.population.worst()) else {
			return Ok(());
		};
		let (best, worst) = (best.fitness, worst.fitness);

		if let Some(dir) = &self.frames {
			if best < self.last_frame * 0.95 {
				if let Some(frame) = progress.render_best() {
					let path = dir.join(format!("step_{generation}.png"));
					frame.save(&path).wrap_err_with(|| format!("writing {}", path.display()))?;
					log::debug!("Saved frame {}.", path.display());
				}
				self.last_frame = best;
			}
		}

		if self.report > 0 && generation % self.report == 0 {
			let mean = progress.population.mean_fitness();
			log::info!(
				"Generation {generation}: best {best:.4}, mean {mean:.4}, worst {worst:.4} (spread {:.4}).",
				worst - best
			);
			if let Some(writer) = &mut self.stats {
				writer.serialize(StatsRow {
					generation,
					best,
					mean,
					worst,
				})?;
				writer.flush()?;
			}
		}
		Ok(())
	}
}

fn load_target(path: &Path, width: Option<u32>) -> eyre::Result<RgbImage> {
	let target = image::open(path)
		.wrap_err_with(|| format!("opening target {}", path.display()))?
		.to_rgb8();
	Ok(match width {
		Some(w) if w != target.width() => {
			let h = ((target.height() as f64 * w as f64 / target.width() as f64).round() as u32).max(1);
			image::imageops::resize(&target, w, h, FilterType::Triangle)
		}
		_ => target,
	})
}

/// Rasterizer for `kind`. Letters are drawn with a font, falling back to blocks when none is found.
fn rasterizer(kind: Kind, font: Option<&Path>) -> eyre::Result<SoftRasterizer> {
	if kind != Kind::Letter {
		return Ok(SoftRasterizer::default());
	}
	if let Some(path) = font {
		return Ok(SoftRasterizer::new(FontGlyphs::load(path)?));
	}
	Ok(match FontGlyphs::system() {
		Some(glyphs) => SoftRasterizer::new(glyphs),
		None => {
			log::warn!("No system font found, letters are drawn as blocks. Pass --font to choose one.");
			SoftRasterizer::default()
		}
	})
}

/// Runs the engine, then writes the best rendering and a checkpoint.
fn drive<R>(mut evo: Evolution<R>, args: &RunArgs) -> eyre::Result<()>
where
	R: Representation,
	Snapshot<R::Specs, R::Genome>: Into<Checkpoint>,
{
	let mut reporter = Reporter::new(args)?;
	evo.run(args.steps, |progress| reporter.observe(progress))?;

	if let Some(image) = evo.progress().render_best() {
		image
			.save(&args.out)
			.wrap_err_with(|| format!("writing {}", args.out.display()))?;
		log::info!("Saved best rendering to {}.", args.out.display());
	}
	if let Some(snapshot) = evo.snapshot() {
		let path = args.save.clone().unwrap_or_else(|| args.out.with_extension("json"));
		let checkpoint: Checkpoint = snapshot.into();
		checkpoint.save(path)?;
	}
	Ok(())
}

fn evolve<R>(
	repr: R,
	target: RgbImage,
	rasterizer: SoftRasterizer,
	policy: AnyPolicy,
	seed: u64,
	args: &RunArgs,
) -> eyre::Result<()>
where
	R: Representation,
	Snapshot<R::Specs, R::Genome>: Into<Checkpoint>,
{
	let pop_size = repr.evo_specs().pop_size;
	let fitness = ImageFitness::new(target, rasterizer)?;
	let mut evo = Evolution::new(repr, fitness, policy, seed)?;
	evo.seed(pop_size)?;
	drive(evo, args)
}

fn resume<R>(
	snapshot: Snapshot<R::Specs, R::Genome>,
	target: RgbImage,
	rasterizer: SoftRasterizer,
	seed: u64,
	reseed_mutations: usize,
	args: &RunArgs,
) -> eyre::Result<()>
where
	R: Representation,
	Snapshot<R::Specs, R::Genome>: Into<Checkpoint>,
{
	let (w, h) = (snapshot.width, snapshot.height);
	let target = if target.dimensions() != (w, h) {
		log::warn!(
			"Target is {:?}, resizing to the checkpoint's {w}x{h}.",
			target.dimensions()
		);
		image::imageops::resize(&target, w, h, FilterType::Triangle)
	} else {
		target
	};
	let policy = AnyPolicy::from_specs(&snapshot.policy)?;
	let fitness = ImageFitness::new(target, rasterizer)?;
	let evo = Evolution::<R>::resume(snapshot, fitness, policy, seed, reseed_mutations)?;
	drive(evo, args)
}

fn main() -> eyre::Result<()> {
	pretty_env_logger::init();

	let cli = Cli::parse();
	let seed = cli.seed.unwrap_or_else(random_seed);
	let font = cli.font.as_deref();

	match &cli.command {
		Command::Evolve { target, config, run } => {
			let config = RunConfig::load(config)?;
			let target = load_target(target, run.width)?;
			let (w, h) = target.dimensions();
			let policy = AnyPolicy::from_specs(&config.policy)?;
			let raster = rasterizer(config.kind(), font)?;
			log::info!("Evolving {} genomes on a {w}x{h} target.", config.kind());
			match config.genes {
				GeneSpecs::Circle(s) => {
					evolve(DnaTools::<CircleKind>::from_specs(w, h, s, config.evo)?, target, raster, policy, seed, run)
				}
				GeneSpecs::Polygon(s) => {
					evolve(DnaTools::<PolygonKind>::from_specs(w, h, s, config.evo)?, target, raster, policy, seed, run)
				}
				GeneSpecs::Letter(s) => {
					evolve(DnaTools::<LetterKind>::from_specs(w, h, s, config.evo)?, target, raster, policy, seed, run)
				}
				GeneSpecs::Mesh(s) => evolve(MeshTools::from_specs(w, h, s, config.evo)?, target, raster, policy, seed, run),
			}
		}
		Command::Resume {
			target,
			checkpoint,
			reseed_mutations,
			run,
		} => {
			let target = load_target(target, None)?;
			let checkpoint = Checkpoint::load(checkpoint)?;
			log::info!("Resuming {} checkpoint from step {}.", checkpoint.kind(), checkpoint.steps());
			let n = *reseed_mutations;
			let raster = rasterizer(checkpoint.kind(), font)?;
			match checkpoint {
				Checkpoint::Circle(s) => resume::<DnaTools<CircleKind>>(s, target, raster, seed, n, run),
				Checkpoint::Polygon(s) => resume::<DnaTools<PolygonKind>>(s, target, raster, seed, n, run),
				Checkpoint::Letter(s) => resume::<DnaTools<LetterKind>>(s, target, raster, seed, n, run),
				Checkpoint::Mesh(s) => resume::<MeshTools>(s, target, raster, seed, n, run),
			}
		}
		Command::Draw { checkpoint, out, width } => {
			let checkpoint = Checkpoint::load(checkpoint)?;
			let image = checkpoint.render(&rasterizer(checkpoint.kind(), font)?, *width)?;
			image.save(out).wrap_err_with(|| format!("writing {}", out.display()))?;
			log::info!("Drew {} checkpoint to {}.", checkpoint.kind(), out.display());
			Ok(())
		}
	}
}
