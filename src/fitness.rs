//! Fitness evaluation against a target image.

use std::sync::Arc;

use image::RgbImage;
use rayon::iter::{IntoParallelIterator, ParallelIterator};

use crate::{
	errors::{ConfigError, DataError},
	genetic::Representation,
	population::Scored,
	raster::{Canvas, Rasterizer, SoftRasterizer},
};

/// Mean absolute difference over every pixel and RGB channel. Zero iff identical.
pub fn difference(a: &RgbImage, b: &RgbImage) -> Result<f64, DataError> {
	if a.dimensions() != b.dimensions() {
		return Err(DataError::DimensionMismatch {
			expected: a.dimensions(),
			actual: b.dimensions(),
		});
	}
	let total: u64 = a
		.as_raw()
		.iter()
		.zip(b.as_raw())
		.map(|(&x, &y)| x.abs_diff(y) as u64)
		.sum();
	Ok(total as f64 / a.as_raw().len().max(1) as f64)
}

/// Renders `genome` onto a fresh canvas sized to `repr`.
pub fn render<R, Z>(repr: &R, rasterizer: &Z, genome: &R::Genome) -> Result<Z::Canvas, DataError>
where
	R: Representation,
	Z: Rasterizer,
{
	let (w, h) = repr.dimensions();
	let mut canvas = rasterizer.new_canvas(w, h, repr.background(genome))?;
	repr.render(genome, &mut canvas);
	Ok(canvas)
}

/// Scores genomes by how far their rendering is from the target. Lower is better.
#[derive(Debug, Clone)]
pub struct ImageFitness<Z: Rasterizer = SoftRasterizer> {
	target: Arc<RgbImage>,
	rasterizer: Z,
}

impl<Z: Rasterizer> ImageFitness<Z> {
	pub fn new(target: impl Into<Arc<RgbImage>>, rasterizer: Z) -> Result<Self, ConfigError> {
		let target = target.into();
		let (w, h) = target.dimensions();
		if w == 0 || h == 0 {
			return Err(ConfigError::invalid(
				"target",
				format!("target image must be non-empty, got {w}x{h}"),
			));
		}
		Ok(ImageFitness { target, rasterizer })
	}

	pub fn target(&self) -> &RgbImage {
		&self.target
	}

	pub fn dimensions(&self) -> (u32, u32) {
		self.target.dimensions()
	}

	pub fn rasterizer(&self) -> &Z {
		&self.rasterizer
	}

	/// Renders at the representation's size and compares with the target.
	pub fn evaluate<R: Representation>(&self, repr: &R, genome: &R::Genome) -> Result<f64, DataError> {
		if repr.dimensions() != self.dimensions() {
			return Err(DataError::DimensionMismatch {
				expected: repr.dimensions(),
				actual: self.dimensions(),
			});
		}
		let canvas = render(repr, &self.rasterizer, genome)?;
		difference(&self.target, &canvas.into_image())
	}

	/// [`evaluate`](Self::evaluate) for use inside the engine, where dimensions were
	/// checked up front. A genome that cannot be scored ranks last.
	pub fn score<R: Representation>(&self, repr: &R, genome: &R::Genome) -> f64 {
		self.evaluate(repr, genome).unwrap_or_else(|e| {
			log::error!("Scoring failed: {e}.");
			f64::INFINITY
		})
	}

	/// Scores a batch across the rayon pool, keeping input order.
	pub fn evaluate_all<R: Representation>(&self, repr: &R, genomes: Vec<R::Genome>) -> Vec<Scored<R::Genome>> {
		genomes
			.into_par_iter()
			.map(|genome| Scored::new(self.score(repr, &genome), genome))
			.collect()
	}
}
