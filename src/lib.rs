//! Evolutionary image approximation.
//!
//! A population of candidate drawings (circles, polygons, letters, or a warped
//! triangle mesh) is evolved until its rendering resembles a target image.

pub mod checkpoint;
pub mod errors;
pub mod evolve;
pub mod fitness;
pub mod genes;
pub mod genetic;
pub mod genome;
pub mod mesh;
pub mod params;
pub mod population;
pub mod raster;
pub mod selection;
pub mod wiggle;

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

use crate::genetic::AsContext;

pub mod prelude {
	pub use crate::{
		checkpoint::{Checkpoint, Snapshot},
		errors::{ConfigError, DataError},
		evolve::{Evolution, Progress},
		fitness::ImageFitness,
		genes::{CircleKind, LetterKind, PolygonKind},
		genetic::{AsContext, GeneKind, Policy, Representation},
		genome::DnaTools,
		mesh::MeshTools,
		params::{EvoSpecs, Kind, PolicySpecs, RunConfig},
		population::{Population, Scored},
		raster::{BlockGlyphs, Canvas, FontGlyphs, GlyphSource, Rasterizer, SoftRasterizer},
		selection::{AnyPolicy, Halving, Tournament},
		wiggle::WigglePass,
		Context,
	};
}

/// Run state threaded through every genetic operator.
#[derive(Debug, Clone)]
pub struct Context {
	pub generation: usize,  // completed steps
	pub best_fitness: f64,  // current best (lowest) fitness
	pub mean_fitness: f64,  // current mean fitness

	pub(crate) rng: Pcg64Mcg, // reproducible rng
}

impl Context {
	pub fn new(seed: u64) -> Self {
		Self {
			generation: 0,
			best_fitness: f64::INFINITY,
			mean_fitness: f64::INFINITY,
			rng: Pcg64Mcg::seed_from_u64(seed),
		}
	}
}

impl AsContext for Context {
	#[inline]
	fn rng(&mut self) -> &mut impl Rng {
		&mut self.rng
	}

	#[inline]
	fn generation(&self) -> usize {
		self.generation
	}
}
