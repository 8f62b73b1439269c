//! Genetic Algorithm Types

use std::fmt::Debug;

use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
	errors::{ConfigError, DataError},
	fitness::ImageFitness,
	params::{EvoSpecs, PolicySpecs},
	population::Population,
	raster::{Canvas, Rasterizer, Rgba},
	wiggle::WigglePass,
};

/// Genetic Algorithm Context
pub trait AsContext {
	/// Get the RNG
	fn rng(&mut self) -> &mut impl Rng;

	/// Current generation number
	fn generation(&self) -> usize;
}

/// One family of drawable primitives. Holds the canvas size and the kind's parameters,
/// and knows how to create, vary and draw individual genes.
pub trait GeneKind: Sized + Sync {
	type Gene: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;
	type Specs: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;

	fn new(width: u32, height: u32, specs: Self::Specs) -> Result<Self, ConfigError>;

	fn specs(&self) -> &Self::Specs;

	fn dimensions(&self) -> (u32, u32);

	/// Changes the canvas the gene bounds refer to and scales every length in the
	/// specs by `factor`. Existing genes are not touched.
	fn resize(&mut self, width: u32, height: u32, factor: f64);

	fn random_gene<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::Gene;

	/// Perturbs each attribute independently with probability `rate`, scaling every
	/// perturbation width by `intensity`. Results always satisfy the kind's bounds.
	fn mutate_gene<R: Rng + ?Sized>(
		&self,
		gene: &Self::Gene,
		rate: f64,
		intensity: f64,
		rng: &mut R,
	) -> Self::Gene;

	/// Perturbs only the color.
	fn recolor_gene<R: Rng + ?Sized>(&self, gene: &Self::Gene, intensity: f64, rng: &mut R) -> Self::Gene;

	/// Attribute-wise crossover: each attribute comes from `a` with probability `bias`.
	fn combine_genes<R: Rng + ?Sized>(
		&self,
		a: &Self::Gene,
		b: &Self::Gene,
		bias: f64,
		rng: &mut R,
	) -> Self::Gene;

	fn draw_gene<C: Canvas + ?Sized>(&self, gene: &Self::Gene, canvas: &mut C);

	/// Scales positions and sizes by `factor`.
	fn rescale_gene(&self, gene: &Self::Gene, factor: f64) -> Self::Gene;

	fn validate_gene(&self, gene: &Self::Gene) -> Result<(), String>;

	/// Opaque fill used behind the genome when this gene leads it.
	fn background(&self, gene: &Self::Gene) -> Rgba;
}

/// A complete genome encoding: how to create, vary, combine and render whole individuals.
pub trait Representation: Sized + Sync {
	type Genome: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;
	type Specs: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync;
	/// A single slot value saved by [`Representation::perturb`] so it can be restored.
	type Element: Send;

	fn from_specs(
		width: u32,
		height: u32,
		gene_specs: Self::Specs,
		evo_specs: EvoSpecs,
	) -> Result<Self, ConfigError>;

	fn dimensions(&self) -> (u32, u32);

	/// Moves to a `width` x `height` canvas `factor` times the current width.
	fn resize(&mut self, width: u32, height: u32, factor: f64);

	fn gene_specs(&self) -> &Self::Specs;

	fn evo_specs(&self) -> &EvoSpecs;

	fn random_genome<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::Genome;

	/// Whole-genome mutation under the configured mutation ratios. Never mutates in place.
	fn mutate<R: Rng + ?Sized>(&self, genome: &Self::Genome, rng: &mut R) -> Self::Genome;

	/// Element-wise crossover of two same-shaped genomes, taking from `a` with probability `bias`.
	fn combine<R: Rng + ?Sized>(
		&self,
		a: &Self::Genome,
		b: &Self::Genome,
		bias: f64,
		rng: &mut R,
	) -> Self::Genome;

	fn background(&self, genome: &Self::Genome) -> Rgba;

	/// Draws every element of `genome` in order onto a canvas already filled with the background.
	fn render<C: Canvas + ?Sized>(&self, genome: &Self::Genome, canvas: &mut C);

	fn rescale(&self, genome: &Self::Genome, factor: f64) -> Self::Genome;

	fn validate(&self, genome: &Self::Genome) -> Result<(), DataError>;

	/// Number of slots a wiggle pass iterates over.
	fn wiggle_slots(&self, genome: &Self::Genome, pass: WigglePass) -> usize;

	/// Perturbs one slot in place, returning the previous value, or `None` when the slot cannot change.
	fn perturb<R: Rng + ?Sized>(
		&self,
		genome: &mut Self::Genome,
		pass: WigglePass,
		slot: usize,
		intensity: f64,
		rng: &mut R,
	) -> Option<Self::Element>;

	/// Undoes a [`Representation::perturb`].
	fn restore(&self, genome: &mut Self::Genome, pass: WigglePass, slot: usize, prior: Self::Element);
}

/// A population update rule. Consumes the current population and yields the next one
/// with the same number of members.
pub trait Policy<R: Representation> {
	fn step<C, Z>(
		&mut self,
		ctx: &mut C,
		repr: &R,
		fitness: &ImageFitness<Z>,
		pop: Population<R::Genome>,
	) -> Population<R::Genome>
	where
		C: AsContext,
		Z: Rasterizer;

	/// Parameters needed to rebuild this policy from a checkpoint.
	fn specs(&self) -> PolicySpecs;
}
