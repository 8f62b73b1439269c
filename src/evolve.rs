//! The evolution engine: owns the population and advances it with a [`Policy`].

use image::RgbImage;
use rand::Rng;

use crate::{
	checkpoint::Snapshot,
	errors::{ConfigError, DataError},
	fitness::{self, ImageFitness},
	genetic::{AsContext, Policy, Representation},
	population::{Population, Scored},
	raster::{Canvas, Rasterizer, SoftRasterizer},
	selection::AnyPolicy,
	Context,
};

/// What an observer sees after every step.
pub struct Progress<'a, R: Representation, Z: Rasterizer> {
	pub ctx: &'a Context,
	pub repr: &'a R,
	pub fitness: &'a ImageFitness<Z>,
	pub population: &'a Population<R::Genome>,
}

impl<R: Representation, Z: Rasterizer> Progress<'_, R, Z> {
	pub fn generation(&self) -> usize {
		self.ctx.generation
	}

	pub fn best(&self) -> Option<&Scored<R::Genome>> {
		self.population.best()
	}

	/// Renders the current best genome.
	pub fn render_best(&self) -> Option<RgbImage> {
		let best = self.population.best()?;
		Some(fitness::render(self.repr, self.fitness.rasterizer(), &best.genome).ok()?.into_image())
	}
}

/// A genetic algorithm for approximating an image with a population of drawings.
pub struct Evolution<R, Z = SoftRasterizer, P = AnyPolicy>
where
	R: Representation,
	Z: Rasterizer,
	P: Policy<R>,
{
	repr: R,
	fitness: ImageFitness<Z>,
	policy: P,
	ctx: Context,
	pop: Population<R::Genome>,
}

impl<R, Z, P> Evolution<R, Z, P>
where
	R: Representation,
	Z: Rasterizer,
	P: Policy<R>,
{
	/// Creates an engine with an empty population. Call [`Evolution::seed`] before stepping.
	pub fn new(repr: R, fitness: ImageFitness<Z>, policy: P, seed: u64) -> Result<Self, DataError> {
		if repr.dimensions() != fitness.dimensions() {
			return Err(DataError::DimensionMismatch {
				expected: repr.dimensions(),
				actual: fitness.dimensions(),
			});
		}
		log::info!("Beginning evolution with seed {seed}.");
		Ok(Evolution {
			repr,
			fitness,
			policy,
			ctx: Context::new(seed),
			pop: Population::default(),
		})
	}

	/// Rebuilds an engine from a snapshot: the snapshot genome plus `pop_size - 1` copies of it,
	/// each mutated `reseed_mutations` times. The generation counter continues from the snapshot.
	pub fn resume(
		snapshot: Snapshot<R::Specs, R::Genome>,
		fitness: ImageFitness<Z>,
		policy: P,
		seed: u64,
		reseed_mutations: usize,
	) -> eyre::Result<Self> {
		let (repr, genome) = snapshot.restore::<R>()?;
		let steps = snapshot.steps;
		let pop_size = repr.evo_specs().pop_size;
		let mut evo = Self::new(repr, fitness, policy, seed)?;
		evo.seed_from(genome, pop_size, reseed_mutations)?;
		evo.ctx.generation = steps;
		log::info!("Resumed at generation {steps} with {pop_size} members.");
		Ok(evo)
	}

	/// Fills the population with `pop_size` random genomes.
	pub fn seed(&mut self, pop_size: usize) -> Result<(), ConfigError> {
		check_pop_size(pop_size)?;
		let genomes: Vec<R::Genome> = (0..pop_size)
			.map(|_| self.repr.random_genome(self.ctx.rng()))
			.collect();
		self.pop = self.fitness.evaluate_all(&self.repr, genomes).into();
		self.record();
		log::info!(
			"Seeded {pop_size} genomes, best fitness {:.4}.",
			self.ctx.best_fitness
		);
		Ok(())
	}

	/// Fills the population with `genome` and `pop_size - 1` mutated copies of it.
	pub fn seed_from(&mut self, genome: R::Genome, pop_size: usize, mutations: usize) -> Result<(), ConfigError> {
		check_pop_size(pop_size)?;
		let mut genomes = Vec::with_capacity(pop_size);
		for _ in 1..pop_size {
			let mut copy = genome.clone();
			for _ in 0..mutations {
				copy = self.repr.mutate(&copy, self.ctx.rng());
			}
			genomes.push(copy);
		}
		genomes.insert(0, genome);
		self.pop = self.fitness.evaluate_all(&self.repr, genomes).into();
		self.record();
		Ok(())
	}

	/// Advances one generation.
	pub fn step(&mut self) {
		if self.pop.is_empty() {
			log::warn!("Stepping an unseeded population; seed it first.");
			return;
		}
		let pop = std::mem::take(&mut self.pop);
		self.pop = self.policy.step(&mut self.ctx, &self.repr, &self.fitness, pop);
		self.ctx.generation += 1;
		self.record();
	}

	/// Runs `steps` generations, handing the state to `peek` after each one.
	pub fn run<F>(&mut self, steps: usize, mut peek: F) -> eyre::Result<()>
	where
		F: FnMut(&Progress<'_, R, Z>) -> eyre::Result<()>,
	{
		let start = self.ctx.generation;
		for _ in 0..steps {
			self.step();
			peek(&self.progress())?;
		}
		log::info!(
			"Finished generations {start}..{}, best fitness {:.4}.",
			self.ctx.generation,
			self.ctx.best_fitness
		);
		Ok(())
	}

	pub fn progress(&self) -> Progress<'_, R, Z> {
		Progress {
			ctx: &self.ctx,
			repr: &self.repr,
			fitness: &self.fitness,
			population: &self.pop,
		}
	}

	pub fn best(&self) -> Option<&Scored<R::Genome>> {
		self.pop.best()
	}

	pub fn population(&self) -> &Population<R::Genome> {
		&self.pop
	}

	pub fn generation(&self) -> usize {
		self.ctx.generation
	}

	pub fn context(&self) -> &Context {
		&self.ctx
	}

	pub fn representation(&self) -> &R {
		&self.repr
	}

	pub fn fitness(&self) -> &ImageFitness<Z> {
		&self.fitness
	}

	pub fn policy(&self) -> &P {
		&self.policy
	}

	/// Best genome and run parameters, ready to be written as a checkpoint.
	pub fn snapshot(&self) -> Option<Snapshot<R::Specs, R::Genome>> {
		let best = self.pop.best()?;
		let (width, height) = self.repr.dimensions();
		Some(Snapshot {
			width,
			height,
			steps: self.ctx.generation,
			gene_specs: self.repr.gene_specs().clone(),
			evo_specs: self.repr.evo_specs().clone(),
			policy: self.policy.specs(),
			dna: best.genome.clone(),
		})
	}

	fn record(&mut self) {
		self.ctx.best_fitness = self.pop.best().map_or(f64::INFINITY, |s| s.fitness);
		self.ctx.mean_fitness = self.pop.mean_fitness();
	}
}

fn check_pop_size(pop_size: usize) -> Result<(), ConfigError> {
	if pop_size < 2 {
		return Err(ConfigError::invalid(
			"pop_size",
			format!("population needs at least 2 members, got {pop_size}"),
		));
	}
	Ok(())
}

/// Picks a fresh seed when none was given.
pub fn random_seed() -> u64 {
	rand::rng().random()
}
