//! Population update policies.
//! See [genetic::Policy] for more info.
//!
//! [genetic::Policy]: crate::genetic::Policy

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};

use crate::{
	errors::ConfigError,
	fitness::ImageFitness,
	genetic::{AsContext, Policy, Representation},
	params::{HalvingSpecs, PolicySpecs},
	population::{Population, Scored},
	raster::Rasterizer,
	wiggle::{wiggle, WigglePass},
};

/// Steady-state tournament: one child per step, replacing a random incumbent it beats.
#[derive(Clone, Copy, Debug, Default)]
pub struct Tournament;

impl<R: Representation> Policy<R> for Tournament {
	fn step<C, Z>(
		&mut self,
		ctx: &mut C,
		repr: &R,
		fitness: &ImageFitness<Z>,
		mut pop: Population<R::Genome>,
	) -> Population<R::Genome>
	where
		C: AsContext,
		Z: Rasterizer,
	{
		let n = pop.len();
		if n == 0 {
			return pop;
		}
		let rng = ctx.rng();
		let a = rng.random_range(0..n);
		let b = rng.random_range(0..n);
		let child = repr.combine(&pop[a].genome, &pop[b].genome, repr.evo_specs().combine_ratio, rng);
		let child = repr.mutate(&child, rng);
		let score = fitness.score(repr, &child);

		let slot = rng.random_range(0..n);
		if score < pop[slot].fitness {
			log::trace!("Child {score:.4} replaces #{slot} ({:.4}).", pop[slot].fitness);
			pop.replace(slot, Scored::new(score, child));
		}
		pop
	}

	fn specs(&self) -> PolicySpecs {
		PolicySpecs::Tournament
	}
}

#[inline]
fn due(period: usize, generation: usize) -> bool {
	period > 0 && generation % period == 0
}

/// Elitist halving with local search: periodically replaces the worse half by offspring
/// of the better half, and wiggles every member in between.
#[derive(Clone, Debug)]
pub struct Halving {
	specs: HalvingSpecs,
}

impl Halving {
	pub fn new(specs: HalvingSpecs) -> Result<Self, ConfigError> {
		specs.validate()?;
		Ok(Halving { specs })
	}

	fn sorted_apex<G>(pop: Population<G>) -> (Vec<Scored<G>>, usize) {
		let n = pop.len();
		let mut members = pop.into_members();
		members.sort_by(|a, b| f64::total_cmp(&a.fitness, &b.fitness));
		members.truncate((n / 2).max(1));
		(members, n)
	}

	/// Keeps the better half and refills with crossovers among it.
	fn halve<C, R, Z>(&self, ctx: &mut C, repr: &R, fitness: &ImageFitness<Z>, pop: Population<R::Genome>) -> Population<R::Genome>
	where
		C: AsContext,
		R: Representation,
		Z: Rasterizer,
	{
		let (mut apex, n) = Self::sorted_apex(pop);
		let keep = apex.len();
		let children: Vec<R::Genome> = (0..n - keep)
			.map(|i| {
				let partner = ctx.rng().random_range(0..keep);
				repr.combine(&apex[i % keep].genome, &apex[partner].genome, self.specs.crossover_bias, ctx.rng())
			})
			.collect();
		log::debug!("Halving: kept {keep}, bred {}.", children.len());
		apex.extend(fitness.evaluate_all(repr, children));
		apex.into()
	}

	/// Keeps the better half and refills with heavily mutated copies of it.
	fn reseed<C, R, Z>(&self, ctx: &mut C, repr: &R, fitness: &ImageFitness<Z>, pop: Population<R::Genome>) -> Population<R::Genome>
	where
		C: AsContext,
		R: Representation,
		Z: Rasterizer,
	{
		let (mut apex, n) = Self::sorted_apex(pop);
		let keep = apex.len();
		let copies: Vec<R::Genome> = (0..n - keep)
			.map(|i| {
				let mut genome = apex[i % keep].genome.clone();
				for _ in 0..self.specs.reseed_mutations {
					genome = repr.mutate(&genome, ctx.rng());
				}
				genome
			})
			.collect();
		log::debug!("Reseeding: kept {keep}, explored {}.", copies.len());
		apex.extend(fitness.evaluate_all(repr, copies));
		apex.into()
	}

	/// Wiggles every member in parallel. Each member gets its own rng seeded from the context.
	fn wiggle_all<C, R, Z>(
		&self,
		ctx: &mut C,
		repr: &R,
		fitness: &ImageFitness<Z>,
		pop: Population<R::Genome>,
		pass: WigglePass,
		intensity: f64,
	) -> Population<R::Genome>
	where
		C: AsContext,
		R: Representation,
		Z: Rasterizer,
	{
		let seeds: Vec<u64> = (0..pop.len()).map(|_| ctx.rng().random()).collect();
		let steps = self.specs.wiggle_steps;
		log::debug!("Wiggling {} members ({pass:?}, intensity {intensity:.3}).", pop.len());
		pop.into_members()
			.into_par_iter()
			.zip(seeds)
			.map(|(member, seed)| {
				let mut rng = Pcg64Mcg::seed_from_u64(seed);
				wiggle(repr, fitness, member, pass, intensity, steps, &mut rng)
			})
			.collect::<Vec<_>>()
			.into()
	}
}

impl<R: Representation> Policy<R> for Halving {
	fn step<C, Z>(
		&mut self,
		ctx: &mut C,
		repr: &R,
		fitness: &ImageFitness<Z>,
		mut pop: Population<R::Genome>,
	) -> Population<R::Genome>
	where
		C: AsContext,
		Z: Rasterizer,
	{
		if pop.is_empty() {
			return pop;
		}
		let generation = ctx.generation();
		let specs = &self.specs;
		if generation < specs.color_generations {
			if due(specs.wiggle_every, generation) {
				pop = self.wiggle_all(ctx, repr, fitness, pop, WigglePass::Color, specs.intensity_start);
			}
			return pop;
		}

		let j = generation - specs.color_generations;
		if j > 0 && due(specs.reseed_every, j) {
			pop = self.reseed(ctx, repr, fitness, pop);
		} else if due(specs.halving_every, j) {
			pop = self.halve(ctx, repr, fitness, pop);
		}
		if due(specs.wiggle_every, j) {
			pop = self.wiggle_all(ctx, repr, fitness, pop, WigglePass::Full, specs.intensity(j));
		}
		pop
	}

	fn specs(&self) -> PolicySpecs {
		PolicySpecs::Halving(self.specs.clone())
	}
}

/// Either policy, chosen at runtime from configuration.
#[derive(Clone, Debug)]
pub enum AnyPolicy {
	Tournament(Tournament),
	Halving(Halving),
}

impl AnyPolicy {
	pub fn from_specs(specs: &PolicySpecs) -> Result<Self, ConfigError> {
		Ok(match specs {
			PolicySpecs::Tournament => AnyPolicy::Tournament(Tournament),
			PolicySpecs::Halving(h) => AnyPolicy::Halving(Halving::new(h.clone())?),
		})
	}
}

impl<R: Representation> Policy<R> for AnyPolicy {
	fn step<C, Z>(
		&mut self,
		ctx: &mut C,
		repr: &R,
		fitness: &ImageFitness<Z>,
		pop: Population<R::Genome>,
	) -> Population<R::Genome>
	where
		C: AsContext,
		Z: Rasterizer,
	{
		match self {
			AnyPolicy::Tournament(p) => p.step(ctx, repr, fitness, pop),
			AnyPolicy::Halving(p) => p.step(ctx, repr, fitness, pop),
		}
	}

	fn specs(&self) -> PolicySpecs {
		match self {
			AnyPolicy::Tournament(p) => Policy::<R>::specs(p),
			AnyPolicy::Halving(p) => Policy::<R>::specs(p),
		}
	}
}

#[cfg(test)]
mod tests {
	use image::{Rgb, RgbImage};
	use rand::SeedableRng;

	use super::*;
	use crate::{
		genes::{CircleKind, CircleSpecs},
		genome::DnaTools,
		params::EvoSpecs,
		raster::SoftRasterizer,
		Context,
	};

	fn setup(pop_size: usize) -> (DnaTools<CircleKind>, ImageFitness, Population<Vec<crate::genes::CircleGene>>, Context) {
		let specs = CircleSpecs::builder()
			.max_r(6.0)
			.init_r(3.0)
			.mut_p(3.0)
			.mut_r(1.0)
			.mut_c(40.0)
			.build();
		let evo = EvoSpecs::builder()
			.pop_size(pop_size)
			.dna_len(4)
			.gene_mutation_ratio(0.5)
			.property_mutation_ratio(0.5)
			.combine_ratio(0.5)
			.build();
		let tools = DnaTools::from_specs(12, 10, specs, evo).unwrap();
		let target = RgbImage::from_fn(12, 10, |x, y| Rgb([(x * 20) as u8, (y * 25) as u8, 128]));
		let fitness = ImageFitness::new(target, SoftRasterizer::default()).unwrap();
		let mut ctx = Context::new(42);
		let genomes: Vec<_> = (0..pop_size).map(|_| tools.random_genome(&mut ctx.rng)).collect();
		let pop = fitness.evaluate_all(&tools, genomes).into();
		(tools, fitness, pop, ctx)
	}

	fn best(pop: &Population<Vec<crate::genes::CircleGene>>) -> f64 {
		pop.best().map(|s| s.fitness).unwrap_or(f64::INFINITY)
	}

	#[test]
	fn tournament_keeps_size() {
		let (tools, fitness, mut pop, mut ctx) = setup(5);
		let mut policy = Tournament;
		let mut last = best(&pop);
		for g in 0..200 {
			ctx.generation = g;
			pop = policy.step(&mut ctx, &tools, &fitness, pop);
			assert_eq!(pop.len(), 5);
			assert!(best(&pop) <= last);
			last = best(&pop);
		}
	}

	#[test]
	fn halving_keeps_size_and_never_regresses() {
		for pop_size in [2, 3, 7, 8] {
			let (tools, fitness, mut pop, mut ctx) = setup(pop_size);
			let specs = HalvingSpecs::builder()
				.wiggle_steps(1)
				.anneal_generations(10)
				.halving_every(2)
				.color_generations(2)
				.reseed_every(5)
				.reseed_mutations(3)
				.build();
			let mut policy = Halving::new(specs).unwrap();
			let mut last = best(&pop);
			for g in 0..20 {
				ctx.generation = g;
				pop = policy.step(&mut ctx, &tools, &fitness, pop);
				assert_eq!(pop.len(), pop_size);
				let now = best(&pop);
				assert!(now <= last, "generation {g}: {now} > {last}");
				// members carry their exact score
				for member in &pop {
					assert_eq!(member.fitness, fitness.score(&tools, &member.genome));
				}
				last = now;
			}
		}
	}

	#[test]
	fn same_seed_same_run() {
		let run = || {
			let (tools, fitness, mut pop, mut ctx) = setup(6);
			let mut policy = AnyPolicy::from_specs(&PolicySpecs::Halving(
				HalvingSpecs::builder().wiggle_steps(1).anneal_generations(5).build(),
			))
			.unwrap();
			for g in 0..6 {
				ctx.generation = g;
				pop = policy.step(&mut ctx, &tools, &fitness, pop);
			}
			pop
		};
		assert_eq!(run(), run());
	}

	#[test]
	fn rejects_bad_halving() {
		let specs = HalvingSpecs::builder().wiggle_steps(1).anneal_generations(0).build();
		assert!(Halving::new(specs).is_err());
	}
}
