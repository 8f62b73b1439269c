//! Greedy per-element hill climbing.

use rand::Rng;

use crate::{
	fitness::ImageFitness,
	genetic::Representation,
	population::Scored,
	raster::Rasterizer,
};

/// Which elements a wiggle touches.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WigglePass {
	/// Colors only.
	Color,
	/// Every mutable element.
	Full,
}

/// Tries `steps` perturbations on every slot of `pass`, keeping each one only if the
/// whole genome scores strictly better. The result is never worse than `start`.
pub fn wiggle<R, Z, G>(
	repr: &R,
	fitness: &ImageFitness<Z>,
	start: Scored<R::Genome>,
	pass: WigglePass,
	intensity: f64,
	steps: usize,
	rng: &mut G,
) -> Scored<R::Genome>
where
	R: Representation,
	Z: Rasterizer,
	G: Rng + ?Sized,
{
	let Scored {
		fitness: mut best,
		mut genome,
	} = start;
	let slots = repr.wiggle_slots(&genome, pass);
	for slot in 0..slots {
		for _ in 0..steps {
			let Some(prior) = repr.perturb(&mut genome, pass, slot, intensity, rng) else {
				continue;
			};
			let score = fitness.score(repr, &genome);
			if score < best {
				best = score;
			} else {
				repr.restore(&mut genome, pass, slot, prior);
			}
		}
	}
	Scored::new(best, genome)
}
