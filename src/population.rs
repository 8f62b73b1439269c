//! Scored individuals and the population container.

use std::ops::Index;

/// A genome together with its fitness. Lower is better.
#[derive(Clone, Debug, PartialEq)]
pub struct Scored<G> {
	pub fitness: f64,
	pub genome: G,
}

impl<G> Scored<G> {
	pub fn new(fitness: f64, genome: G) -> Self {
		Scored { fitness, genome }
	}
}

/// An ordered collection of scored genomes. Its size only changes on reseeding.
#[derive(Clone, Debug, PartialEq)]
pub struct Population<G> {
	members: Vec<Scored<G>>,
}

impl<G> Default for Population<G> {
	fn default() -> Self {
		Population { members: Vec::new() }
	}
}

impl<G> From<Vec<Scored<G>>> for Population<G> {
	fn from(members: Vec<Scored<G>>) -> Self {
		Population { members }
	}
}

impl<G> Population<G> {
	pub fn len(&self) -> usize {
		self.members.len()
	}

	pub fn is_empty(&self) -> bool {
		self.members.is_empty()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, Scored<G>> {
		self.members.iter()
	}

	pub fn members(&self) -> &[Scored<G>] {
		&self.members
	}

	pub fn into_members(self) -> Vec<Scored<G>> {
		self.members
	}

	/// Swaps out the member at `index`, returning the old one.
	pub fn replace(&mut self, index: usize, member: Scored<G>) -> Scored<G> {
		std::mem::replace(&mut self.members[index], member)
	}

	/// Sorts best (lowest fitness) first.
	pub fn sort(&mut self) {
		self.members
			.sort_by(|a, b| f64::total_cmp(&a.fitness, &b.fitness));
	}

	/// Lowest-fitness member; the first one on ties.
	pub fn best(&self) -> Option<&Scored<G>> {
		self.members
			.iter()
			.reduce(|best, s| if s.fitness < best.fitness { s } else { best })
	}

	pub fn worst(&self) -> Option<&Scored<G>> {
		self.members
			.iter()
			.reduce(|worst, s| if s.fitness > worst.fitness { s } else { worst })
	}

	pub fn mean_fitness(&self) -> f64 {
		if self.members.is_empty() {
			return f64::NAN;
		}
		self.members.iter().map(|s| s.fitness).sum::<f64>() / self.members.len() as f64
	}
}

impl<G> Index<usize> for Population<G> {
	type Output = Scored<G>;

	fn index(&self, index: usize) -> &Self::Output {
		&self.members[index]
	}
}

impl<'a, G> IntoIterator for &'a Population<G> {
	type Item = &'a Scored<G>;
	type IntoIter = std::slice::Iter<'a, Scored<G>>;

	fn into_iter(self) -> Self::IntoIter {
		self.members.iter()
	}
}
