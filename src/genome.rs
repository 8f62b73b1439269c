//! Genomes made of primitive genes.

use rand::Rng;

use crate::{
	errors::{ConfigError, DataError},
	genes::chance,
	genetic::{GeneKind, Representation},
	params::EvoSpecs,
	raster::{Canvas, Rgba},
	wiggle::WigglePass,
};

/// An ordered gene sequence, drawn back to front.
pub type Dna<K> = Vec<<K as GeneKind>::Gene>;

/// Representation of genomes as [`Dna`] of one [`GeneKind`].
#[derive(Clone, Debug)]
pub struct DnaTools<K: GeneKind> {
	kind: K,
	evo: EvoSpecs,
}

impl<K: GeneKind> DnaTools<K> {
	pub fn new(kind: K, evo: EvoSpecs) -> Result<Self, ConfigError> {
		evo.validate(true)?;
		Ok(DnaTools { kind, evo })
	}

	pub fn kind(&self) -> &K {
		&self.kind
	}

	/// Mutates every gene with probability `gene_mutation_ratio`, then maybe swaps two genes.
	pub fn mutate_dna<R: Rng + ?Sized>(&self, dna: &[K::Gene], rng: &mut R) -> Dna<K> {
		let mut out: Dna<K> = dna
			.iter()
			.map(|gene| {
				if chance(rng, self.evo.gene_mutation_ratio) {
					self.kind
						.mutate_gene(gene, self.evo.property_mutation_ratio, 1.0, rng)
				} else {
					gene.clone()
				}
			})
			.collect();
		if out.len() > 1 && chance(rng, self.evo.gene_switch_ratio) {
			let i = rng.random_range(0..out.len());
			let j = rng.random_range(0..out.len());
			out.swap(i, j);
		}
		out
	}
}

impl<K: GeneKind> Representation for DnaTools<K> {
	type Genome = Dna<K>;
	type Specs = K::Specs;
	type Element = K::Gene;

	fn from_specs(width: u32, height: u32, gene_specs: K::Specs, evo: EvoSpecs) -> Result<Self, ConfigError> {
		DnaTools::new(K::new(width, height, gene_specs)?, evo)
	}

	fn dimensions(&self) -> (u32, u32) {
		self.kind.dimensions()
	}

	fn resize(&mut self, width: u32, height: u32, factor: f64) {
		self.kind.resize(width, height, factor);
	}

	fn gene_specs(&self) -> &K::Specs {
		self.kind.specs()
	}

	fn evo_specs(&self) -> &EvoSpecs {
		&self.evo
	}

	fn random_genome<R: Rng + ?Sized>(&self, rng: &mut R) -> Dna<K> {
		(0..self.evo.dna_len)
			.map(|_| self.kind.random_gene(rng))
			.collect()
	}

	fn mutate<R: Rng + ?Sized>(&self, dna: &Dna<K>, rng: &mut R) -> Dna<K> {
		self.mutate_dna(dna, rng)
	}

	fn combine<R: Rng + ?Sized>(&self, a: &Dna<K>, b: &Dna<K>, bias: f64, rng: &mut R) -> Dna<K> {
		a.iter()
			.zip(b)
			.map(|(x, y)| self.kind.combine_genes(x, y, bias, rng))
			.collect()
	}

	/// The leading gene's color, fully opaque.
	fn background(&self, dna: &Dna<K>) -> Rgba {
		dna.first()
			.map_or([0, 0, 0, 255], |gene| self.kind.background(gene))
	}

	fn render<C: Canvas + ?Sized>(&self, dna: &Dna<K>, canvas: &mut C) {
		for gene in dna {
			self.kind.draw_gene(gene, canvas);
		}
	}

	fn rescale(&self, dna: &Dna<K>, factor: f64) -> Dna<K> {
		dna.iter()
			.map(|gene| self.kind.rescale_gene(gene, factor))
			.collect()
	}

	fn validate(&self, dna: &Dna<K>) -> Result<(), DataError> {
		if dna.is_empty() {
			return Err(DataError::InvalidGenome("no genes".to_string()));
		}
		for (index, gene) in dna.iter().enumerate() {
			self.kind
				.validate_gene(gene)
				.map_err(|reason| DataError::InvalidGene { index, reason })?;
		}
		Ok(())
	}

	fn wiggle_slots(&self, dna: &Dna<K>, _pass: WigglePass) -> usize {
		dna.len()
	}

	fn perturb<R: Rng + ?Sized>(
		&self,
		dna: &mut Dna<K>,
		pass: WigglePass,
		slot: usize,
		intensity: f64,
		rng: &mut R,
	) -> Option<K::Gene> {
		let gene = dna.get_mut(slot)?;
		let changed = match pass {
			WigglePass::Color => self.kind.recolor_gene(gene, intensity, rng),
			WigglePass::Full => self.kind.mutate_gene(gene, 1.0, intensity, rng),
		};
		if changed == *gene {
			return None;
		}
		Some(std::mem::replace(gene, changed))
	}

	fn restore(&self, dna: &mut Dna<K>, _pass: WigglePass, slot: usize, prior: K::Gene) {
		if let Some(gene) = dna.get_mut(slot) {
			*gene = prior;
		}
	}
}

#[cfg(test)]
mod tests {
	use rand::SeedableRng;
	use rand_pcg::Pcg64Mcg;

	use super::*;
	use crate::genes::{CircleGene, CircleKind, CircleSpecs, PolygonKind, PolygonSpecs};

	fn evo(dna_len: usize) -> EvoSpecs {
		EvoSpecs::builder()
			.pop_size(4)
			.dna_len(dna_len)
			.gene_mutation_ratio(0.3)
			.property_mutation_ratio(0.5)
			.combine_ratio(0.5)
			.gene_switch_ratio(0.5)
			.build()
	}

	fn circles(dna_len: usize) -> DnaTools<CircleKind> {
		let specs = CircleSpecs::builder()
			.max_r(10.0)
			.init_r(4.0)
			.mut_p(5.0)
			.mut_r(2.0)
			.mut_c(30.0)
			.build();
		DnaTools::from_specs(32, 32, specs, evo(dna_len)).unwrap()
	}

	#[test]
	fn random_genome_has_configured_length() {
		let tools = circles(17);
		let mut rng = Pcg64Mcg::seed_from_u64(1);
		assert_eq!(tools.random_genome(&mut rng).len(), 17);
	}

	#[test]
	fn mutation_keeps_length_and_bounds() {
		let tools = circles(10);
		let mut rng = Pcg64Mcg::seed_from_u64(2);
		let mut dna = tools.random_genome(&mut rng);
		for _ in 0..1000 {
			let next = tools.mutate(&dna, &mut rng);
			assert_eq!(next.len(), 10);
			assert!(tools.validate(&next).is_ok());
			dna = next;
		}
	}

	#[test]
	fn polygon_dna_bounds() {
		let specs = PolygonSpecs::builder()
			.max_n(5)
			.init_r(6.0)
			.mut_p(4.0)
			.mut_c(30.0)
			.mut_n(0.8)
			.build();
		let tools = DnaTools::<PolygonKind>::from_specs(20, 20, specs, evo(6)).unwrap();
		let mut rng = Pcg64Mcg::seed_from_u64(3);
		let mut dna = tools.random_genome(&mut rng);
		for _ in 0..2000 {
			dna = tools.mutate(&dna, &mut rng);
			assert!(tools.validate(&dna).is_ok());
		}
	}

	#[test]
	fn combine_bias_extremes() {
		let tools = circles(8);
		let mut rng = Pcg64Mcg::seed_from_u64(4);
		let a = tools.random_genome(&mut rng);
		let b = tools.random_genome(&mut rng);
		assert_eq!(tools.combine(&a, &b, 1.0, &mut rng), a);
		assert_eq!(tools.combine(&a, &b, 0.0, &mut rng), b);
	}

	#[test]
	fn background_is_first_gene_opaque() {
		let tools = circles(1);
		let dna = vec![CircleGene {
			point: (0.0, 0.0),
			r: 1.0,
			color: [5, 6, 7, 8],
		}];
		assert_eq!(tools.background(&dna), [5, 6, 7, 255]);
		assert_eq!(tools.background(&Vec::new()), [0, 0, 0, 255]);
	}

	#[test]
	fn rejects_empty_dna() {
		let specs = circles(1).gene_specs().clone();
		assert!(matches!(
			DnaTools::<CircleKind>::from_specs(8, 8, specs, evo(0)),
			Err(ConfigError::Invalid { key, .. }) if key == "dna_len"
		));
	}

	#[test]
	fn validation_names_the_gene() {
		let tools = circles(3);
		let mut rng = Pcg64Mcg::seed_from_u64(5);
		let mut dna = tools.random_genome(&mut rng);
		dna[2].r = 99.0;
		assert!(matches!(tools.validate(&dna), Err(DataError::InvalidGene { index: 2, .. })));
	}

	#[test]
	fn perturb_then_restore() {
		let tools = circles(4);
		let mut rng = Pcg64Mcg::seed_from_u64(6);
		let dna = tools.random_genome(&mut rng);
		for pass in [WigglePass::Color, WigglePass::Full] {
			for slot in 0..tools.wiggle_slots(&dna, pass) {
				let mut d = dna.clone();
				if let Some(prior) = tools.perturb(&mut d, pass, slot, 1.0, &mut rng) {
					assert_ne!(d, dna);
					if pass == WigglePass::Color {
						assert_eq!(d[slot].point, dna[slot].point);
					}
					tools.restore(&mut d, pass, slot, prior);
				}
				assert_eq!(d, dna);
			}
		}
	}
}
