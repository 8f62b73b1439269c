use evopaint::prelude::*;
use evopaint::{
	genes::{CircleGene, CircleSpecs, LetterGene, LetterSpecs, PolygonSpecs},
	mesh::MeshSpecs,
	params::{GeneSpecs, HalvingSpecs},
};
use eyre::{eyre, Result};
use image::{Rgb, RgbImage};

fn red_target() -> RgbImage {
	RgbImage::from_pixel(4, 4, Rgb([255, 0, 0]))
}

fn gradient(w: u32, h: u32) -> RgbImage {
	RgbImage::from_fn(w, h, |x, y| Rgb([(x * 255 / w) as u8, (y * 255 / h) as u8, 90]))
}

/// One-gene circle genomes whose colors jump to the channel extremes on every mutation.
fn single_circle(pop_size: usize) -> Result<DnaTools<CircleKind>> {
	let specs = CircleSpecs::builder()
		.max_r(2.0)
		.init_r(1.0)
		.mut_p(1.0)
		.mut_r(1.0)
		.mut_c(10_000.0)
		.build();
	let evo = EvoSpecs::builder()
		.pop_size(pop_size)
		.dna_len(1)
		.gene_mutation_ratio(1.0)
		.property_mutation_ratio(1.0)
		.combine_ratio(0.5)
		.build();
	Ok(DnaTools::from_specs(4, 4, specs, evo)?)
}

#[test]
fn tournament_paints_solid_red() -> Result<()> {
	let tools = single_circle(2)?;
	let fitness = ImageFitness::new(red_target(), SoftRasterizer::default())?;
	let mut evo = Evolution::new(tools, fitness, Tournament, 17)?;
	evo.seed(2)?;

	let mut last = f64::INFINITY;
	evo.run(50, |progress| {
		let best = progress.best().ok_or_else(|| eyre!("empty population"))?.fitness;
		assert!(best <= last, "best fitness regressed: {best} > {last}");
		last = best;
		Ok(())
	})?;

	let best = evo.best().ok_or_else(|| eyre!("empty population"))?;
	assert_eq!(best.fitness, 0.0);
	let [r, g, b, _] = best.genome[0].color;
	assert_eq!([r, g, b], [255, 0, 0]);
	assert_eq!(evo.generation(), 50);
	Ok(())
}

#[test]
fn seeding_rejects_tiny_populations() -> Result<()> {
	let tools = single_circle(2)?;
	let fitness = ImageFitness::new(red_target(), SoftRasterizer::default())?;
	let mut evo = Evolution::new(tools, fitness, Tournament, 1)?;
	assert!(matches!(evo.seed(1), Err(ConfigError::Invalid { .. })));
	// stepping an unseeded engine is a no-op
	evo.step();
	assert!(evo.population().is_empty());
	assert_eq!(evo.generation(), 0);
	Ok(())
}

#[test]
fn mismatched_target_is_rejected() -> Result<()> {
	let tools = single_circle(2)?;
	let fitness = ImageFitness::new(gradient(5, 4), SoftRasterizer::default())?;
	let err = Evolution::new(tools, fitness, Tournament, 1).err();
	assert_eq!(
		err,
		Some(DataError::DimensionMismatch {
			expected: (4, 4),
			actual: (5, 4)
		})
	);
	Ok(())
}

#[test]
fn resume_continues_from_checkpoint() -> Result<()> {
	let tools = single_circle(8)?;
	let genome = vec![CircleGene {
		point: (2.0, 2.0),
		r: 1.5,
		color: [0, 200, 0, 128],
	}];
	let snapshot = Snapshot {
		width: 4,
		height: 4,
		steps: 100,
		gene_specs: tools.gene_specs().clone(),
		evo_specs: tools.evo_specs().clone(),
		policy: PolicySpecs::Tournament,
		dna: genome.clone(),
	};

	let fitness = ImageFitness::new(red_target(), SoftRasterizer::default())?;
	let policy = AnyPolicy::from_specs(&snapshot.policy)?;
	let mut evo = Evolution::<DnaTools<CircleKind>>::resume(snapshot, fitness, policy, 3, 5)?;
	assert_eq!(evo.generation(), 100);
	assert_eq!(evo.population().len(), 8);
	assert!(evo.population().iter().any(|m| m.genome == genome));

	evo.run(5, |_| Ok(()))?;
	let snapshot = evo.snapshot().ok_or_else(|| eyre!("no snapshot"))?;
	assert_eq!(snapshot.steps, 105);
	Ok(())
}

#[test]
fn halving_polygons_improve() -> Result<()> {
	let specs = PolygonSpecs::builder()
		.max_n(5)
		.init_r(6.0)
		.mut_p(3.0)
		.mut_c(30.0)
		.build();
	let evo_specs = EvoSpecs::builder()
		.pop_size(6)
		.dna_len(8)
		.gene_mutation_ratio(0.3)
		.property_mutation_ratio(0.5)
		.combine_ratio(0.5)
		.build();
	let tools = DnaTools::<PolygonKind>::from_specs(16, 12, specs, evo_specs)?;
	let fitness = ImageFitness::new(gradient(16, 12), SoftRasterizer::default())?;
	let policy = Halving::new(
		HalvingSpecs::builder()
			.wiggle_steps(1)
			.anneal_generations(10)
			.halving_every(3)
			.color_generations(2)
			.build(),
	)?;
	let mut evo = Evolution::new(tools, fitness, policy, 99)?;
	evo.seed(6)?;
	let start = evo.best().ok_or_else(|| eyre!("empty population"))?.fitness;

	let mut last = start;
	evo.run(12, |progress| {
		assert_eq!(progress.population.len(), 6);
		let best = progress.best().ok_or_else(|| eyre!("empty population"))?.fitness;
		assert!(best <= last);
		last = best;
		Ok(())
	})?;
	assert!(last < start, "no improvement over {start}");

	let snapshot = evo.snapshot().ok_or_else(|| eyre!("no snapshot"))?;
	assert!(matches!(snapshot.policy, PolicySpecs::Halving(_)));
	Ok(())
}

#[test]
fn mesh_run_from_config() -> Result<()> {
	let config = RunConfig::from_toml(
		r#"
[evolution]
kind = "mesh"
pop_size = 4
gene_mutation_ratio = 0.2
property_mutation_ratio = 0.5
combine_ratio = 0.5

[evolution.policy]
name = "halving"
wiggle_steps = 1
anneal_generations = 5

[genes]
rows = 2
points_per_row = 4
"#,
	)?;
	assert_eq!(config.kind(), Kind::Mesh);
	let GeneSpecs::Mesh(specs) = config.genes.clone() else {
		return Err(eyre!("expected mesh genes"));
	};
	let expected = MeshSpecs::builder().rows(2).points_per_row(4).build();
	assert_eq!(specs, expected);

	let tools = MeshTools::from_specs(18, 12, specs, config.evo.clone())?;
	let fitness = ImageFitness::new(gradient(18, 12), SoftRasterizer::default())?;
	let policy = AnyPolicy::from_specs(&config.policy)?;
	let mut evo = Evolution::new(tools, fitness, policy, 5)?;
	evo.seed(config.evo.pop_size)?;
	let start = evo.context().best_fitness;
	evo.run(4, |_| Ok(()))?;
	assert!(evo.context().best_fitness <= start);

	let image = evo.progress().render_best().ok_or_else(|| eyre!("nothing to render"))?;
	assert_eq!(image.dimensions(), (18, 12));
	Ok(())
}

#[test]
fn letters_are_scored_by_shape() -> Result<()> {
	let specs = LetterSpecs::builder()
		.max_r(40.0)
		.init_r(30.0)
		.mut_p(1.0)
		.mut_r(1.0)
		.mut_c(1.0)
		.letters("iW")
		.build();
	let evo = EvoSpecs::builder()
		.pop_size(2)
		.dna_len(2)
		.gene_mutation_ratio(0.5)
		.property_mutation_ratio(0.5)
		.combine_ratio(0.5)
		.build();
	let tools = DnaTools::<LetterKind>::from_specs(40, 40, specs, evo)?;
	let white = RgbImage::from_pixel(40, 40, Rgb([255, 255, 255]));
	// a white lead gene sets the background, the black glyph is the only ink
	let genome = |letter| {
		vec![
			LetterGene {
				point: (0.0, 0.0),
				r: 5.0,
				color: [255, 255, 255, 255],
				letter: 'i',
			},
			LetterGene {
				point: (38.0, 34.0),
				r: 30.0,
				color: [0, 0, 0, 255],
				letter,
			},
		]
	};

	let blocks = ImageFitness::new(white.clone(), SoftRasterizer::default())?;
	assert_eq!(blocks.evaluate(&tools, &genome('i'))?, blocks.evaluate(&tools, &genome('W'))?);

	let Some(font) = FontGlyphs::system() else {
		eprintln!("no system font found, skipping the font half");
		return Ok(());
	};
	let fitness = ImageFitness::new(white, SoftRasterizer::new(font))?;
	let i = fitness.evaluate(&tools, &genome('i'))?;
	let w = fitness.evaluate(&tools, &genome('W'))?;
	assert!(i > 0.0);
	assert!(w > 2.0 * i, "'W' scored {w}, 'i' scored {i}");
	Ok(())
}
