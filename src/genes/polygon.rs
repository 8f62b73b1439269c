use std::f64::consts::TAU;

use bon::Builder;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{chance, check_canvas, check_magnitude, finite, jitter_color, pick, random_color, scale_length, scale_point, Bounds};
use crate::{
	errors::ConfigError,
	genetic::GeneKind,
	params::Section,
	raster::{Canvas, Point, Rgba},
};

pub const MIN_POINTS: usize = 3;

fn default_mut_n() -> f64 {
	0.1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolygonGene {
	pub points: Vec<Point>,
	pub color: Rgba,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Builder)]
pub struct PolygonSpecs {
	pub max_n: usize, // most vertices a polygon may have
	pub init_r: f32,  // scatter radius of fresh polygons
	pub mut_p: f32,
	pub mut_c: f32,
	/// Chance that a mutation inserts or deletes a vertex.
	#[serde(default = "default_mut_n")]
	#[builder(default = default_mut_n())]
	pub mut_n: f64,
}

impl Section for PolygonSpecs {
	const NAME: &'static str = "polygon genes";
	const REQUIRED: &'static [&'static str] = &["max_n", "init_r", "mut_p", "mut_c"];
}

#[derive(Clone, Debug)]
pub struct PolygonKind {
	width: u32,
	height: u32,
	specs: PolygonSpecs,
}

impl PolygonKind {
	fn bounds(&self) -> Bounds {
		Bounds::canvas(self.width, self.height)
	}

	/// Inserts a random vertex or removes one, each with even odds, within the vertex limits.
	fn restructure<R: Rng + ?Sized>(&self, points: &mut Vec<Point>, rng: &mut R) {
		if rng.random_bool(0.5) {
			if points.len() < self.specs.max_n {
				let at = rng.random_range(0..=points.len());
				points.insert(at, self.bounds().random_point(rng));
			}
		} else if points.len() > MIN_POINTS {
			let at = rng.random_range(0..points.len());
			points.remove(at);
		}
	}
}

impl GeneKind for PolygonKind {
	type Gene = PolygonGene;
	type Specs = PolygonSpecs;

	fn new(width: u32, height: u32, mut specs: PolygonSpecs) -> Result<Self, ConfigError> {
		check_canvas(width, height)?;
		check_magnitude("init_r", specs.init_r as f64)?;
		check_magnitude("mut_p", specs.mut_p as f64)?;
		check_magnitude("mut_c", specs.mut_c as f64)?;
		if !(0.0..=1.0).contains(&specs.mut_n) {
			return Err(ConfigError::invalid("mut_n", format!("must be in [0, 1], got {}", specs.mut_n)));
		}
		specs.max_n = specs.max_n.max(MIN_POINTS);
		Ok(PolygonKind { width, height, specs })
	}

	fn specs(&self) -> &PolygonSpecs {
		&self.specs
	}

	fn dimensions(&self) -> (u32, u32) {
		(self.width, self.height)
	}

	fn resize(&mut self, width: u32, height: u32, factor: f64) {
		self.width = width;
		self.height = height;
		self.specs.init_r = scale_length(self.specs.init_r, factor);
		self.specs.mut_p = scale_length(self.specs.mut_p, factor);
	}

	fn random_gene<R: Rng + ?Sized>(&self, rng: &mut R) -> PolygonGene {
		let bounds = self.bounds();
		let n = rng.random_range(MIN_POINTS..=self.specs.max_n);
		let (cx, cy) = bounds.random_point(rng);
		let points = (0..n)
			.map(|_| {
				// uniform over the disc around the centre
				let angle = rng.random::<f64>() * TAU;
				let dist = self.specs.init_r as f64 * rng.random::<f64>().sqrt();
				bounds.clamp((
					cx + (dist * angle.cos()) as f32,
					cy + (dist * angle.sin()) as f32,
				))
			})
			.collect();
		PolygonGene {
			points,
			color: random_color(rng),
		}
	}

	fn mutate_gene<R: Rng + ?Sized>(&self, gene: &PolygonGene, rate: f64, intensity: f64, rng: &mut R) -> PolygonGene {
		let specs = &self.specs;
		let mut out = gene.clone();
		if chance(rng, rate) && chance(rng, specs.mut_n) {
			self.restructure(&mut out.points, rng);
		}
		if chance(rng, rate) {
			let bounds = self.bounds();
			let sigma = specs.mut_p as f64 * intensity;
			for p in out.points.iter_mut() {
				*p = bounds.jitter(rng, *p, sigma);
			}
		}
		if chance(rng, rate) {
			out.color = jitter_color(rng, gene.color, specs.mut_c as f64 * intensity, 4);
		}
		out
	}

	fn recolor_gene<R: Rng + ?Sized>(&self, gene: &PolygonGene, intensity: f64, rng: &mut R) -> PolygonGene {
		PolygonGene {
			points: gene.points.clone(),
			color: jitter_color(rng, gene.color, self.specs.mut_c as f64 * intensity, 4),
		}
	}

	fn combine_genes<R: Rng + ?Sized>(&self, a: &PolygonGene, b: &PolygonGene, bias: f64, rng: &mut R) -> PolygonGene {
		PolygonGene {
			points: pick(rng, &a.points, &b.points, bias).clone(),
			color: *pick(rng, &a.color, &b.color, bias),
		}
	}

	fn draw_gene<C: Canvas + ?Sized>(&self, gene: &PolygonGene, canvas: &mut C) {
		canvas.fill_polygon(&gene.points, gene.color);
	}

	fn rescale_gene(&self, gene: &PolygonGene, factor: f64) -> PolygonGene {
		PolygonGene {
			points: gene.points.iter().map(|&p| scale_point(p, factor)).collect(),
			color: gene.color,
		}
	}

	fn validate_gene(&self, gene: &PolygonGene) -> Result<(), String> {
		let n = gene.points.len();
		if !(MIN_POINTS..=self.specs.max_n).contains(&n) {
			return Err(format!("{n} vertices outside [{MIN_POINTS}, {}]", self.specs.max_n));
		}
		if let Some(p) = gene.points.iter().find(|p| !finite(**p)) {
			return Err(format!("non-finite vertex {p:?}"));
		}
		Ok(())
	}

	fn background(&self, gene: &PolygonGene) -> Rgba {
		let [r, g, b, _] = gene.color;
		[r, g, b, 255]
	}
}
