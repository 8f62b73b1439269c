use bon::Builder;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{check_canvas, check_magnitude, finite, gauss, jitter_color, pick, random_color, scale_length, scale_point, Bounds};
use crate::{
	errors::ConfigError,
	genetic::GeneKind,
	params::Section,
	raster::{Canvas, Point, Rgba},
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CircleGene {
	pub point: Point,
	pub r: f32,
	pub color: Rgba,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Builder)]
pub struct CircleSpecs {
	pub max_r: f32, // largest radius
	pub init_r: f32, // radius of fresh genes
	pub mut_p: f32, // position sigma
	pub mut_r: f32, // radius sigma
	pub mut_c: f32, // color channel sigma
}

impl Section for CircleSpecs {
	const NAME: &'static str = "circle genes";
	const REQUIRED: &'static [&'static str] = &["max_r", "init_r", "mut_p", "mut_r", "mut_c"];
}

#[derive(Clone, Debug)]
pub struct CircleKind {
	width: u32,
	height: u32,
	specs: CircleSpecs,
}

impl CircleKind {
	fn bounds(&self) -> Bounds {
		Bounds::canvas(self.width, self.height)
	}
}

impl GeneKind for CircleKind {
	type Gene = CircleGene;
	type Specs = CircleSpecs;

	fn new(width: u32, height: u32, specs: CircleSpecs) -> Result<Self, ConfigError> {
		check_canvas(width, height)?;
		check_magnitude("max_r", specs.max_r as f64)?;
		check_magnitude("init_r", specs.init_r as f64)?;
		check_magnitude("mut_p", specs.mut_p as f64)?;
		check_magnitude("mut_r", specs.mut_r as f64)?;
		check_magnitude("mut_c", specs.mut_c as f64)?;
		Ok(CircleKind { width, height, specs })
	}

	fn specs(&self) -> &CircleSpecs {
		&self.specs
	}

	fn dimensions(&self) -> (u32, u32) {
		(self.width, self.height)
	}

	fn resize(&mut self, width: u32, height: u32, factor: f64) {
		self.width = width;
		self.height = height;
		let s = &mut self.specs;
		for len in [&mut s.max_r, &mut s.init_r, &mut s.mut_p, &mut s.mut_r] {
			*len = scale_length(*len, factor);
		}
	}

	fn random_gene<R: Rng + ?Sized>(&self, rng: &mut R) -> CircleGene {
		CircleGene {
			point: self.bounds().random_point(rng),
			r: self.specs.init_r.clamp(0.0, self.specs.max_r),
			color: random_color(rng),
		}
	}

	fn mutate_gene<R: Rng + ?Sized>(&self, gene: &CircleGene, rate: f64, intensity: f64, rng: &mut R) -> CircleGene {
		let specs = &self.specs;
		let mut out = gene.clone();
		if super::chance(rng, rate) {
			out.point = self.bounds().jitter(rng, gene.point, specs.mut_p as f64 * intensity);
		}
		if super::chance(rng, rate) {
			let r = gauss(rng, gene.r as f64, specs.mut_r as f64 * intensity) as f32;
			out.r = r.clamp(0.0, specs.max_r);
		}
		if super::chance(rng, rate) {
			out.color = jitter_color(rng, gene.color, specs.mut_c as f64 * intensity, 4);
		}
		out
	}

	fn recolor_gene<R: Rng + ?Sized>(&self, gene: &CircleGene, intensity: f64, rng: &mut R) -> CircleGene {
		CircleGene {
			color: jitter_color(rng, gene.color, self.specs.mut_c as f64 * intensity, 4),
			..gene.clone()
		}
	}

	fn combine_genes<R: Rng + ?Sized>(&self, a: &CircleGene, b: &CircleGene, bias: f64, rng: &mut R) -> CircleGene {
		CircleGene {
			point: *pick(rng, &a.point, &b.point, bias),
			r: *pick(rng, &a.r, &b.r, bias),
			color: *pick(rng, &a.color, &b.color, bias),
		}
	}

	fn draw_gene<C: Canvas + ?Sized>(&self, gene: &CircleGene, canvas: &mut C) {
		canvas.fill_circle(gene.point, gene.r, gene.color);
	}

	fn rescale_gene(&self, gene: &CircleGene, factor: f64) -> CircleGene {
		CircleGene {
			point: scale_point(gene.point, factor),
			r: scale_length(gene.r, factor),
			color: gene.color,
		}
	}

	fn validate_gene(&self, gene: &CircleGene) -> Result<(), String> {
		if !finite(gene.point) {
			return Err(format!("non-finite center {:?}", gene.point));
		}
		if !(0.0..=self.specs.max_r).contains(&gene.r) {
			return Err(format!("radius {} outside [0, {}]", gene.r, self.specs.max_r));
		}
		Ok(())
	}

	fn background(&self, gene: &CircleGene) -> Rgba {
		let [r, g, b, _] = gene.color;
		[r, g, b, 255]
	}
}
