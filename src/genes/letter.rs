use bon::Builder;
use rand::{seq::IndexedRandom, Rng};
use serde::{Deserialize, Serialize};

use super::{chance, check_canvas, check_magnitude, finite, gauss, jitter_color, pick, random_color, scale_length, scale_point, Bounds};
use crate::{
	errors::ConfigError,
	genetic::GeneKind,
	params::Section,
	raster::{Canvas, Point, Rgba},
};

pub const FONT_MIN: f32 = 5.0;
pub const FONT_MAX: f32 = 500.0;
/// Anchors may sit this far above / left of the canvas, so glyph tails can reach the edges.
pub const LETTER_MARGIN: f32 = 20.0;

pub const DEFAULT_LETTERS: &str = concat!(
	"1234567890'+qwertzuiopšasdfghjklčž<yxcvbnm,",
	".-!#$%&/()=?*QWERTZUIOPŠASDFGHJKLČŽ>YXCVBNM;:_~ˇ^°\\|€@{}ß÷×¤",
);

fn default_mut_l() -> f64 {
	0.3
}

fn default_letters() -> String {
	DEFAULT_LETTERS.to_string()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LetterGene {
	pub point: Point,
	pub r: f32, // font size
	pub color: Rgba,
	pub letter: char,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Builder)]
pub struct LetterSpecs {
	pub max_r: f32,
	pub init_r: f32,
	pub mut_p: f32,
	pub mut_r: f32,
	pub mut_c: f32,
	/// Chance that a mutation swaps the glyph.
	#[serde(default = "default_mut_l")]
	#[builder(default = default_mut_l())]
	pub mut_l: f64,
	#[serde(default = "default_letters")]
	#[builder(default = default_letters(), into)]
	pub letters: String,
}

impl Section for LetterSpecs {
	const NAME: &'static str = "letter genes";
	const REQUIRED: &'static [&'static str] = &["max_r", "init_r", "mut_p", "mut_r", "mut_c"];
}

#[derive(Clone, Debug)]
pub struct LetterKind {
	width: u32,
	height: u32,
	specs: LetterSpecs,
	alphabet: Vec<char>,
}

impl LetterKind {
	fn bounds(&self) -> Bounds {
		Bounds {
			min: (-LETTER_MARGIN, -LETTER_MARGIN),
			max: (self.width as f32, self.height as f32),
		}
	}

	pub fn alphabet(&self) -> &[char] {
		&self.alphabet
	}

	fn random_letter<R: Rng + ?Sized>(&self, rng: &mut R) -> char {
		// alphabet is checked non-empty on construction
		self.alphabet.choose(rng).copied().unwrap_or('A')
	}
}

impl GeneKind for LetterKind {
	type Gene = LetterGene;
	type Specs = LetterSpecs;

	fn new(width: u32, height: u32, mut specs: LetterSpecs) -> Result<Self, ConfigError> {
		check_canvas(width, height)?;
		check_magnitude("init_r", specs.init_r as f64)?;
		check_magnitude("mut_p", specs.mut_p as f64)?;
		check_magnitude("mut_r", specs.mut_r as f64)?;
		check_magnitude("mut_c", specs.mut_c as f64)?;
		specs.max_r = specs.max_r.min(FONT_MAX);
		if !(specs.max_r >= FONT_MIN) {
			return Err(ConfigError::invalid(
				"max_r",
				format!("must be at least {FONT_MIN}, got {}", specs.max_r),
			));
		}
		if !(0.0..=1.0).contains(&specs.mut_l) {
			return Err(ConfigError::invalid("mut_l", format!("must be in [0, 1], got {}", specs.mut_l)));
		}
		let mut alphabet: Vec<char> = Vec::new();
		for c in specs.letters.chars() {
			if !alphabet.contains(&c) {
				alphabet.push(c);
			}
		}
		if alphabet.is_empty() {
			return Err(ConfigError::invalid("letters", "alphabet is empty"));
		}
		Ok(LetterKind {
			width,
			height,
			specs,
			alphabet,
		})
	}

	fn specs(&self) -> &LetterSpecs {
		&self.specs
	}

	fn dimensions(&self) -> (u32, u32) {
		(self.width, self.height)
	}

	fn resize(&mut self, width: u32, height: u32, factor: f64) {
		self.width = width;
		self.height = height;
		let s = &mut self.specs;
		s.max_r = scale_length(s.max_r, factor).clamp(FONT_MIN, FONT_MAX);
		s.init_r = scale_length(s.init_r, factor);
		s.mut_p = scale_length(s.mut_p, factor);
		s.mut_r = scale_length(s.mut_r, factor);
	}

	fn random_gene<R: Rng + ?Sized>(&self, rng: &mut R) -> LetterGene {
		LetterGene {
			point: self.bounds().random_point(rng),
			r: self.specs.init_r.clamp(FONT_MIN, self.specs.max_r),
			color: random_color(rng),
			letter: self.random_letter(rng),
		}
	}

	fn mutate_gene<R: Rng + ?Sized>(&self, gene: &LetterGene, rate: f64, intensity: f64, rng: &mut R) -> LetterGene {
		let specs = &self.specs;
		let mut out = gene.clone();
		if chance(rng, rate) {
			out.point = self.bounds().jitter(rng, gene.point, specs.mut_p as f64 * intensity);
		}
		if chance(rng, rate) {
			let r = gauss(rng, gene.r as f64, specs.mut_r as f64 * intensity) as f32;
			out.r = r.clamp(FONT_MIN, specs.max_r);
		}
		if chance(rng, rate) {
			out.color = jitter_color(rng, gene.color, specs.mut_c as f64 * intensity, 4);
		}
		if chance(rng, rate) && chance(rng, specs.mut_l) {
			out.letter = self.random_letter(rng);
		}
		out
	}

	fn recolor_gene<R: Rng + ?Sized>(&self, gene: &LetterGene, intensity: f64, rng: &mut R) -> LetterGene {
		LetterGene {
			color: jitter_color(rng, gene.color, self.specs.mut_c as f64 * intensity, 4),
			..gene.clone()
		}
	}

	fn combine_genes<R: Rng + ?Sized>(&self, a: &LetterGene, b: &LetterGene, bias: f64, rng: &mut R) -> LetterGene {
		LetterGene {
			point: *pick(rng, &a.point, &b.point, bias),
			r: *pick(rng, &a.r, &b.r, bias),
			color: *pick(rng, &a.color, &b.color, bias),
			letter: *pick(rng, &a.letter, &b.letter, bias),
		}
	}

	fn draw_gene<C: Canvas + ?Sized>(&self, gene: &LetterGene, canvas: &mut C) {
		canvas.draw_glyph(gene.point, gene.r, gene.letter, gene.color);
	}

	fn rescale_gene(&self, gene: &LetterGene, factor: f64) -> LetterGene {
		LetterGene {
			point: scale_point(gene.point, factor),
			r: scale_length(gene.r, factor).clamp(FONT_MIN, FONT_MAX),
			..gene.clone()
		}
	}

	fn validate_gene(&self, gene: &LetterGene) -> Result<(), String> {
		if !finite(gene.point) {
			return Err(format!("non-finite anchor {:?}", gene.point));
		}
		if !(FONT_MIN..=self.specs.max_r).contains(&gene.r) {
			return Err(format!("font size {} outside [{FONT_MIN}, {}]", gene.r, self.specs.max_r));
		}
		if !self.alphabet.contains(&gene.letter) {
			return Err(format!("glyph {:?} not in the alphabet", gene.letter));
		}
		Ok(())
	}

	fn background(&self, gene: &LetterGene) -> Rgba {
		let [r, g, b, _] = gene.color;
		[r, g, b, 255]
	}
}
