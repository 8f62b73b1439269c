//! Drawable primitive kinds and the sampling helpers they share.

mod circle;
mod letter;
mod polygon;

pub use circle::{CircleGene, CircleKind, CircleSpecs};
pub use letter::{LetterGene, LetterKind, LetterSpecs, DEFAULT_LETTERS, FONT_MAX, FONT_MIN, LETTER_MARGIN};
pub use polygon::{PolygonGene, PolygonKind, PolygonSpecs};

use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use crate::{
	errors::ConfigError,
	raster::{Point, Rgba},
};

/// Gaussian sample around `mean`; a non-positive `sigma` returns `mean` unchanged.
pub(crate) fn gauss<R: Rng + ?Sized>(rng: &mut R, mean: f64, sigma: f64) -> f64 {
	if !(sigma > 0.0) {
		return mean;
	}
	let z: f64 = StandardNormal.sample(rng);
	mean + sigma * z
}

/// Bernoulli trial that tolerates probabilities outside `[0, 1]`.
pub(crate) fn chance<R: Rng + ?Sized>(rng: &mut R, p: f64) -> bool {
	if !(p > 0.0) {
		false
	} else if p >= 1.0 {
		true
	} else {
		rng.random_bool(p)
	}
}

/// Picks `a` with probability `bias`, otherwise `b`.
pub(crate) fn pick<'a, T, R: Rng + ?Sized>(rng: &mut R, a: &'a T, b: &'a T, bias: f64) -> &'a T {
	if chance(rng, bias) {
		a
	} else {
		b
	}
}

pub(crate) fn random_color<R: Rng + ?Sized>(rng: &mut R) -> Rgba {
	[rng.random(), rng.random(), rng.random(), rng.random()]
}

/// Gaussian jitter of the first `channels` channels, clamped to `[0, 255]`.
pub(crate) fn jitter_color<R: Rng + ?Sized>(rng: &mut R, color: Rgba, sigma: f64, channels: usize) -> Rgba {
	let mut out = color;
	for c in out.iter_mut().take(channels) {
		*c = gauss(rng, *c as f64, sigma).round().clamp(0.0, 255.0) as u8;
	}
	out
}

/// Axis-aligned region genes may occupy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Bounds {
	pub min: Point,
	pub max: Point,
}

impl Bounds {
	pub fn canvas(width: u32, height: u32) -> Self {
		Bounds {
			min: (0.0, 0.0),
			max: (width as f32, height as f32),
		}
	}

	pub fn clamp(&self, p: Point) -> Point {
		(p.0.clamp(self.min.0, self.max.0), p.1.clamp(self.min.1, self.max.1))
	}

	pub fn contains(&self, p: Point) -> bool {
		(self.min.0..=self.max.0).contains(&p.0) && (self.min.1..=self.max.1).contains(&p.1)
	}

	pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Point {
		(
			rng.random_range(self.min.0..=self.max.0),
			rng.random_range(self.min.1..=self.max.1),
		)
	}

	pub fn jitter<R: Rng + ?Sized>(&self, rng: &mut R, p: Point, sigma: f64) -> Point {
		let x = gauss(rng, p.0 as f64, sigma) as f32;
		let y = gauss(rng, p.1 as f64, sigma) as f32;
		self.clamp((x, y))
	}
}

pub(crate) fn scale_point(p: Point, factor: f64) -> Point {
	((p.0 as f64 * factor) as f32, (p.1 as f64 * factor) as f32)
}

pub(crate) fn scale_length(v: f32, factor: f64) -> f32 {
	(v as f64 * factor) as f32
}

pub(crate) fn finite(p: Point) -> bool {
	p.0.is_finite() && p.1.is_finite()
}

/// Rejects negative or non-finite magnitudes.
pub(crate) fn check_magnitude(key: &str, value: f64) -> Result<(), ConfigError> {
	if value.is_finite() && value >= 0.0 {
		Ok(())
	} else {
		Err(ConfigError::invalid(key, format!("must be a non-negative number, got {value}")))
	}
}

pub(crate) fn check_canvas(width: u32, height: u32) -> Result<(), ConfigError> {
	if width == 0 || height == 0 {
		return Err(ConfigError::invalid(
			"dimensions",
			format!("canvas must be non-empty, got {width}x{height}"),
		));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use rand::SeedableRng;
	use rand_pcg::Pcg64Mcg;

	use super::*;

	#[test]
	fn zero_sigma_is_identity() {
		let mut rng = Pcg64Mcg::seed_from_u64(0);
		assert_eq!(gauss(&mut rng, 3.5, 0.0), 3.5);
		assert_eq!(gauss(&mut rng, 3.5, -1.0), 3.5);
		assert_eq!(jitter_color(&mut rng, [1, 2, 3, 4], 0.0, 4), [1, 2, 3, 4]);
	}

	#[test]
	fn chance_extremes() {
		let mut rng = Pcg64Mcg::seed_from_u64(1);
		assert!((0..100).all(|_| chance(&mut rng, 1.0)));
		assert!((0..100).all(|_| !chance(&mut rng, 0.0)));
		assert!(!chance(&mut rng, f64::NAN));
	}

	#[test]
	fn jitter_keeps_alpha_when_asked() {
		let mut rng = Pcg64Mcg::seed_from_u64(2);
		for _ in 0..1000 {
			let c = jitter_color(&mut rng, [128, 128, 128, 77], 500.0, 3);
			assert_eq!(c[3], 77);
		}
	}

	#[test]
	fn bounds_clamp() {
		let b = Bounds::canvas(10, 5);
		assert_eq!(b.clamp((-3.0, 7.0)), (0.0, 5.0));
		let mut rng = Pcg64Mcg::seed_from_u64(3);
		for _ in 0..1000 {
			assert!(b.contains(b.jitter(&mut rng, (5.0, 2.0), 100.0)));
			assert!(b.contains(b.random_point(&mut rng)));
		}
	}
}
