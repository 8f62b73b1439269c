//! Triangle mesh genomes: a staggered grid of vertices which may drift within a
//! safety radius of their original position, and one color per triangle.

use bon::Builder;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
	errors::{ConfigError, DataError},
	genes::{chance, gauss, jitter_color, pick, scale_point},
	genetic::Representation,
	params::{EvoSpecs, Section},
	raster::{Canvas, Point, Rgba},
	wiggle::WigglePass,
};

/// Attempts at finding a vertex position within the safety radius.
const VERTEX_TRIES: usize = 100;
/// Color sigma at wiggle factor 1.
const COLOR_SPREAD: f64 = 50.0;

fn default_safe_only() -> bool {
	true
}

fn default_mutation_factor() -> f64 {
	0.4
}

/// Outline drawn around every triangle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Border {
	pub width: f32,
	pub color: Rgba,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Builder)]
pub struct MeshSpecs {
	pub rows: usize,
	pub points_per_row: usize,
	/// Keep every vertex within its safety radius, so triangles never flip.
	#[serde(default = "default_safe_only")]
	#[builder(default = default_safe_only())]
	pub safe_only: bool,
	/// Wiggle factor used by whole-genome mutation.
	#[serde(default = "default_mutation_factor")]
	#[builder(default = default_mutation_factor())]
	pub mutation_factor: f64,
	#[serde(default)]
	pub border: Option<Border>,
}

impl Section for MeshSpecs {
	const NAME: &'static str = "mesh genes";
	const REQUIRED: &'static [&'static str] = &["rows", "points_per_row"];
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeshVertex {
	pub original: Point,
	pub current: Point,
	pub safety_r: f32,
	pub mutable: bool,
}

impl MeshVertex {
	fn new(position: Point, safety_r: f32, mutable: bool) -> Self {
		MeshVertex {
			original: position,
			current: position,
			safety_r,
			mutable,
		}
	}

	/// Gaussian step of sigma `safety_r * factor` around the current position.
	/// Immutable vertices, and vertices that find no safe spot, stay put.
	pub fn wiggle<R: Rng + ?Sized>(&self, factor: f64, safe_only: bool, rng: &mut R) -> MeshVertex {
		let mut out = self.clone();
		if !self.mutable {
			return out;
		}
		let sigma = self.safety_r as f64 * factor;
		let (x, y) = self.current;
		let (ox, oy) = self.original;
		let limit = (self.safety_r as f64).powi(2);
		for _ in 0..VERTEX_TRIES {
			let nx = gauss(rng, x as f64, sigma);
			let ny = gauss(rng, y as f64, sigma);
			let dist = (ox as f64 - nx).powi(2) + (oy as f64 - ny).powi(2);
			if !safe_only || dist < limit {
				out.current = (nx as f32, ny as f32);
				break;
			}
		}
		out
	}
}

/// Gaussian jitter of the RGB channels; alpha is kept.
pub fn wiggle_color<R: Rng + ?Sized>(color: Rgba, factor: f64, rng: &mut R) -> Rgba {
	jitter_color(rng, color, COLOR_SPREAD * factor, 3)
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
	/// `rows + 1` rows of `points_per_row` vertices.
	pub vertices: Vec<Vec<MeshVertex>>,
	/// Two triangles per grid cell, stored row by row: upper half first, then lower.
	pub colors: Vec<Rgba>,
}

impl Mesh {
	/// Builds a fresh grid over a `width x height` canvas with random opaque colors.
	pub fn new<R: Rng + ?Sized>(width: u32, height: u32, rows: usize, points_per_row: usize, rng: &mut R) -> Mesh {
		let (w, h) = (width as f32, height as f32);
		let tri_w = w / (points_per_row as f32 - 1.5);
		let tri_h = h / rows as f32;
		let side = ((tri_w / 2.0).powi(2) + tri_h.powi(2)).sqrt();
		// largest radius of disjoint circles around the vertices
		let safety_r = side.min(tri_w) / 2.0;

		let vertices = (0..=rows)
			.map(|r| {
				let y = h * r as f32 / rows as f32;
				let shifted = r % 2 == 1;
				let inner = r % rows != 0;
				let mut row = Vec::with_capacity(points_per_row);
				row.push(MeshVertex::new((0.0, y), safety_r, false));
				for i in 1..points_per_row - 1 {
					let x = i as f32 * tri_w - if shifted { tri_w / 2.0 } else { 0.0 };
					row.push(MeshVertex::new((x, y), safety_r, inner));
				}
				row.push(MeshVertex::new((w, y), safety_r, false));
				row
			})
			.collect();

		let colors = (0..2 * (points_per_row - 1) * rows)
			.map(|_| [rng.random(), rng.random(), rng.random(), 255])
			.collect();
		Mesh { vertices, colors }
	}

	pub fn rows(&self) -> usize {
		self.vertices.len().saturating_sub(1)
	}

	pub fn points_per_row(&self) -> usize {
		self.vertices.first().map_or(0, Vec::len)
	}

	pub fn vertex_count(&self) -> usize {
		self.vertices.iter().map(Vec::len).sum()
	}

	fn vertex_mut(&mut self, index: usize) -> Option<&mut MeshVertex> {
		let ppr = self.points_per_row();
		if ppr == 0 {
			return None;
		}
		self.vertices.get_mut(index / ppr)?.get_mut(index % ppr)
	}

	/// Every triangle's corners with its color, in drawing order.
	pub fn triangles(&self) -> impl Iterator<Item = ([Point; 3], Rgba)> + '_ {
		let ppr = self.points_per_row();
		let cells = ppr.saturating_sub(1);
		(0..self.rows()).flat_map(move |r| {
			let shift = 1 - r % 2;
			let (top, bot) = (&self.vertices[r], &self.vertices[r + 1]);
			let upper = (0..cells).map(move |i| {
				let corners = [top[i].current, top[i + 1].current, bot[i + shift].current];
				(corners, self.colors[r * 2 * cells + i])
			});
			let lower = (0..cells).map(move |i| {
				let corners = [top[i + 1 - shift].current, bot[i].current, bot[i + 1].current];
				(corners, self.colors[(r * 2 + 1) * cells + i])
			});
			upper.chain(lower)
		})
	}

	/// Scales every position and safety radius by `factor`.
	pub fn scaled(&self, factor: f64) -> Mesh {
		let vertices = self
			.vertices
			.iter()
			.map(|row| {
				row.iter()
					.map(|v| MeshVertex {
						original: scale_point(v.original, factor),
						current: scale_point(v.current, factor),
						safety_r: (v.safety_r as f64 * factor) as f32,
						mutable: v.mutable,
					})
					.collect()
			})
			.collect();
		Mesh {
			vertices,
			colors: self.colors.clone(),
		}
	}
}

/// A slot value saved during a wiggle.
#[derive(Clone, Debug, PartialEq)]
pub enum MeshElement {
	Color(Rgba),
	Vertex(MeshVertex),
}

/// Mesh representation for the engine.
#[derive(Clone, Debug)]
pub struct MeshTools {
	width: u32,
	height: u32,
	specs: MeshSpecs,
	evo: EvoSpecs,
}

impl Representation for MeshTools {
	type Genome = Mesh;
	type Specs = MeshSpecs;
	type Element = MeshElement;

	fn from_specs(width: u32, height: u32, specs: MeshSpecs, evo: EvoSpecs) -> Result<Self, ConfigError> {
		crate::genes::check_canvas(width, height)?;
		evo.validate(false)?;
		if specs.rows < 1 {
			return Err(ConfigError::invalid("rows", "mesh needs at least one row"));
		}
		if specs.points_per_row < 3 {
			return Err(ConfigError::invalid(
				"points_per_row",
				format!("mesh needs at least 3 points per row, got {}", specs.points_per_row),
			));
		}
		if !(specs.mutation_factor.is_finite() && specs.mutation_factor >= 0.0) {
			return Err(ConfigError::invalid("mutation_factor", "must be a non-negative number"));
		}
		Ok(MeshTools {
			width,
			height,
			specs,
			evo,
		})
	}

	fn dimensions(&self) -> (u32, u32) {
		(self.width, self.height)
	}

	fn resize(&mut self, width: u32, height: u32, factor: f64) {
		self.width = width;
		self.height = height;
		if let Some(border) = &mut self.specs.border {
			border.width = (border.width as f64 * factor) as f32;
		}
	}

	fn gene_specs(&self) -> &MeshSpecs {
		&self.specs
	}

	fn evo_specs(&self) -> &EvoSpecs {
		&self.evo
	}

	fn random_genome<R: Rng + ?Sized>(&self, rng: &mut R) -> Mesh {
		Mesh::new(self.width, self.height, self.specs.rows, self.specs.points_per_row, rng)
	}

	fn mutate<R: Rng + ?Sized>(&self, mesh: &Mesh, rng: &mut R) -> Mesh {
		let factor = self.specs.mutation_factor;
		let ratio = self.evo.gene_mutation_ratio;
		let mut out = mesh.clone();
		for color in out.colors.iter_mut() {
			if chance(rng, ratio) {
				*color = wiggle_color(*color, factor, rng);
			}
		}
		for vertex in out.vertices.iter_mut().flatten() {
			if vertex.mutable && chance(rng, ratio) {
				*vertex = vertex.wiggle(factor, self.specs.safe_only, rng);
			}
		}
		out
	}

	fn combine<R: Rng + ?Sized>(&self, a: &Mesh, b: &Mesh, bias: f64, rng: &mut R) -> Mesh {
		let colors = a
			.colors
			.iter()
			.zip(&b.colors)
			.map(|(x, y)| *pick(rng, x, y, bias))
			.collect();
		let vertices = a
			.vertices
			.iter()
			.zip(&b.vertices)
			.map(|(ra, rb)| {
				ra.iter()
					.zip(rb)
					.map(|(x, y)| pick(rng, x, y, bias).clone())
					.collect()
			})
			.collect();
		Mesh { vertices, colors }
	}

	fn background(&self, _mesh: &Mesh) -> Rgba {
		[0, 0, 0, 255]
	}

	fn render<C: Canvas + ?Sized>(&self, mesh: &Mesh, canvas: &mut C) {
		for (corners, color) in mesh.triangles() {
			canvas.fill_polygon(&corners, color);
			if let Some(border) = &self.specs.border {
				canvas.stroke_polygon(&corners, border.width, border.color);
			}
		}
	}

	fn rescale(&self, mesh: &Mesh, factor: f64) -> Mesh {
		mesh.scaled(factor)
	}

	fn validate(&self, mesh: &Mesh) -> Result<(), DataError> {
		let (rows, ppr) = (self.specs.rows, self.specs.points_per_row);
		if mesh.vertices.len() != rows + 1 {
			return Err(DataError::InvalidGenome(format!(
				"expected {} vertex rows, found {}",
				rows + 1,
				mesh.vertices.len()
			)));
		}
		let expected = 2 * (ppr - 1) * rows;
		if mesh.colors.len() != expected {
			return Err(DataError::InvalidGenome(format!(
				"expected {expected} triangle colors, found {}",
				mesh.colors.len()
			)));
		}
		for (index, vertex) in mesh.vertices.iter().flatten().enumerate() {
			let ok = [vertex.original, vertex.current]
				.iter()
				.all(|p| p.0.is_finite() && p.1.is_finite())
				&& vertex.safety_r.is_finite()
				&& vertex.safety_r >= 0.0;
			if !ok {
				return Err(DataError::InvalidGene {
					index,
					reason: format!("corrupt vertex {vertex:?}"),
				});
			}
		}
		if let Some(row) = mesh.vertices.iter().position(|row| row.len() != ppr) {
			return Err(DataError::InvalidGenome(format!(
				"row {row} does not have {ppr} vertices"
			)));
		}
		Ok(())
	}

	fn wiggle_slots(&self, mesh: &Mesh, pass: WigglePass) -> usize {
		match pass {
			WigglePass::Color => mesh.colors.len(),
			WigglePass::Full => mesh.colors.len() + mesh.vertex_count(),
		}
	}

	fn perturb<R: Rng + ?Sized>(
		&self,
		mesh: &mut Mesh,
		_pass: WigglePass,
		slot: usize,
		intensity: f64,
		rng: &mut R,
	) -> Option<MeshElement> {
		if let Some(color) = mesh.colors.get_mut(slot) {
			let prior = *color;
			*color = wiggle_color(prior, intensity, rng);
			return (*color != prior).then_some(MeshElement::Color(prior));
		}
		let index = slot - mesh.colors.len();
		let vertex = mesh.vertex_mut(index)?;
		if !vertex.mutable {
			return None;
		}
		let moved = vertex.wiggle(intensity, self.specs.safe_only, rng);
		if moved == *vertex {
			return None;
		}
		Some(MeshElement::Vertex(std::mem::replace(vertex, moved)))
	}

	fn restore(&self, mesh: &mut Mesh, _pass: WigglePass, slot: usize, prior: MeshElement) {
		match prior {
			MeshElement::Color(c) => mesh.colors[slot] = c,
			MeshElement::Vertex(v) => {
				if let Some(vertex) = mesh.vertex_mut(slot - mesh.colors.len()) {
					*vertex = v;
				}
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use rand::SeedableRng;
	use rand_pcg::Pcg64Mcg;

	use super::*;
	use crate::raster::{Rasterizer, SoftRasterizer};

	fn evo() -> EvoSpecs {
		EvoSpecs::builder()
			.pop_size(4)
			.gene_mutation_ratio(0.5)
			.property_mutation_ratio(0.5)
			.combine_ratio(0.5)
			.build()
	}

	fn tools(rows: usize, ppr: usize) -> MeshTools {
		let specs = MeshSpecs::builder().rows(rows).points_per_row(ppr).build();
		MeshTools::from_specs(60, 40, specs, evo()).unwrap()
	}

	#[test]
	fn grid_shape() {
		let mut rng = Pcg64Mcg::seed_from_u64(1);
		let mesh = Mesh::new(60, 40, 4, 6, &mut rng);
		assert_eq!(mesh.vertices.len(), 5);
		assert!(mesh.vertices.iter().all(|row| row.len() == 6));
		assert_eq!(mesh.colors.len(), 2 * 5 * 4);
		assert_eq!(mesh.triangles().count(), mesh.colors.len());
		assert!(mesh.colors.iter().all(|c| c[3] == 255));

		// outer rows and outer columns are pinned
		for (r, row) in mesh.vertices.iter().enumerate() {
			for (i, v) in row.iter().enumerate() {
				let inner = r != 0 && r != 4 && i != 0 && i != 5;
				assert_eq!(v.mutable, inner, "vertex ({r}, {i})");
			}
		}
		// odd rows are staggered by half a triangle
		let tri_w = 60.0 / 4.5;
		assert!((mesh.vertices[0][1].original.0 - tri_w).abs() < 1e-4);
		assert!((mesh.vertices[1][1].original.0 - tri_w / 2.0).abs() < 1e-4);
		assert_eq!(mesh.vertices[2][5].original, (60.0, 20.0));
	}

	#[test]
	fn vertices_stay_safe() {
		let mut rng = Pcg64Mcg::seed_from_u64(2);
		let mesh = Mesh::new(60, 40, 3, 5, &mut rng);
		for row in &mesh.vertices {
			for v in row {
				let mut w = v.clone();
				for _ in 0..10_000 / 15 {
					w = w.wiggle(0.8, true, &mut rng);
					let d = ((w.current.0 - w.original.0).powi(2) + (w.current.1 - w.original.1).powi(2)).sqrt();
					assert!(d <= w.safety_r + 1e-3);
					if !v.mutable {
						assert_eq!(w.current, v.current);
					}
				}
			}
		}
	}

	#[test]
	fn colors_keep_alpha() {
		let mut rng = Pcg64Mcg::seed_from_u64(3);
		for _ in 0..10_000 {
			let c = wiggle_color([10, 250, 128, 200], 3.0, &mut rng);
			assert_eq!(c[3], 200);
		}
	}

	#[test]
	fn mutation_respects_bounds() {
		let tools = tools(3, 5);
		let mut rng = Pcg64Mcg::seed_from_u64(4);
		let mut mesh = tools.random_genome(&mut rng);
		let origin = mesh.clone();
		for _ in 0..10_000 {
			mesh = tools.mutate(&mesh, &mut rng);
		}
		assert!(tools.validate(&mesh).is_ok());
		for (row, orig) in mesh.vertices.iter().zip(&origin.vertices) {
			for (v, o) in row.iter().zip(orig) {
				assert_eq!(v.original, o.original);
				if !v.mutable {
					assert_eq!(v.current, o.current);
				}
			}
		}
		assert!(mesh.colors.iter().all(|c| c[3] == 255));
	}

	#[test]
	fn combine_bias_extremes() {
		let tools = tools(2, 4);
		let mut rng = Pcg64Mcg::seed_from_u64(5);
		let a = tools.random_genome(&mut rng);
		let b = tools.mutate(&tools.random_genome(&mut rng), &mut rng);
		assert_eq!(tools.combine(&a, &b, 1.0, &mut rng), a);
		assert_eq!(tools.combine(&a, &b, 0.0, &mut rng), b);
	}

	#[test]
	fn scale_round_trip() {
		let tools = tools(2, 4);
		let mut rng = Pcg64Mcg::seed_from_u64(6);
		let mesh = tools.mutate(&tools.random_genome(&mut rng), &mut rng);
		let back = mesh.scaled(3.0).scaled(1.0 / 3.0);
		for (row, orig) in back.vertices.iter().zip(&mesh.vertices) {
			for (v, o) in row.iter().zip(orig) {
				assert!((v.current.0 - o.current.0).abs() < 1e-3);
				assert!((v.current.1 - o.current.1).abs() < 1e-3);
				assert!((v.safety_r - o.safety_r).abs() < 1e-3);
			}
		}
		assert_eq!(back.colors, mesh.colors);
	}

	#[test]
	fn resize_scales_border() {
		let specs = MeshSpecs::builder()
			.rows(2)
			.points_per_row(4)
			.border(Border {
				width: 1.5,
				color: [0, 0, 0, 255],
			})
			.build();
		let mut tools = MeshTools::from_specs(60, 40, specs, evo()).unwrap();
		tools.resize(240, 160, 4.0);
		assert_eq!(tools.dimensions(), (240, 160));
		assert_eq!(tools.gene_specs().border.as_ref().map(|b| b.width), Some(6.0));
	}

	#[test]
	fn covers_the_canvas() {
		let tools = tools(3, 5);
		let mut rng = Pcg64Mcg::seed_from_u64(7);
		let mut mesh = tools.random_genome(&mut rng);
		mesh.colors.iter_mut().for_each(|c| *c = [200, 10, 10, 255]);
		let mut canvas = SoftRasterizer::default().new_canvas(60, 40, tools.background(&mesh)).unwrap();
		tools.render(&mesh, &mut canvas);
		assert!(canvas.to_image().pixels().all(|p| p.0 == [200, 10, 10]));
	}

	#[test]
	fn perturb_and_restore() {
		let tools = tools(2, 4);
		let mut rng = Pcg64Mcg::seed_from_u64(8);
		let mesh = tools.random_genome(&mut rng);
		let slots = tools.wiggle_slots(&mesh, WigglePass::Full);
		assert_eq!(slots, mesh.colors.len() + 12);
		for slot in 0..slots {
			let mut m = mesh.clone();
			if let Some(prior) = tools.perturb(&mut m, WigglePass::Full, slot, 1.0, &mut rng) {
				assert_ne!(m, mesh);
				tools.restore(&mut m, WigglePass::Full, slot, prior);
			}
			assert_eq!(m, mesh);
		}
		// the first vertex of every row is pinned
		let mut m = mesh.clone();
		assert!(tools.perturb(&mut m, WigglePass::Full, mesh.colors.len(), 1.0, &mut rng).is_none());
	}

	#[test]
	fn validation_catches_corruption() {
		let tools = tools(2, 4);
		let mut rng = Pcg64Mcg::seed_from_u64(9);
		let mut mesh = tools.random_genome(&mut rng);
		assert!(tools.validate(&mesh).is_ok());
		mesh.colors.pop();
		assert!(tools.validate(&mesh).is_err());
		let mut mesh = tools.random_genome(&mut rng);
		mesh.vertices[1][1].current = (f32::NAN, 0.0);
		assert!(matches!(tools.validate(&mesh), Err(DataError::InvalidGene { index: 5, .. })));
	}

	#[test]
	fn json_round_trip() {
		let mut rng = Pcg64Mcg::seed_from_u64(10);
		let mesh = tools(1, 3).random_genome(&mut rng);
		let json = serde_json::to_string(&mesh).unwrap();
		assert_eq!(serde_json::from_str::<Mesh>(&json).unwrap(), mesh);
	}
}
