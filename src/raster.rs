//! Rasterization of primitives onto a tiny-skia pixmap.
//!
//! Shapes are filled without anti-aliasing, so a pixel is covered when its
//! centre lies inside. Painting an opaque color over itself leaves the pixmap
//! untouched, so the fitness of a perfect reproduction is exactly zero.

use std::{
	collections::HashMap,
	fmt::Debug,
	fs,
	path::Path,
	sync::{Arc, RwLock},
};

use ab_glyph::{point, Font, FontArc, PxScale, ScaleFont};
use eyre::WrapErr;
use image::{Rgb, RgbImage};
use tiny_skia as sk;

use crate::errors::DataError;

/// 8-bit RGBA color.
pub type Rgba = [u8; 4];
/// Sub-pixel position in canvas coordinates.
pub type Point = (f32, f32);

/// A drawing surface which alpha-composites every primitive onto what is already there.
pub trait Canvas {
	fn dimensions(&self) -> (u32, u32);

	/// Fills every pixel whose centre lies within `radius` of `center`.
	fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba);

	/// Fills a simple polygon using the even-odd rule.
	fn fill_polygon(&mut self, points: &[Point], color: Rgba);

	/// Draws one glyph with the right end of its advance and its baseline at `anchor`.
	fn draw_glyph(&mut self, anchor: Point, size: f32, glyph: char, color: Rgba);

	/// Traces the closed outline of `points` with round joins.
	fn stroke_polygon(&mut self, points: &[Point], width: f32, color: Rgba);

	/// Copies the current pixels out as opaque RGB.
	fn to_image(&self) -> RgbImage;

	fn into_image(self) -> RgbImage
	where
		Self: Sized,
	{
		self.to_image()
	}
}

/// Hands out blank canvases. Shared by all fitness worker threads.
pub trait Rasterizer: Sync {
	type Canvas: Canvas;

	fn new_canvas(&self, width: u32, height: u32, background: Rgba) -> Result<Self::Canvas, DataError>;
}

/// Alpha coverage for a single rendered glyph.
#[derive(Clone, Debug, PartialEq)]
pub struct GlyphMask {
	pub width: u32,
	pub height: u32,
	/// Offset of the mask's left column from the pen position.
	pub left: i32,
	/// Offset of the mask's top row from the baseline; negative is above.
	pub top: i32,
	/// Horizontal distance the pen moves past this glyph.
	pub advance: f32,
	/// Row-major coverage, `width * height` entries.
	pub coverage: Vec<u8>,
}

/// Source of glyph shapes, keyed by character and size in pixels per em.
/// Whitespace and characters the source cannot draw yield `None`.
pub trait GlyphSource: Debug + Send + Sync {
	fn glyph(&self, glyph: char, size: f32) -> Option<Arc<GlyphMask>>;
}

/// Glyphs are rendered at whole pixel sizes.
fn pixel_size(size: f32) -> Option<u32> {
	let px = size.round();
	(px.is_finite() && px >= 1.0).then_some(px as u32)
}

const GLYPH_CACHE_BYTES: usize = 64 << 20;

#[derive(Debug, Default)]
struct GlyphTable {
	masks: HashMap<(char, u32), Option<Arc<GlyphMask>>>,
	bytes: usize,
}

/// Masks shared across threads, dropped wholesale once they outgrow the budget.
#[derive(Debug, Default)]
struct GlyphCache {
	table: RwLock<GlyphTable>,
}

impl GlyphCache {
	fn get_or_insert_with(&self, key: (char, u32), make: impl FnOnce() -> Option<GlyphMask>) -> Option<Arc<GlyphMask>> {
		if let Ok(table) = self.table.read() {
			if let Some(hit) = table.masks.get(&key) {
				return hit.clone();
			}
		}
		let mask = make().map(Arc::new);
		if let Ok(mut table) = self.table.write() {
			let bytes = mask.as_ref().map_or(0, |m| m.coverage.len()) + 64;
			if table.bytes + bytes > GLYPH_CACHE_BYTES {
				log::debug!("Glyph cache full at {} masks, clearing.", table.masks.len());
				table.masks.clear();
				table.bytes = 0;
			}
			table.bytes += bytes;
			table.masks.insert(key, mask.clone());
		}
		mask
	}
}

/// Font-free glyphs: every visible character is the same solid cell, proportioned
/// like a sans-serif capital. Useful where rendering must not depend on a font file.
#[derive(Debug, Default)]
pub struct BlockGlyphs {
	cache: GlyphCache,
}

impl GlyphSource for BlockGlyphs {
	fn glyph(&self, glyph: char, size: f32) -> Option<Arc<GlyphMask>> {
		if glyph.is_whitespace() {
			return None;
		}
		let px = pixel_size(size)?;
		self.cache.get_or_insert_with((glyph, px), || {
			let width = (px as f32 * 0.6).round().max(1.0) as u32;
			let height = (px as f32 * 0.72).round().max(1.0) as u32;
			Some(GlyphMask {
				width,
				height,
				left: 0,
				top: -(height as i32),
				advance: width as f32,
				coverage: vec![255; (width * height) as usize],
			})
		})
	}
}

/// Common locations of a sans-serif TrueType font.
pub const SYSTEM_FONTS: &[&str] = &[
	"/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
	"/usr/share/fonts/TTF/DejaVuSans.ttf",
	"/usr/share/fonts/dejavu/DejaVuSans.ttf",
	"/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
	"/Library/Fonts/Arial.ttf",
	"/System/Library/Fonts/Supplemental/Arial.ttf",
	"C:\\Windows\\Fonts\\arial.ttf",
];

/// Glyphs outlined from a TrueType or OpenType font.
#[derive(Debug)]
pub struct FontGlyphs {
	font: FontArc,
	cache: GlyphCache,
}

impl FontGlyphs {
	pub fn from_bytes(data: Vec<u8>) -> eyre::Result<Self> {
		let font = FontArc::try_from_vec(data).wrap_err("not a usable font")?;
		Ok(FontGlyphs {
			font,
			cache: GlyphCache::default(),
		})
	}

	pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
		let path = path.as_ref();
		let data = fs::read(path).wrap_err_with(|| format!("reading font {}", path.display()))?;
		Self::from_bytes(data).wrap_err_with(|| format!("loading font {}", path.display()))
	}

	/// The first of [`SYSTEM_FONTS`] that loads.
	pub fn system() -> Option<Self> {
		SYSTEM_FONTS.iter().find_map(|path| {
			let glyphs = Self::load(path).ok()?;
			log::debug!("Using font {path}.");
			Some(glyphs)
		})
	}

	fn rasterize(&self, glyph: char, px: u32) -> Option<GlyphMask> {
		let id = self.font.glyph_id(glyph);
		if id.0 == 0 {
			return None;
		}
		// PxScale is the ascent-to-descent height; sizes here are pixels per em
		let em = px as f32;
		let scale = match self.font.units_per_em() {
			Some(units) => PxScale::from(em * self.font.height_unscaled() / units),
			None => PxScale::from(em),
		};
		let advance = self.font.as_scaled(scale).h_advance(id);
		let outlined = self.font.outline_glyph(id.with_scale_and_position(scale, point(0.0, 0.0)))?;
		let bounds = outlined.px_bounds();
		let (width, height) = (bounds.width() as u32, bounds.height() as u32);
		if width == 0 || height == 0 {
			return None;
		}
		let mut coverage = vec![0; (width * height) as usize];
		outlined.draw(|x, y, c| {
			if let Some(cell) = coverage.get_mut((y * width + x) as usize) {
				*cell = (c.clamp(0.0, 1.0) * 255.0).round() as u8;
			}
		});
		Some(GlyphMask {
			width,
			height,
			left: bounds.min.x as i32,
			top: bounds.min.y as i32,
			advance,
			coverage,
		})
	}
}

impl GlyphSource for FontGlyphs {
	fn glyph(&self, glyph: char, size: f32) -> Option<Arc<GlyphMask>> {
		if glyph.is_whitespace() {
			return None;
		}
		let px = pixel_size(size)?;
		self.cache.get_or_insert_with((glyph, px), || self.rasterize(glyph, px))
	}
}

/// CPU rasterizer backed by a tiny-skia [`Pixmap`](sk::Pixmap).
#[derive(Clone, Debug)]
pub struct SoftRasterizer {
	glyphs: Arc<dyn GlyphSource>,
}

impl SoftRasterizer {
	pub fn new(glyphs: impl GlyphSource + 'static) -> Self {
		SoftRasterizer {
			glyphs: Arc::new(glyphs),
		}
	}

	pub fn glyphs(&self) -> &dyn GlyphSource {
		self.glyphs.as_ref()
	}
}

impl Default for SoftRasterizer {
	fn default() -> Self {
		SoftRasterizer::new(BlockGlyphs::default())
	}
}

impl Rasterizer for SoftRasterizer {
	type Canvas = Raster;

	fn new_canvas(&self, width: u32, height: u32, background: Rgba) -> Result<Raster, DataError> {
		let mut pixmap = sk::Pixmap::new(width, height).ok_or(DataError::Canvas { width, height })?;
		pixmap.fill(sk::Color::from_rgba8(background[0], background[1], background[2], 255));
		Ok(Raster {
			pixmap,
			glyphs: Arc::clone(&self.glyphs),
		})
	}
}

#[derive(Clone, Debug)]
pub struct Raster {
	pixmap: sk::Pixmap,
	glyphs: Arc<dyn GlyphSource>,
}

fn paint(color: Rgba) -> sk::Paint<'static> {
	let mut paint = sk::Paint::default();
	paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
	paint.anti_alias = false;
	paint
}

fn finite(p: Point) -> bool {
	p.0.is_finite() && p.1.is_finite()
}

/// Closed path through `points`.
fn outline(points: &[Point]) -> Option<sk::Path> {
	let (&(x0, y0), rest) = points.split_first()?;
	let mut pb = sk::PathBuilder::new();
	pb.move_to(x0, y0);
	for &(x, y) in rest {
		pb.line_to(x, y);
	}
	pb.close();
	pb.finish()
}

#[inline]
fn mul255(a: u8, b: u8) -> u8 {
	((a as u32 * b as u32 + 127) / 255) as u8
}

impl Canvas for Raster {
	fn dimensions(&self) -> (u32, u32) {
		(self.pixmap.width(), self.pixmap.height())
	}

	fn fill_circle(&mut self, center: Point, radius: f32, color: Rgba) {
		if !(radius > 0.0) || color[3] == 0 || !finite(center) {
			return;
		}
		let Some(path) = sk::PathBuilder::from_circle(center.0, center.1, radius) else {
			return;
		};
		self.pixmap
			.fill_path(&path, &paint(color), sk::FillRule::Winding, sk::Transform::identity(), None);
	}

	fn fill_polygon(&mut self, points: &[Point], color: Rgba) {
		if points.len() < 3 || color[3] == 0 || !points.iter().copied().all(finite) {
			return;
		}
		let Some(path) = outline(points) else {
			return;
		};
		self.pixmap
			.fill_path(&path, &paint(color), sk::FillRule::EvenOdd, sk::Transform::identity(), None);
	}

	fn draw_glyph(&mut self, anchor: Point, size: f32, glyph: char, color: Rgba) {
		if color[3] == 0 || !finite(anchor) {
			return;
		}
		let Some(mask) = self.glyphs.glyph(glyph, size) else {
			return;
		};
		let Some(dims) = sk::IntSize::from_wh(mask.width, mask.height) else {
			return;
		};
		// premultiplied stamp of the glyph in `color`
		let data = mask
			.coverage
			.iter()
			.flat_map(|&cover| {
				let a = mul255(color[3], cover);
				[mul255(color[0], a), mul255(color[1], a), mul255(color[2], a), a]
			})
			.collect();
		let Some(stamp) = sk::Pixmap::from_vec(data, dims) else {
			return;
		};
		let pen_x = (anchor.0 - mask.advance).round() as i32;
		let pen_y = anchor.1.round() as i32;
		self.pixmap.draw_pixmap(
			pen_x + mask.left,
			pen_y + mask.top,
			stamp.as_ref(),
			&sk::PixmapPaint::default(),
			sk::Transform::identity(),
			None,
		);
	}

	fn stroke_polygon(&mut self, points: &[Point], width: f32, color: Rgba) {
		if points.len() < 2 || !(width > 0.0) || color[3] == 0 || !points.iter().copied().all(finite) {
			return;
		}
		let Some(path) = outline(points) else {
			return;
		};
		let stroke = sk::Stroke {
			width,
			line_join: sk::LineJoin::Round,
			line_cap: sk::LineCap::Round,
			..sk::Stroke::default()
		};
		self.pixmap
			.stroke_path(&path, &paint(color), &stroke, sk::Transform::identity(), None);
	}

	fn to_image(&self) -> RgbImage {
		let (w, h) = self.dimensions();
		RgbImage::from_fn(w, h, |x, y| {
			self.pixmap.pixel(x, y).map_or(Rgb([0, 0, 0]), |p| {
				let c = p.demultiply();
				Rgb([c.red(), c.green(), c.blue()])
			})
		})
	}
}
