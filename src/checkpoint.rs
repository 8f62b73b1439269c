//! Checkpoints: the best genome of a run, with everything needed to resume or redraw it.

use std::{fs, path::Path};

use eyre::WrapErr;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::{
	errors::DataError,
	fitness,
	genes::{CircleKind, LetterKind, PolygonKind},
	genetic::{GeneKind, Representation},
	genome::{Dna, DnaTools},
	mesh::{Mesh, MeshSpecs, MeshTools},
	params::{EvoSpecs, Kind, PolicySpecs},
	raster::{Canvas, Rasterizer},
};

/// A typed checkpoint body for one representation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot<S, G> {
	pub width: u32,
	pub height: u32,
	/// Generations evolved so far, across resumes.
	pub steps: usize,
	pub gene_specs: S,
	pub evo_specs: EvoSpecs,
	#[serde(default)]
	pub policy: PolicySpecs,
	pub dna: G,
}

impl<S: Clone, G> Snapshot<S, G> {
	/// Rebuilds the representation and checks the genome against it.
	pub fn restore<R>(&self) -> eyre::Result<(R, G)>
	where
		R: Representation<Specs = S, Genome = G>,
		G: Clone,
	{
		let repr = R::from_specs(self.width, self.height, self.gene_specs.clone(), self.evo_specs.clone())?;
		repr.validate(&self.dna)?;
		Ok((repr, self.dna.clone()))
	}

	/// Renders the genome at `new_width`, scaling every gene and the canvas height to match.
	pub fn render<R, Z>(&self, rasterizer: &Z, new_width: Option<u32>) -> eyre::Result<RgbImage>
	where
		R: Representation<Specs = S, Genome = G>,
		Z: Rasterizer,
		G: Clone,
	{
		let (mut repr, dna) = self.restore::<R>()?;
		let dna = match new_width {
			Some(w) if w != self.width => rescale(&mut repr, &dna, w)?,
			_ => dna,
		};
		Ok(fitness::render(&repr, rasterizer, &dna)?.into_image())
	}
}

/// Scales `genome` from the representation's width to `new_width` and resizes the representation.
pub fn rescale<R: Representation>(repr: &mut R, genome: &R::Genome, new_width: u32) -> Result<R::Genome, DataError> {
	let (w, h) = repr.dimensions();
	if new_width == 0 {
		return Err(DataError::InvalidGenome("cannot rescale to zero width".to_string()));
	}
	let factor = new_width as f64 / w as f64;
	let new_height = ((h as f64 * factor).round() as u32).max(1);
	log::debug!("Rescaling {w}x{h} to {new_width}x{new_height} (x{factor:.3}).");
	repr.resize(new_width, new_height, factor);
	Ok(repr.rescale(genome, factor))
}

type DnaSnapshot<K> = Snapshot<<K as GeneKind>::Specs, Dna<K>>;

/// On-disk checkpoint, tagged by gene kind.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, derive_more::From)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Checkpoint {
	Circle(DnaSnapshot<CircleKind>),
	Polygon(DnaSnapshot<PolygonKind>),
	Letter(DnaSnapshot<LetterKind>),
	Mesh(Snapshot<MeshSpecs, Mesh>),
}

impl Checkpoint {
	pub fn kind(&self) -> Kind {
		match self {
			Checkpoint::Circle(_) => Kind::Circle,
			Checkpoint::Polygon(_) => Kind::Polygon,
			Checkpoint::Letter(_) => Kind::Letter,
			Checkpoint::Mesh(_) => Kind::Mesh,
		}
	}

	pub fn steps(&self) -> usize {
		match self {
			Checkpoint::Circle(s) => s.steps,
			Checkpoint::Polygon(s) => s.steps,
			Checkpoint::Letter(s) => s.steps,
			Checkpoint::Mesh(s) => s.steps,
		}
	}

	pub fn dimensions(&self) -> (u32, u32) {
		match self {
			Checkpoint::Circle(s) => (s.width, s.height),
			Checkpoint::Polygon(s) => (s.width, s.height),
			Checkpoint::Letter(s) => (s.width, s.height),
			Checkpoint::Mesh(s) => (s.width, s.height),
		}
	}

	/// Renders the stored genome, optionally upscaled to `new_width`.
	pub fn render<Z: Rasterizer>(&self, rasterizer: &Z, new_width: Option<u32>) -> eyre::Result<RgbImage> {
		match self {
			Checkpoint::Circle(s) => s.render::<DnaTools<CircleKind>, Z>(rasterizer, new_width),
			Checkpoint::Polygon(s) => s.render::<DnaTools<PolygonKind>, Z>(rasterizer, new_width),
			Checkpoint::Letter(s) => s.render::<DnaTools<LetterKind>, Z>(rasterizer, new_width),
			Checkpoint::Mesh(s) => s.render::<MeshTools, Z>(rasterizer, new_width),
		}
	}

	pub fn to_json(&self) -> eyre::Result<String> {
		Ok(serde_json::to_string(self)?)
	}

	pub fn from_json(text: &str) -> eyre::Result<Self> {
		serde_json::from_str(text).wrap_err("malformed checkpoint")
	}

	pub fn save(&self, path: impl AsRef<Path>) -> eyre::Result<()> {
		let path = path.as_ref();
		fs::write(path, self.to_json()?).wrap_err_with(|| format!("writing checkpoint {}", path.display()))?;
		log::info!("Saved {} checkpoint at step {} to {}.", self.kind(), self.steps(), path.display());
		Ok(())
	}

	pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
		let path = path.as_ref();
		let text = fs::read_to_string(path).wrap_err_with(|| format!("reading checkpoint {}", path.display()))?;
		Self::from_json(&text).wrap_err_with(|| format!("in {}", path.display()))
	}
}
