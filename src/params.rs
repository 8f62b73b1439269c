//! Run parameters: typed records for the gene kinds, the evolution, and the policy,
//! plus the TOML run configuration that ties them together.

use std::{fs, path::Path, str::FromStr};

use bon::Builder;
use derive_more::Display;
use eyre::WrapErr;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use toml::{Table, Value};

use crate::{
	errors::ConfigError,
	genes::{CircleSpecs, LetterSpecs, PolygonSpecs},
	mesh::MeshSpecs,
};

/// A named group of parameters with keys that must be present in a configuration.
pub trait Section {
	const NAME: &'static str;
	const REQUIRED: &'static [&'static str];

	/// Collects every required key missing from `table`.
	fn check(table: &Table) -> Result<(), ConfigError> {
		check_keys(Self::NAME, table, Self::REQUIRED)
	}
}

fn check_keys(section: &str, table: &Table, required: &[&str]) -> Result<(), ConfigError> {
	let keys: Vec<String> = required
		.iter()
		.filter(|k| !table.contains_key(**k))
		.map(|k| k.to_string())
		.collect();
	if keys.is_empty() {
		Ok(())
	} else {
		Err(ConfigError::MissingKeys {
			section: section.to_string(),
			keys,
		})
	}
}

fn check_ratio(key: &str, value: f64) -> Result<(), ConfigError> {
	if (0.0..=1.0).contains(&value) {
		Ok(())
	} else {
		Err(ConfigError::invalid(key, format!("must be in [0, 1], got {value}")))
	}
}

/// Primitive the genomes are made of.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
	#[default]
	#[display("circle")]
	Circle,
	#[display("polygon")]
	Polygon,
	#[display("letter")]
	Letter,
	#[display("mesh")]
	Mesh,
}

impl FromStr for Kind {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"circle" => Ok(Kind::Circle),
			"polygon" => Ok(Kind::Polygon),
			"letter" => Ok(Kind::Letter),
			"mesh" => Ok(Kind::Mesh),
			other => Err(ConfigError::UnknownKind(other.to_string())),
		}
	}
}

fn default_gene_switch_ratio() -> f64 {
	0.2
}

/// Population and variation parameters shared by every policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Builder)]
pub struct EvoSpecs {
	pub pop_size: usize,
	/// Genes per genome. Meshes derive their size from the grid instead.
	#[serde(default)]
	#[builder(default)]
	pub dna_len: usize,
	pub gene_mutation_ratio: f64,     // chance each gene is mutated
	pub property_mutation_ratio: f64, // chance each attribute of a mutated gene changes
	pub combine_ratio: f64,           // bias towards the first parent
	#[serde(default = "default_gene_switch_ratio")]
	#[builder(default = default_gene_switch_ratio())]
	pub gene_switch_ratio: f64, // chance two genes swap places
}

impl Section for EvoSpecs {
	const NAME: &'static str = "evolution";
	const REQUIRED: &'static [&'static str] = &[
		"pop_size",
		"gene_mutation_ratio",
		"property_mutation_ratio",
		"combine_ratio",
	];
}

impl EvoSpecs {
	/// Keys required for `kind`; only meshes go without `dna_len`.
	pub fn check_for(kind: Kind, table: &Table) -> Result<(), ConfigError> {
		let mut required = Self::REQUIRED.to_vec();
		if kind != Kind::Mesh {
			required.push("dna_len");
		}
		check_keys(Self::NAME, table, &required)
	}

	pub fn validate(&self, needs_dna: bool) -> Result<(), ConfigError> {
		if self.pop_size < 2 {
			return Err(ConfigError::invalid(
				"pop_size",
				format!("population needs at least 2 members, got {}", self.pop_size),
			));
		}
		if needs_dna && self.dna_len < 1 {
			return Err(ConfigError::invalid("dna_len", "genomes need at least one gene"));
		}
		check_ratio("gene_mutation_ratio", self.gene_mutation_ratio)?;
		check_ratio("property_mutation_ratio", self.property_mutation_ratio)?;
		check_ratio("combine_ratio", self.combine_ratio)?;
		check_ratio("gene_switch_ratio", self.gene_switch_ratio)?;
		Ok(())
	}
}

fn default_halving_every() -> usize {
	5
}
fn default_wiggle_every() -> usize {
	1
}
fn default_intensity_start() -> f64 {
	0.4
}
fn default_intensity_floor() -> f64 {
	0.1
}
fn default_reseed_mutations() -> usize {
	5
}
fn default_crossover_bias() -> f64 {
	0.5
}

/// Elitist halving with local search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Builder)]
pub struct HalvingSpecs {
	/// Perturbations tried per slot in every wiggle.
	pub wiggle_steps: usize,
	/// Generations over which wiggle intensity falls from start to floor.
	pub anneal_generations: usize,
	#[serde(default = "default_halving_every")]
	#[builder(default = default_halving_every())]
	pub halving_every: usize, // 0 disables halving
	#[serde(default = "default_wiggle_every")]
	#[builder(default = default_wiggle_every())]
	pub wiggle_every: usize, // 0 disables wiggling
	#[serde(default)]
	#[builder(default)]
	pub color_generations: usize, // leading generations that only touch colors
	#[serde(default = "default_intensity_start")]
	#[builder(default = default_intensity_start())]
	pub intensity_start: f64,
	#[serde(default = "default_intensity_floor")]
	#[builder(default = default_intensity_floor())]
	pub intensity_floor: f64,
	#[serde(default)]
	#[builder(default)]
	pub reseed_every: usize, // 0 disables exploration reseeding
	#[serde(default = "default_reseed_mutations")]
	#[builder(default = default_reseed_mutations())]
	pub reseed_mutations: usize,
	#[serde(default = "default_crossover_bias")]
	#[builder(default = default_crossover_bias())]
	pub crossover_bias: f64,
}

impl Section for HalvingSpecs {
	const NAME: &'static str = "halving policy";
	const REQUIRED: &'static [&'static str] = &["wiggle_steps", "anneal_generations"];
}

impl HalvingSpecs {
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.anneal_generations == 0 {
			return Err(ConfigError::invalid("anneal_generations", "must be at least 1"));
		}
		for (key, value) in [
			("intensity_start", self.intensity_start),
			("intensity_floor", self.intensity_floor),
		] {
			if !(value.is_finite() && value >= 0.0) {
				return Err(ConfigError::invalid(key, format!("must be a non-negative number, got {value}")));
			}
		}
		check_ratio("crossover_bias", self.crossover_bias)
	}

	/// Linear decay from `intensity_start` to `intensity_floor`, flat afterwards.
	pub fn intensity(&self, generation: usize) -> f64 {
		let span = self.anneal_generations.max(1);
		let t = generation.min(span) as f64 / span as f64;
		self.intensity_start + (self.intensity_floor - self.intensity_start) * t
	}
}

/// Which update rule drives the population.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum PolicySpecs {
	#[default]
	Tournament,
	Halving(HalvingSpecs),
}

impl PolicySpecs {
	pub fn validate(&self) -> Result<(), ConfigError> {
		match self {
			PolicySpecs::Tournament => Ok(()),
			PolicySpecs::Halving(h) => h.validate(),
		}
	}
}

/// Gene parameters for the configured kind.
#[derive(Clone, Debug, PartialEq)]
pub enum GeneSpecs {
	Circle(CircleSpecs),
	Polygon(PolygonSpecs),
	Letter(LetterSpecs),
	Mesh(MeshSpecs),
}

impl GeneSpecs {
	pub fn kind(&self) -> Kind {
		match self {
			GeneSpecs::Circle(_) => Kind::Circle,
			GeneSpecs::Polygon(_) => Kind::Polygon,
			GeneSpecs::Letter(_) => Kind::Letter,
			GeneSpecs::Mesh(_) => Kind::Mesh,
		}
	}

	fn from_table(kind: Kind, table: Table) -> Result<Self, ConfigError> {
		Ok(match kind {
			Kind::Circle => {
				CircleSpecs::check(&table)?;
				GeneSpecs::Circle(typed(table)?)
			}
			Kind::Polygon => {
				PolygonSpecs::check(&table)?;
				GeneSpecs::Polygon(typed(table)?)
			}
			Kind::Letter => {
				LetterSpecs::check(&table)?;
				GeneSpecs::Letter(typed(table)?)
			}
			Kind::Mesh => {
				MeshSpecs::check(&table)?;
				GeneSpecs::Mesh(typed(table)?)
			}
		})
	}
}

/// A full run configuration, usually read from TOML:
///
/// ```toml
/// [evolution]
/// kind = "polygon"
/// pop_size = 20
/// dna_len = 100
/// gene_mutation_ratio = 0.1
/// property_mutation_ratio = 0.3
/// combine_ratio = 0.5
///
/// [evolution.policy]
/// name = "halving"
/// wiggle_steps = 2
/// anneal_generations = 200
///
/// [genes]
/// max_n = 5
/// init_r = 50.0
/// mut_p = 30.0
/// mut_c = 30.0
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
	pub evo: EvoSpecs,
	pub policy: PolicySpecs,
	pub genes: GeneSpecs,
}

fn typed<T: DeserializeOwned>(table: Table) -> Result<T, ConfigError> {
	Value::Table(table)
		.try_into()
		.map_err(|e: toml::de::Error| ConfigError::Parse(e.message().to_string()))
}

fn take_table(root: &mut Table, key: &str, section: &str) -> Result<Option<Table>, ConfigError> {
	match root.remove(key) {
		None => Ok(None),
		Some(Value::Table(t)) => Ok(Some(t)),
		Some(_) => Err(ConfigError::invalid(key, format!("{section} must be a table"))),
	}
}

impl RunConfig {
	pub fn kind(&self) -> Kind {
		self.genes.kind()
	}

	pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
		let mut root: Table = text
			.parse()
			.map_err(|e: toml::de::Error| ConfigError::Parse(e.message().to_string()))?;

		let missing = |key: &str| ConfigError::MissingKeys {
			section: "configuration".to_string(),
			keys: vec![key.to_string()],
		};
		let mut evolution = take_table(&mut root, "evolution", "evolution")?.ok_or_else(|| missing("evolution"))?;
		let genes = take_table(&mut root, "genes", "genes")?.ok_or_else(|| missing("genes"))?;

		let kind = match evolution.remove("kind") {
			None => Kind::default(),
			Some(Value::String(s)) => s.parse()?,
			Some(other) => return Err(ConfigError::UnknownKind(other.to_string())),
		};

		let policy = match take_table(&mut evolution, "policy", "evolution.policy")? {
			None => PolicySpecs::Tournament,
			Some(mut table) => {
				let name = match table.remove("name") {
					None => "tournament".to_string(),
					Some(Value::String(s)) => s.to_ascii_lowercase(),
					Some(other) => return Err(ConfigError::UnknownPolicy(other.to_string())),
				};
				match name.as_str() {
					"tournament" => PolicySpecs::Tournament,
					"halving" => {
						HalvingSpecs::check(&table)?;
						PolicySpecs::Halving(typed(table)?)
					}
					_ => return Err(ConfigError::UnknownPolicy(name)),
				}
			}
		};

		EvoSpecs::check_for(kind, &evolution)?;
		let evo: EvoSpecs = typed(evolution)?;
		let genes = GeneSpecs::from_table(kind, genes)?;

		evo.validate(kind != Kind::Mesh)?;
		policy.validate()?;
		log::debug!("Parsed {kind} configuration with {policy:?}.");
		Ok(RunConfig { evo, policy, genes })
	}

	pub fn load(path: impl AsRef<Path>) -> eyre::Result<Self> {
		let path = path.as_ref();
		let text = fs::read_to_string(path).wrap_err_with(|| format!("reading config {}", path.display()))?;
		Ok(Self::from_toml(&text)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const CIRCLES: &str = r#"
[evolution]
pop_size = 10
dna_len = 50
gene_mutation_ratio = 0.1
property_mutation_ratio = 0.4
combine_ratio = 0.5

[genes]
max_r = 40.0
init_r = 15.0
mut_p = 30.0
mut_r = 3.0
mut_c = 40.0
"#;

	#[test]
	fn circle_is_the_default_kind() {
		let config = RunConfig::from_toml(CIRCLES).unwrap();
		assert_eq!(config.kind(), Kind::Circle);
		assert_eq!(config.policy, PolicySpecs::Tournament);
		assert_eq!(config.evo.gene_switch_ratio, 0.2);
		assert_eq!(config.evo.dna_len, 50);
	}

	#[test]
	fn lists_every_missing_key() {
		let text = CIRCLES.replace("mut_r = 3.0\n", "").replace("max_r = 40.0\n", "");
		let err = RunConfig::from_toml(&text).unwrap_err();
		assert_eq!(
			err,
			ConfigError::MissingKeys {
				section: "circle genes".to_string(),
				keys: vec!["max_r".to_string(), "mut_r".to_string()],
			}
		);
		assert!(err.to_string().contains("max_r, mut_r"));
	}

	#[test]
	fn missing_evolution_keys() {
		let text = CIRCLES.replace("dna_len = 50\n", "").replace("combine_ratio = 0.5\n", "");
		match RunConfig::from_toml(&text) {
			Err(ConfigError::MissingKeys { section, keys }) => {
				assert_eq!(section, "evolution");
				assert_eq!(keys, vec!["combine_ratio", "dna_len"]);
			}
			other => panic!("unexpected {other:?}"),
		}
	}

	#[test]
	fn halving_policy_with_defaults() {
		let text = CIRCLES.replace(
			"\n[genes]",
			"\n[evolution.policy]\nname = \"halving\"\nwiggle_steps = 3\nanneal_generations = 100\n\n[genes]",
		);
		let config = RunConfig::from_toml(&text).unwrap();
		let PolicySpecs::Halving(h) = config.policy else {
			panic!("expected halving");
		};
		assert_eq!(h.wiggle_steps, 3);
		assert_eq!(h.halving_every, 5);
		assert_eq!(h.reseed_mutations, 5);
		assert_eq!(h.intensity(0), 0.4);
		assert!((h.intensity(50) - 0.25).abs() < 1e-12);
		assert!((h.intensity(5000) - 0.1).abs() < 1e-12);
	}

	#[test]
	fn halving_requires_its_keys() {
		let text = CIRCLES.replace("\n[genes]", "\n[evolution.policy]\nname = \"halving\"\n\n[genes]");
		assert!(matches!(
			RunConfig::from_toml(&text),
			Err(ConfigError::MissingKeys { keys, .. }) if keys == ["wiggle_steps", "anneal_generations"]
		));
	}

	#[test]
	fn unknown_names() {
		let text = CIRCLES.replace("[evolution]\n", "[evolution]\nkind = \"hexagon\"\n");
		assert_eq!(
			RunConfig::from_toml(&text),
			Err(ConfigError::UnknownKind("hexagon".to_string()))
		);
		let text = CIRCLES.replace("\n[genes]", "\n[evolution.policy]\nname = \"roulette\"\n\n[genes]");
		assert_eq!(
			RunConfig::from_toml(&text),
			Err(ConfigError::UnknownPolicy("roulette".to_string()))
		);
	}

	#[test]
	fn rejects_tiny_population() {
		let text = CIRCLES.replace("pop_size = 10", "pop_size = 1");
		assert!(matches!(
			RunConfig::from_toml(&text),
			Err(ConfigError::Invalid { key, .. }) if key == "pop_size"
		));
	}

	#[test]
	fn mesh_needs_no_dna_len() {
		let text = r#"
[evolution]
kind = "mesh"
pop_size = 4
gene_mutation_ratio = 0.1
property_mutation_ratio = 0.4
combine_ratio = 0.5

[genes]
rows = 4
points_per_row = 6
"#;
		let config = RunConfig::from_toml(text).unwrap();
		let GeneSpecs::Mesh(mesh) = &config.genes else {
			panic!("expected mesh");
		};
		assert_eq!((mesh.rows, mesh.points_per_row), (4, 6));
		assert!(mesh.safe_only);
	}

	#[test]
	fn policy_specs_tagging() {
		let json = serde_json::to_string(&PolicySpecs::Tournament).unwrap();
		assert_eq!(json, r#"{"name":"tournament"}"#);
		let halving = PolicySpecs::Halving(HalvingSpecs::builder().wiggle_steps(1).anneal_generations(10).build());
		let json = serde_json::to_string(&halving).unwrap();
		assert_eq!(serde_json::from_str::<PolicySpecs>(&json).unwrap(), halving);
	}
}
