use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Deserializer;

use crate::BoxError;
use crate::MacroLookup;
use crate::TerseError;
use crate::TerseResult;

/// Supported config file locations in discovery order (highest precedence
/// first).
pub const CONFIG_FILE_CANDIDATES: [&str; 3] = ["terse.toml", ".terse.toml", ".config/terse.toml"];

/// Settings read from `terse.toml`.
///
/// ```toml
/// ignore_case = true
///
/// [macros]
/// name = "terse"
///
/// [macros.server]
/// port = 8080
/// ```
///
/// Nested tables are flattened into dotted keys, so the file above provides
/// `${{name}}` and `${{server.port}}`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct TerseConfig {
	/// Compile documents with case-insensitive names unless a directive says
	/// otherwise.
	#[serde(default)]
	pub ignore_case: bool,
	#[serde(default, deserialize_with = "flatten_macros")]
	pub macros: BTreeMap<String, String>,
}

impl TerseConfig {
	/// Resolve the config path from known discovery candidates.
	#[must_use]
	pub fn resolve_path(root: &Path) -> Option<PathBuf> {
		CONFIG_FILE_CANDIDATES
			.iter()
			.map(|candidate| root.join(candidate))
			.find(|path| path.is_file())
	}

	/// Load the config from the first discovered config file at `root`.
	/// Returns `None` if no config file exists.
	pub fn load(root: &Path) -> TerseResult<Option<TerseConfig>> {
		let Some(config_path) = Self::resolve_path(root) else {
			return Ok(None);
		};

		let content = std::fs::read_to_string(&config_path)?;
		let config = Self::parse(&content)?;

		tracing::debug!(path = %config_path.display(), macros = config.macros.len(), "loaded config");
		Ok(Some(config))
	}

	pub fn parse(content: &str) -> TerseResult<TerseConfig> {
		toml::from_str(content).map_err(|e| TerseError::ConfigParse(e.to_string()))
	}
}

impl MacroLookup for TerseConfig {
	fn lookup(&self, key: &str) -> Result<Option<String>, BoxError> {
		Ok(self.macros.get(key).cloned())
	}
}

fn flatten_macros<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error> {
	let table = toml::Table::deserialize(deserializer)?;
	let mut macros = BTreeMap::new();
	flatten_into("", &table, &mut macros);
	Ok(macros)
}

fn flatten_into(prefix: &str, table: &toml::Table, macros: &mut BTreeMap<String, String>) {
	for (key, value) in table {
		let key = if prefix.is_empty() {
			key.clone()
		} else {
			format!("{prefix}.{key}")
		};

		match value {
			toml::Value::Table(nested) => flatten_into(&key, nested, macros),
			toml::Value::String(text) => {
				macros.insert(key, text.clone());
			}
			other => {
				macros.insert(key, other.to_string());
			}
		}
	}
}
