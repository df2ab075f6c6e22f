use serde::Deserialize;

/// Tuning shared by the diff engine and the patch applier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
	/// Maximum nesting of trees, lists and components. Deeper templates fail instead of overflowing the stack.
	pub depth_limit: usize,

	/// Reconcile comprehensions by entry key when every entry has a unique key.
	/// Positional matching is used otherwise.
	pub keyed_comprehensions: bool,

	/// Reference another component's statics by id instead of resending identical ones.
	pub share_component_statics: bool,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			depth_limit: 64,
			keyed_comprehensions: true,
			share_component_statics: true,
		}
	}
}

impl Config {
	/// # Errors
	///
	/// Iff `json` isn't a JSON object with only known fields.
	pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
		serde_json::from_str(json)
	}
}
