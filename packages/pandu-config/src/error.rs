pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Failed to read config file {}: {source}", .path.display())]
	Read { path: std::path::PathBuf, source: std::io::Error },
	#[error("Config file {} is not valid TOML: {source}", .path.display())]
	Parse { path: std::path::PathBuf, source: toml::de::Error },
	/// A parsed value failed cross-field validation. `field` is the TOML key
	/// path so the operator knows what to edit.
	#[error("Invalid config value for `{field}`: expected {expected}.")]
	Invalid { field: &'static str, expected: &'static str },
}
