mod error;
mod types;

pub use error::{Error, Result};
pub use types::{Access, Aggregation, Config, Postgres, Service, Storage};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;
	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.service.log_level.is_empty() {
		return Err(Error::invalid("service.log_level", "must be non-empty."));
	}
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::invalid("storage.postgres.dsn", "must be non-empty."));
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::invalid("storage.postgres.pool_max_conns", "must be greater than zero."));
	}
	if cfg.aggregation.max_link_raw_records < 2 {
		return Err(Error::invalid(
			"aggregation.max_link_raw_records",
			"must be at least 2; a link needs two raw records.",
		));
	}
	if cfg.aggregation.restore_default_name && !cfg.access.read {
		return Err(Error::invalid(
			"aggregation.restore_default_name",
			"requires access.read; the winning name is read before it is restored.",
		));
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	let trimmed = cfg.service.log_level.trim();

	if trimmed.len() != cfg.service.log_level.len() {
		cfg.service.log_level = trimmed.to_string();
	}
}
