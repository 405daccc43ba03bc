use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
	pub service: Service,
	pub storage: Storage,
	pub access: Access,
	#[serde(default)]
	pub aggregation: Aggregation,
}

#[derive(Debug, Deserialize)]
pub struct Service {
	/// `tracing_subscriber::EnvFilter` directive, e.g. "info" or "rolo_service=debug".
	pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

/// Capabilities granted to this process against the record store.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Access {
	pub read: bool,
	pub write: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Aggregation {
	/// Upper bound on the raw records a single link may aggregate. The link plan grows
	/// quadratically with this number.
	pub max_link_raw_records: u32,
	/// Mark the winning name as the contact default after a successful link.
	pub restore_default_name: bool,
	/// Pin an unlinked raw record apart from its former peers so the store's own matching
	/// cannot fold it back in.
	pub pin_unlinked_apart: bool,
}
impl Default for Aggregation {
	fn default() -> Self {
		Self { max_link_raw_records: 64, restore_default_name: true, pin_unlinked_apart: true }
	}
}
