pub mod contact;
pub mod defaults;
pub mod link;
pub mod plan;
pub mod priority;
pub mod unlink;

mod error;

pub use contact::ContactDetails;
pub use defaults::DefaultResponse;
pub use error::{Error, Result};
pub use link::{LinkRequest, LinkResponse};
pub use plan::LinkPlan;
pub use priority::{NameSource, Priority};
pub use unlink::{UnlinkContactResponse, UnlinkFailure, UnlinkManyResponse, UnlinkResponse};

use std::sync::Arc;

use rolo_config::{Access, Config};
use rolo_storage::RecordStore;

/// Polled between steps. Returning `true` stops the operation before its next step; work
/// that was already committed stays committed.
pub type CancelFn<'a> = dyn Fn() -> bool + Send + Sync + 'a;

pub trait AccessPolicy
where
	Self: Send + Sync,
{
	fn can_read(&self) -> bool;

	fn can_write(&self) -> bool;
}

/// Grants whatever the `[access]` section of the config grants.
pub struct ConfigAccess(pub Access);
impl AccessPolicy for ConfigAccess {
	fn can_read(&self) -> bool {
		self.0.read
	}

	fn can_write(&self) -> bool {
		self.0.write
	}
}

pub struct ContactsService {
	pub cfg: Config,
	pub store: Arc<dyn RecordStore>,
	pub access: Arc<dyn AccessPolicy>,
}
impl ContactsService {
	pub fn new(cfg: Config, store: Arc<dyn RecordStore>) -> Self {
		let access = Arc::new(ConfigAccess(cfg.access));

		Self { cfg, store, access }
	}

	pub fn with_access(
		cfg: Config,
		store: Arc<dyn RecordStore>,
		access: Arc<dyn AccessPolicy>,
	) -> Self {
		Self { cfg, store, access }
	}

	pub(crate) fn ensure_read(&self) -> Result<()> {
		if self.access.can_read() {
			Ok(())
		} else {
			Err(Error::PermissionDenied { message: "Read access is not granted.".to_string() })
		}
	}

	pub(crate) fn ensure_write(&self) -> Result<()> {
		if self.access.can_write() {
			Ok(())
		} else {
			Err(Error::PermissionDenied { message: "Write access is not granted.".to_string() })
		}
	}
}

pub fn never_cancel() -> &'static CancelFn<'static> {
	&not_cancelled
}

pub(crate) fn checkpoint(cancel: &CancelFn<'_>, stage: &'static str) -> Result<()> {
	if cancel() {
		tracing::info!(stage, "Operation cancelled.");

		return Err(Error::Cancelled { stage });
	}

	Ok(())
}

fn not_cancelled() -> bool {
	false
}
