#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error(transparent)]
	Sqlx(#[from] sqlx::Error),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Not found: {0}")]
	NotFound(String),
	/// The store refused a batch as a whole. Nothing from it was applied.
	#[error("Batch rejected: {0}")]
	Rejected(String),
	#[error(transparent)]
	SerdeJson(#[from] serde_json::Error),
}
