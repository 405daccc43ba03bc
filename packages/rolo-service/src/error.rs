pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("At least two distinct contacts are required; found {found}.")]
	InsufficientCandidates { found: usize },
	#[error("At least two raw records are required; found {found}.")]
	InsufficientRawRecords { found: usize },
	#[error("Permission denied: {message}")]
	PermissionDenied { message: String },
	#[error("Not found: {message}")]
	NotFound { message: String },
	#[error("Batch rejected: {message}")]
	BatchRejected { message: String },
	#[error("Cancelled before {stage}.")]
	Cancelled { stage: &'static str },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Maps a failed `submit_batch` call. Whatever the store reports, nothing was applied.
	pub(crate) fn rejected(err: rolo_storage::Error) -> Self {
		match err {
			rolo_storage::Error::Rejected(message) => Self::BatchRejected { message },
			other => Self::BatchRejected { message: other.to_string() },
		}
	}

	pub fn code(&self) -> &'static str {
		match self {
			Self::InvalidRequest { .. } => "INVALID_REQUEST",
			Self::InsufficientCandidates { .. } => "INSUFFICIENT_CANDIDATES",
			Self::InsufficientRawRecords { .. } => "INSUFFICIENT_RAW_RECORDS",
			Self::PermissionDenied { .. } => "PERMISSION_DENIED",
			Self::NotFound { .. } => "NOT_FOUND",
			Self::BatchRejected { .. } => "BATCH_REJECTED",
			Self::Cancelled { .. } => "CANCELLED",
			Self::Storage { .. } => "STORAGE",
		}
	}
}

impl From<rolo_storage::Error> for Error {
	fn from(err: rolo_storage::Error) -> Self {
		match err {
			rolo_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			rolo_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			rolo_storage::Error::NotFound(message) => Self::NotFound { message },
			rolo_storage::Error::Rejected(message) => Self::BatchRejected { message },
			rolo_storage::Error::SerdeJson(inner) => Self::Storage { message: inner.to_string() },
		}
	}
}
