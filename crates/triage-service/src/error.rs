pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
	#[error("Strategy {strategy} failed: {message}")]
	StrategyFailed { strategy: &'static str, message: String },
}
impl From<sqlx::Error> for Error {
	fn from(err: sqlx::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}

impl From<triage_storage::Error> for Error {
	fn from(err: triage_storage::Error) -> Self {
		match err {
			triage_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			triage_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			triage_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<triage_providers::Error> for Error {
	fn from(err: triage_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}
