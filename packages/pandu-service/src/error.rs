pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Service unavailable: {message} Retry after a short backoff.")]
	ServiceUnavailable { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl From<pandu_storage::Error> for ServiceError {
	fn from(err: pandu_storage::Error) -> Self {
		Self::Storage { message: err.to_string() }
	}
}
