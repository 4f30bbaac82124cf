//! Named failure kinds surfaced across the public API.

/// A reason a FrozenDB operation could not be completed.
///
/// Every variant corresponds to one of the error kinds named in the
/// on-disk format's error taxonomy. The library never retries I/O: a
/// `Write` or `CorruptDatabase` error permanently tombstones the file
/// manager that produced it.
#[derive(Debug, thiserror::Error)]
pub enum FrozenDbError {
	/// The caller violated a documented precondition.
	#[error("invalid input: {0}")]
	InvalidInput(String),

	/// A filesystem-level failure occurred while opening or creating a file.
	#[error("path error: {0}")]
	Path(#[source] std::io::Error),

	/// On-disk bytes violate an invariant of the row or header format.
	#[error("corrupt database: {0}")]
	CorruptDatabase(String),

	/// An OS write, sync, lock, or attribute operation failed.
	#[error("write error: {0}")]
	Write(#[source] std::io::Error),

	/// An OS read failed, or a lookup callback returned a non-key-not-found error.
	#[error("read error: {0}")]
	Read(#[source] std::io::Error),

	/// A lookup found no matching entry.
	#[error("key not found")]
	KeyNotFound,

	/// The file manager previously experienced a fatal write error or was closed.
	#[error("file manager is tombstoned")]
	Tombstoned,

	/// A transaction-boundary query reached the tail without finding a terminal end-control.
	#[error("transaction is still active (no terminal row found)")]
	TransactionActive,

	/// A state-machine invariant was violated (e.g. installing a second writer).
	#[error("invalid action: {0}")]
	InvalidAction(String),
}

impl PartialEq for FrozenDbError {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(FrozenDbError::InvalidInput(a), FrozenDbError::InvalidInput(b)) => a == b,
			(FrozenDbError::Path(a), FrozenDbError::Path(b)) => a.kind() == b.kind(),
			(FrozenDbError::CorruptDatabase(a), FrozenDbError::CorruptDatabase(b)) => a == b,
			(FrozenDbError::Write(a), FrozenDbError::Write(b)) => a.kind() == b.kind(),
			(FrozenDbError::Read(a), FrozenDbError::Read(b)) => a.kind() == b.kind(),
			(FrozenDbError::KeyNotFound, FrozenDbError::KeyNotFound) => true,
			(FrozenDbError::Tombstoned, FrozenDbError::Tombstoned) => true,
			(FrozenDbError::TransactionActive, FrozenDbError::TransactionActive) => true,
			(FrozenDbError::InvalidAction(a), FrozenDbError::InvalidAction(b)) => a == b,
			_ => false,
		}
	}
}

impl FrozenDbError {
	pub(crate) fn invalid_input(msg: impl Into<String>) -> Self {
		FrozenDbError::InvalidInput(msg.into())
	}

	pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
		FrozenDbError::CorruptDatabase(msg.into())
	}

	pub(crate) fn invalid_action(msg: impl Into<String>) -> Self {
		FrozenDbError::InvalidAction(msg.into())
	}

	/// True if this is the recoverable "lookup missed" case.
	pub fn is_key_not_found(&self) -> bool {
		matches!(self, FrozenDbError::KeyNotFound)
	}
}

pub type Result<T> = std::result::Result<T, FrozenDbError>;
