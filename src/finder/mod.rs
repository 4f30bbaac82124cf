//! Shared contract between the two `Finder` strategies: UUID lookup,
//! transaction-boundary resolution, and incremental max-timestamp
//! tracking.

pub mod in_memory;
pub mod scanning;

use uuid::Uuid;

use crate::error::FrozenDbError;
use crate::row::Row;

pub use in_memory::InMemoryFinder;
pub use scanning::ScanningFinder;

/// Index 0 is always the file's initial checksum row; no data/null row
/// is ever stored there.
pub const RESERVED_INDEX: u64 = 0;

/// Looks up data by UUID and resolves transaction boundaries over a
/// `.fdb` file's row sequence.
///
/// `get_*` methods may be called concurrently with each other.
/// `on_row_added` is called strictly sequentially, under the write
/// path's own serialization, and never concurrently with itself.
pub trait Finder: Send + Sync {
	/// Index of the earliest data row carrying this UUID.
	fn get_index(&self, uuid: &Uuid) -> Result<u64, FrozenDbError>;

	/// The `T`/`N` row index of the transaction containing `index`.
	fn get_transaction_start(&self, index: u64) -> Result<u64, FrozenDbError>;

	/// The terminating row index of the transaction containing `index`.
	fn get_transaction_end(&self, index: u64) -> Result<u64, FrozenDbError>;

	/// Record a freshly, successfully appended row at `index`.
	fn on_row_added(&self, index: u64, row: &Row) -> Result<(), FrozenDbError>;

	/// The largest timestamp seen across all data/null rows so far; 0
	/// if none have been added yet.
	fn max_timestamp(&self) -> u64;
}

pub(crate) fn reject_nil_uuid(uuid: &Uuid) -> Result<(), FrozenDbError> {
	if uuid.is_nil() {
		Err(FrozenDbError::invalid_input("uuid must not be nil"))
	} else {
		Ok(())
	}
}

pub(crate) fn reject_reserved_index(index: u64) -> Result<(), FrozenDbError> {
	if index == RESERVED_INDEX {
		Err(FrozenDbError::invalid_input(
			"index 0 is the initial checksum row and has no transaction",
		))
	} else {
		Ok(())
	}
}
