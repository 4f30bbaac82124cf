//! Translates `add_row`/`savepoint`/`commit`/`rollback` calls into
//! correctly-framed row writes, holding back the last row of a
//! transaction until its terminating control byte is known.

use std::sync::atomic::{AtomicBool, Ordering};

use uuid::Uuid;

use crate::control::EndControl;
use crate::error::FrozenDbError;
use crate::file_manager::FileManager;
use crate::finder::Finder;
use crate::header::{Header, HEADER_LEN};
use crate::row::{ChecksumRow, DataRow, NullRow, Row};

/// What a `rollback()` call targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackTarget {
	/// A specific rollback-point slot (`0..=9`).
	Point(u8),
	/// The whole transaction.
	All,
}

/// A handle to an in-progress transaction. Consumed by `commit` or
/// `rollback`; dropping it without calling either silently abandons
/// whatever rows were buffered but never written.
pub struct Transaction<'a> {
	file_manager: &'a FileManager,
	finder: &'a dyn Finder,
	header: &'a Header,
	next_index: u64,
	pending: Option<DataRow>,
	rows_added: u64,
	savepoint: Option<u8>,
	hasher: crc32fast::Hasher,
	outstanding: &'a AtomicBool,
}

impl<'a> Transaction<'a> {
	/// Begins a transaction, marking `outstanding` so a second
	/// concurrent `begin_tx` on the same handle is rejected. Cleared
	/// again by `Drop`, whether the transaction commits, rolls back, or
	/// is simply dropped.
	pub(crate) fn begin(
		file_manager: &'a FileManager,
		finder: &'a dyn Finder,
		header: &'a Header,
		outstanding: &'a AtomicBool,
	) -> Result<Transaction<'a>, FrozenDbError> {
		if outstanding.swap(true, Ordering::SeqCst) {
			return Err(FrozenDbError::invalid_action(
				"a transaction handle is already outstanding",
			));
		}
		let row_count = (file_manager.size() - HEADER_LEN as u64) / header.row_size as u64;
		Ok(Transaction {
			file_manager,
			finder,
			header,
			next_index: row_count,
			pending: None,
			rows_added: 0,
			savepoint: None,
			hasher: crc32fast::Hasher::new(),
			outstanding,
		})
	}

	/// Add a data row keyed by `uuid` (must be a non-nil UUID v7).
	pub fn add_row(&mut self, uuid: Uuid, value: Vec<u8>) -> Result<(), FrozenDbError> {
		if uuid.is_nil() || uuid.get_version() != Some(uuid::Version::SortRand) {
			return Err(FrozenDbError::invalid_input(
				"row key must be a non-nil UUID v7",
			));
		}
		self.flush_pending(EndControl::Continuation)?;
		let first = self.rows_added == 0;
		self.pending = Some(DataRow {
			first,
			end: EndControl::Continuation,
			uuid,
			value,
		});
		self.rows_added += 1;
		Ok(())
	}

	/// Mark a rollback point at slot `n` (`0..=9`). A later `rollback`
	/// targets this slot instead of the whole transaction. A second call
	/// simply overwrites the first; there is only ever one active slot.
	pub fn savepoint(&mut self, n: u8) -> Result<(), FrozenDbError> {
		if n > 9 {
			return Err(FrozenDbError::invalid_input(
				"savepoint slot must be in 0..=9",
			));
		}
		self.savepoint = Some(n);
		Ok(())
	}

	/// Commit the transaction. Zero added rows produces a single null
	/// row instead of a data-row commit.
	pub fn commit(mut self) -> Result<(), FrozenDbError> {
		if self.rows_added == 0 {
			let timestamp_ms = self.mint_null_timestamp();
			self.write_and_index(&Row::Null(NullRow { timestamp_ms }))?;
		} else {
			let end = if self.savepoint.is_some() {
				EndControl::CommitAfterSavepoint
			} else {
				EndControl::Commit
			};
			self.flush_pending(end)?;
		}
		self.write_checksum_row()
	}

	/// Roll back to `target`. If nothing was ever added, this is a no-op:
	/// no bytes were buffered, so there's nothing to unwind on disk.
	pub fn rollback(mut self, target: RollbackTarget) -> Result<(), FrozenDbError> {
		if self.rows_added == 0 {
			return Ok(());
		}
		let n = match (self.savepoint, target) {
			(Some(slot), _) => slot,
			(None, RollbackTarget::All) => 0,
			(None, RollbackTarget::Point(n)) => n,
		};
		let end = if self.savepoint.is_some() {
			EndControl::SavepointRollback(n)
		} else {
			EndControl::Rollback(n)
		};
		self.flush_pending(end)?;
		self.write_checksum_row()
	}

	fn flush_pending(&mut self, end: EndControl) -> Result<(), FrozenDbError> {
		if let Some(mut row) = self.pending.take() {
			row.end = end;
			self.write_and_index(&Row::Data(row))?;
		}
		Ok(())
	}

	fn write_checksum_row(&mut self) -> Result<(), FrozenDbError> {
		let crc = std::mem::replace(&mut self.hasher, crc32fast::Hasher::new()).finalize();
		self.write_and_index(&Row::Checksum(ChecksumRow { crc }))
	}

	fn write_and_index(&mut self, row: &Row) -> Result<(), FrozenDbError> {
		let bytes = row.marshal(self.header)?;
		self.hasher.update(&bytes);
		self.file_manager.append(bytes)?;
		self.finder.on_row_added(self.next_index, row)?;
		self.next_index += 1;
		Ok(())
	}

	fn mint_null_timestamp(&self) -> u64 {
		let now = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.map(|d| d.as_millis() as u64)
			.unwrap_or(0);
		now.max(self.finder.max_timestamp())
	}
}

impl<'a> Drop for Transaction<'a> {
	fn drop(&mut self) {
		self.outstanding.store(false, Ordering::SeqCst);
	}
}
