//! FrozenDB: an append-only, single-file database for time-ordered,
//! immutable event records keyed by UUID v7 and timestamp.
//!
//! A `.fdb` file is a fixed 64-byte header followed by fixed-size text
//! rows. Records are grouped into transactions that become visible to
//! readers only once their terminating control pair is flushed.
//! See [`create`] and [`open`] to get a handle, [`FrozenDb::begin_tx`]
//! to write, and [`FrozenDb::get_index`] / [`FrozenDb::fuzzy_find`] to
//! read.

pub mod checksum;
pub mod control;
pub mod create;
pub mod error;
pub mod file_manager;
pub mod finder;
pub mod fuzzy_search;
pub mod header;
pub mod open;
pub mod provisioner;
pub mod row;
pub mod transaction;

use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use uuid::Uuid;

pub use error::{FrozenDbError, Result};
pub use header::Header;
pub use transaction::{RollbackTarget, Transaction};

use file_manager::FileManager;
use finder::{Finder, InMemoryFinder, ScanningFinder};
use provisioner::DefaultProvisioner;

/// Which finder backs a [`FrozenDb`] handle.
///
/// `Simple` re-scans rows through the file manager on every query and
/// costs nothing at open time; `InMemory` builds a UUID→index map (and
/// transaction-boundary maps) while replaying the file, trading a
/// slower open for O(1) lookups afterward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinderStrategy {
	Simple,
	InMemory,
}

/// Whether a handle may append rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
	Read,
	Write,
}

/// Create a new `.fdb` file at `path` with the given row size and skew
/// window, transferring ownership to the invoking user (if run under
/// `sudo`) and marking the file append-only.
pub fn create(path: &Path, row_size: usize, skew_ms: u64) -> Result<()> {
	create::create_fdb(path, row_size, skew_ms, &DefaultProvisioner)
}

/// Open an existing `.fdb` file, recovering a truncated or dangling
/// tail and replaying every surviving row into the chosen finder.
pub fn open(path: &Path, mode: Mode, finder_strategy: FinderStrategy) -> Result<FrozenDb> {
	let writable = mode == Mode::Write;

	let finder: Box<dyn Finder> = match finder_strategy {
		FinderStrategy::InMemory => Box::new(InMemoryFinder::new()),
		// The scanning finder needs the file manager `open_fdb` itself
		// produces, so replay happens once below with a placeholder and
		// a second time into the real scanning finder.
		FinderStrategy::Simple => Box::new(PlaceholderFinder),
	};

	let opened = open::open_fdb(path, writable, finder.as_ref())?;

	let finder: Box<dyn Finder> = match finder_strategy {
		FinderStrategy::InMemory => finder,
		FinderStrategy::Simple => {
			let scanning = Box::new(ScanningFinder::new(opened.file_manager.clone(), opened.header));
			open::open_fdb(path, false, scanning.as_ref())?;
			scanning
		}
	};

	if writable {
		opened.file_manager.set_writer()?;
	}

	Ok(FrozenDb {
		header: opened.header,
		file_manager: opened.file_manager,
		finder,
		writable,
		tx_outstanding: AtomicBool::new(false),
	})
}

/// A no-op `Finder` used only to satisfy `open_fdb`'s signature while
/// building a handle whose real finder is a `ScanningFinder` that
/// doesn't exist until the file manager it wraps does.
struct PlaceholderFinder;

impl Finder for PlaceholderFinder {
	fn get_index(&self, _uuid: &Uuid) -> Result<u64> {
		Err(FrozenDbError::KeyNotFound)
	}
	fn get_transaction_start(&self, _index: u64) -> Result<u64> {
		Err(FrozenDbError::TransactionActive)
	}
	fn get_transaction_end(&self, _index: u64) -> Result<u64> {
		Err(FrozenDbError::TransactionActive)
	}
	fn on_row_added(&self, _index: u64, _row: &row::Row) -> Result<()> {
		Ok(())
	}
	fn max_timestamp(&self) -> u64 {
		0
	}
}

/// A handle to an open `.fdb` file: the header, the file manager, and
/// the finder chosen at open time.
pub struct FrozenDb {
	header: Header,
	file_manager: Arc<FileManager>,
	finder: Box<dyn Finder>,
	writable: bool,
	tx_outstanding: AtomicBool,
}

impl FrozenDb {
	pub fn header(&self) -> Header {
		self.header
	}

	pub fn size(&self) -> u64 {
		self.file_manager.size()
	}

	/// Begin a transaction. Fails with `InvalidAction` if this handle
	/// is not writable, or if a transaction handle from this instance
	/// is already outstanding.
	pub fn begin_tx(&self) -> Result<Transaction<'_>> {
		if !self.writable {
			return Err(FrozenDbError::invalid_action(
				"begin_tx requires a handle opened in write mode",
			));
		}
		Transaction::begin(
			&self.file_manager,
			self.finder.as_ref(),
			&self.header,
			&self.tx_outstanding,
		)
	}

	/// Look up the row index of `uuid`.
	pub fn get_index(&self, uuid: &Uuid) -> Result<u64> {
		self.finder.get_index(uuid)
	}

	/// The first row index of the transaction containing `index`.
	pub fn get_transaction_start(&self, index: u64) -> Result<u64> {
		self.finder.get_transaction_start(index)
	}

	/// The terminating row index of the transaction containing `index`.
	pub fn get_transaction_end(&self, index: u64) -> Result<u64> {
		self.finder.get_transaction_end(index)
	}

	/// The greatest timestamp observed across every data and null row
	/// appended so far.
	pub fn max_timestamp(&self) -> u64 {
		self.finder.max_timestamp()
	}

	/// Find a row index whose embedded timestamp equals `target`,
	/// tolerating reordering within this file's configured skew window.
	pub fn fuzzy_find(&self, target: u64) -> Result<u64> {
		let candidates = self.candidate_row_indices()?;
		let num_keys = candidates.len() as u64;
		let logical = fuzzy_search::fuzzy_binary_search(target, self.header.skew_ms, num_keys, |i| {
			self.row_timestamp(candidates[i as usize])
		})?;
		Ok(candidates[logical as usize])
	}

	/// The indices of every data or null row, in ascending order, skipping
	/// the checksum rows interleaved between transactions.
	fn candidate_row_indices(&self) -> Result<Vec<u64>> {
		let row_count =
			(self.file_manager.size() - header::HEADER_LEN as u64) / self.header.row_size as u64;
		let mut candidates = Vec::new();
		for i in 0..row_count {
			let offset = header::HEADER_LEN as u64 + i * self.header.row_size as u64;
			let bytes = self.file_manager.read(offset, self.header.row_size)?;
			if row::Row::unmarshal(&self.header, &bytes)?.is_data_or_null() {
				candidates.push(i);
			}
		}
		Ok(candidates)
	}

	fn row_timestamp(&self, index: u64) -> Result<u64> {
		let offset = header::HEADER_LEN as u64 + index * self.header.row_size as u64;
		let bytes = self.file_manager.read(offset, self.header.row_size)?;
		match row::Row::unmarshal(&self.header, &bytes)? {
			row::Row::Data(data) => Ok(row::uuid_timestamp_ms(&data.uuid)),
			row::Row::Null(null) => Ok(null.timestamp_ms),
			_ => Err(FrozenDbError::corrupt(
				"fuzzy search landed on a non-data, non-null row",
			)),
		}
	}

	/// Close the underlying file manager, draining the writer task and
	/// refusing any further appends.
	pub fn close(&self) {
		self.file_manager.close();
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn create_then_reopen() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("x.fdb");
		create(&path, 1024, 5000).unwrap();
		assert_eq!(std::fs::metadata(&path).unwrap().len(), 64 + 1024);

		let db = open(&path, Mode::Read, FinderStrategy::InMemory).unwrap();
		assert_eq!(db.header().row_size, 1024);
		assert_eq!(db.size(), 64 + 1024);
	}

	#[test]
	fn write_then_read_back_with_in_memory_finder() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("x.fdb");
		create(&path, 256, 5000).unwrap();

		let db = open(&path, Mode::Write, FinderStrategy::InMemory).unwrap();
		let u1 = Uuid::now_v7();
		let mut tx = db.begin_tx().unwrap();
		tx.add_row(u1, b"hello".to_vec()).unwrap();
		tx.commit().unwrap();

		assert_eq!(db.get_index(&u1).unwrap(), 1);
		assert_eq!(db.get_transaction_start(1).unwrap(), 1);
		assert_eq!(db.get_transaction_end(1).unwrap(), 1);
	}

	#[test]
	fn write_then_read_back_with_scanning_finder() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("x.fdb");
		create(&path, 256, 5000).unwrap();

		{
			let db = open(&path, Mode::Write, FinderStrategy::Simple).unwrap();
			let mut tx = db.begin_tx().unwrap();
			tx.add_row(Uuid::now_v7(), b"v".to_vec()).unwrap();
			tx.commit().unwrap();
		}

		let db = open(&path, Mode::Read, FinderStrategy::Simple).unwrap();
		assert_eq!(db.size(), 64 + 256 * 3);
	}

	#[test]
	fn second_transaction_handle_is_rejected_while_first_is_outstanding() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("x.fdb");
		create(&path, 256, 5000).unwrap();
		let db = open(&path, Mode::Write, FinderStrategy::InMemory).unwrap();

		let _tx = db.begin_tx().unwrap();
		assert!(db.begin_tx().is_err());
	}

	#[test]
	fn read_only_handle_cannot_begin_a_transaction() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("x.fdb");
		create(&path, 256, 5000).unwrap();
		let db = open(&path, Mode::Read, FinderStrategy::InMemory).unwrap();
		assert!(db.begin_tx().is_err());
	}

	#[test]
	fn fuzzy_find_locates_reordered_timestamp() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("x.fdb");
		create(&path, 256, 50).unwrap();
		let db = open(&path, Mode::Write, FinderStrategy::InMemory).unwrap();

		// Five UUIDs with deliberately out-of-order embedded timestamps
		// around a target, all inside the skew window.
		let base = 1_700_000_000_000u64;
		for off in [2i64, -2, 0, 1, -1] {
			let ts = (base as i64 + off) as u64;
			let mut tx = db.begin_tx().unwrap();
			tx.add_row(uuid_with_timestamp(ts), b"v".to_vec()).unwrap();
			tx.commit().unwrap();
		}

		let found = db.fuzzy_find(base).unwrap();
		assert_eq!(db.row_timestamp(found).unwrap(), base);
	}

	fn uuid_with_timestamp(ts_ms: u64) -> Uuid {
		let context = uuid::ContextV7::new();
		let seconds = ts_ms / 1000;
		let nanos = ((ts_ms % 1000) * 1_000_000) as u32;
		let ts = uuid::Timestamp::from_unix(&context, seconds, nanos);
		Uuid::new_v7(ts)
	}
}
