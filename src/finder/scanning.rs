//! Constant-memory `Finder`: keeps only the header and the last-known
//! confirmed row count, re-reading rows from the file manager on every
//! query.

use std::sync::Arc;

use antidote::Mutex;
use uuid::Uuid;

use crate::error::FrozenDbError;
use crate::file_manager::FileManager;
use crate::header::Header;
use crate::row::{uuid_timestamp_ms, Row};

use super::{reject_nil_uuid, reject_reserved_index};

struct ScanState {
	row_count: u64,
	max_timestamp: u64,
}

/// A `Finder` that answers every query by re-scanning rows through the
/// file manager. O(row_size) memory, O(n) per query.
pub struct ScanningFinder {
	file_manager: Arc<FileManager>,
	header: Header,
	state: Mutex<ScanState>,
}

impl ScanningFinder {
	pub fn new(file_manager: Arc<FileManager>, header: Header) -> ScanningFinder {
		ScanningFinder {
			file_manager,
			header,
			state: Mutex::new(ScanState {
				row_count: 0,
				max_timestamp: 0,
			}),
		}
	}

	fn read_row(&self, index: u64) -> Result<Row, FrozenDbError> {
		let offset = crate::header::HEADER_LEN as u64 + index * self.header.row_size as u64;
		let bytes = self.file_manager.read(offset, self.header.row_size)?;
		Row::unmarshal(&self.header, &bytes)
	}

	fn row_count(&self) -> u64 {
		self.state.lock().row_count
	}
}

impl super::Finder for ScanningFinder {
	fn get_index(&self, uuid: &Uuid) -> Result<u64, FrozenDbError> {
		reject_nil_uuid(uuid)?;
		let row_count = self.row_count();
		for i in 1..row_count {
			if let Row::Data(data) = self.read_row(i)? {
				if &data.uuid == uuid {
					return Ok(i);
				}
			}
		}
		Err(FrozenDbError::KeyNotFound)
	}

	fn get_transaction_start(&self, index: u64) -> Result<u64, FrozenDbError> {
		reject_reserved_index(index)?;
		let row_count = self.row_count();
		if index >= row_count {
			return Err(FrozenDbError::invalid_input(
				"index exceeds the greatest known row index",
			));
		}
		if !self.read_row(index)?.is_data_or_null() {
			return Err(FrozenDbError::invalid_input(
				"index is not a data or null row",
			));
		}
		let mut j = index;
		loop {
			if self.read_row(j)?.starts_transaction() {
				return Ok(j);
			}
			if j == 1 {
				return Err(FrozenDbError::corrupt(
					"walked back to index 1 without finding a transaction start",
				));
			}
			j -= 1;
		}
	}

	fn get_transaction_end(&self, index: u64) -> Result<u64, FrozenDbError> {
		reject_reserved_index(index)?;
		let row_count = self.row_count();
		if index >= row_count {
			return Err(FrozenDbError::invalid_input(
				"index exceeds the greatest known row index",
			));
		}
		if !self.read_row(index)?.is_data_or_null() {
			return Err(FrozenDbError::invalid_input(
				"index is not a data or null row",
			));
		}
		let mut j = index;
		while j < row_count {
			let row = self.read_row(j)?;
			if row.end_control().map(|e| e.is_terminal()).unwrap_or(false) {
				return Ok(j);
			}
			j += 1;
		}
		Err(FrozenDbError::TransactionActive)
	}

	fn on_row_added(&self, index: u64, row: &Row) -> Result<(), FrozenDbError> {
		let mut state = self.state.lock();
		state.row_count = state.row_count.max(index + 1);
		match row {
			Row::Data(data) => {
				state.max_timestamp = state.max_timestamp.max(uuid_timestamp_ms(&data.uuid));
			}
			Row::Null(null) => {
				state.max_timestamp = state.max_timestamp.max(null.timestamp_ms);
			}
			Row::Checksum(_) | Row::Partial(_) => {}
		}
		Ok(())
	}

	fn max_timestamp(&self) -> u64 {
		self.state.lock().max_timestamp
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::finder::Finder;
	use crate::row::{ChecksumRow, DataRow};
	use crate::control::EndControl;

	fn setup() -> (tempfile::TempDir, ScanningFinder, Header) {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("x.fdb");
		let header = Header::new(128, 5000).unwrap();
		crate::create::create_fdb(&path, 128, 5000, &crate::provisioner::NoopProvisioner).unwrap();
		let fm = Arc::new(FileManager::open(&path, true).unwrap());
		fm.set_writer().unwrap();
		let finder = ScanningFinder::new(fm.clone(), header);
		// account for the initial checksum row already on disk
		let crc_row = Row::Checksum(ChecksumRow { crc: 0 });
		finder.on_row_added(0, &crc_row).unwrap();
		(dir, finder, header)
	}

	fn append_row(fm: &FileManager, header: &Header, row: &Row) {
		fm.append(row.marshal(header).unwrap()).unwrap();
	}

	#[test]
	fn finds_committed_uuid() {
		let (_dir, finder, header) = setup();
		let fm = finder.file_manager.clone();
		let uuid = Uuid::now_v7();
		let row = Row::Data(DataRow {
			first: true,
			end: EndControl::Commit,
			uuid,
			value: b"x".to_vec(),
		});
		append_row(&fm, &header, &row);
		finder.on_row_added(1, &row).unwrap();

		assert_eq!(finder.get_index(&uuid).unwrap(), 1);
		assert_eq!(finder.get_transaction_start(1).unwrap(), 1);
		assert_eq!(finder.get_transaction_end(1).unwrap(), 1);
	}

	#[test]
	fn missing_uuid_is_key_not_found() {
		let (_dir, finder, _header) = setup();
		assert!(finder.get_index(&Uuid::now_v7()).is_err());
	}

	#[test]
	fn rejects_reserved_index_zero() {
		let (_dir, finder, _header) = setup();
		assert!(finder.get_transaction_start(0).is_err());
		assert!(finder.get_transaction_end(0).is_err());
	}
}
