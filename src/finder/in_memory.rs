//! O(1)-lookup `Finder`: a UUID→index map plus transaction-start/end
//! maps, populated incrementally from `on_row_added`.

use std::collections::HashMap;

use antidote::RwLock;
use uuid::Uuid;

use crate::error::FrozenDbError;
use crate::row::{uuid_timestamp_ms, Row};

use super::{reject_nil_uuid, reject_reserved_index};

#[derive(Default)]
struct State {
	expected_next: u64,
	by_uuid: HashMap<Uuid, u64>,
	tx_start: HashMap<u64, u64>,
	tx_end: HashMap<u64, u64>,
	open_tx_start: Option<u64>,
	open_tx_members: Vec<u64>,
	max_timestamp: u64,
}

/// A `Finder` backed by in-memory maps, built incrementally as rows are
/// appended (or replayed at open time).
pub struct InMemoryFinder {
	state: RwLock<State>,
}

impl Default for InMemoryFinder {
	fn default() -> Self {
		InMemoryFinder {
			state: RwLock::new(State::default()),
		}
	}
}

impl InMemoryFinder {
	pub fn new() -> InMemoryFinder {
		InMemoryFinder::default()
	}
}

impl super::Finder for InMemoryFinder {
	fn get_index(&self, uuid: &Uuid) -> Result<u64, FrozenDbError> {
		reject_nil_uuid(uuid)?;
		self.state
			.read()
			.by_uuid
			.get(uuid)
			.copied()
			.ok_or(FrozenDbError::KeyNotFound)
	}

	fn get_transaction_start(&self, index: u64) -> Result<u64, FrozenDbError> {
		reject_reserved_index(index)?;
		self.state.read().tx_start.get(&index).copied().ok_or_else(|| {
			FrozenDbError::invalid_input("index is not a known data/null row")
		})
	}

	fn get_transaction_end(&self, index: u64) -> Result<u64, FrozenDbError> {
		reject_reserved_index(index)?;
		self.state.read().tx_end.get(&index).copied().ok_or_else(|| {
			FrozenDbError::invalid_input("index is not a known data/null row")
		})
	}

	fn on_row_added(&self, index: u64, row: &Row) -> Result<(), FrozenDbError> {
		let mut state = self.state.write();
		if index != state.expected_next {
			return Err(FrozenDbError::corrupt(format!(
				"finder received index {index} out of order, expected {}",
				state.expected_next
			)));
		}
		state.expected_next = index + 1;

		match row {
			Row::Checksum(_) | Row::Partial(_) => {}
			Row::Null(null) => {
				state.tx_start.insert(index, index);
				state.tx_end.insert(index, index);
				state.max_timestamp = state.max_timestamp.max(null.timestamp_ms);
			}
			Row::Data(data) => {
				let tx_start_index = if data.first {
					state.open_tx_start = Some(index);
					state.open_tx_members.clear();
					index
				} else {
					state.open_tx_start.ok_or_else(|| {
						FrozenDbError::corrupt("continuation row with no open transaction")
					})?
				};
				state.tx_start.insert(index, tx_start_index);
				state.open_tx_members.push(index);

				if !state.by_uuid.contains_key(&data.uuid) {
					state.by_uuid.insert(data.uuid, index);
				}
				state.max_timestamp = state.max_timestamp.max(uuid_timestamp_ms(&data.uuid));

				if data.end.is_terminal() {
					let members = std::mem::take(&mut state.open_tx_members);
					for member in members {
						state.tx_end.insert(member, index);
					}
					state.open_tx_start = None;
				}
			}
		}
		Ok(())
	}

	fn max_timestamp(&self) -> u64 {
		self.state.read().max_timestamp
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::control::EndControl;
	use crate::finder::Finder;
	use crate::row::DataRow;

	fn data_row(first: bool, end: EndControl, uuid: Uuid) -> Row {
		Row::Data(DataRow {
			first,
			end,
			uuid,
			value: b"v".to_vec(),
		})
	}

	#[test]
	fn single_row_transaction() {
		let finder = InMemoryFinder::new();
		finder.on_row_added(0, &Row::Checksum(crate::row::ChecksumRow { crc: 0 })).unwrap();
		let uuid = Uuid::now_v7();
		let row = data_row(true, EndControl::Commit, uuid);
		finder.on_row_added(1, &row).unwrap();

		assert_eq!(finder.get_index(&uuid).unwrap(), 1);
		assert_eq!(finder.get_transaction_start(1).unwrap(), 1);
		assert_eq!(finder.get_transaction_end(1).unwrap(), 1);
	}

	#[test]
	fn multi_row_transaction() {
		let finder = InMemoryFinder::new();
		finder.on_row_added(0, &Row::Checksum(crate::row::ChecksumRow { crc: 0 })).unwrap();
		let u1 = Uuid::now_v7();
		let u2 = Uuid::now_v7();
		let u3 = Uuid::now_v7();
		finder.on_row_added(1, &data_row(true, EndControl::Continuation, u1)).unwrap();
		finder.on_row_added(2, &data_row(false, EndControl::Continuation, u2)).unwrap();
		finder.on_row_added(3, &data_row(false, EndControl::Commit, u3)).unwrap();

		assert_eq!(finder.get_index(&u1).unwrap(), 1);
		assert_eq!(finder.get_index(&u2).unwrap(), 2);
		assert_eq!(finder.get_index(&u3).unwrap(), 3);
		assert_eq!(finder.get_transaction_start(2).unwrap(), 1);
		assert_eq!(finder.get_transaction_end(2).unwrap(), 3);
		assert_eq!(finder.get_transaction_start(3).unwrap(), 1);
	}

	#[test]
	fn empty_commit_is_a_null_row() {
		let finder = InMemoryFinder::new();
		finder.on_row_added(0, &Row::Checksum(crate::row::ChecksumRow { crc: 0 })).unwrap();
		finder
			.on_row_added(1, &Row::Null(crate::row::NullRow { timestamp_ms: 42 }))
			.unwrap();
		assert_eq!(finder.get_transaction_start(1).unwrap(), 1);
		assert_eq!(finder.get_transaction_end(1).unwrap(), 1);
	}

	#[test]
	fn out_of_order_index_is_rejected() {
		let finder = InMemoryFinder::new();
		assert!(finder.on_row_added(1, &data_row(true, EndControl::Commit, Uuid::now_v7())).is_err());
	}

	#[test]
	fn checksum_rows_are_rejected_as_query_targets() {
		let finder = InMemoryFinder::new();
		finder.on_row_added(0, &Row::Checksum(crate::row::ChecksumRow { crc: 0 })).unwrap();
		assert!(finder.get_transaction_start(0).is_err());
	}

	#[test]
	fn duplicate_uuid_keeps_first_writer() {
		let finder = InMemoryFinder::new();
		finder.on_row_added(0, &Row::Checksum(crate::row::ChecksumRow { crc: 0 })).unwrap();
		let uuid = Uuid::now_v7();
		finder.on_row_added(1, &data_row(true, EndControl::Commit, uuid)).unwrap();
		finder.on_row_added(2, &Row::Checksum(crate::row::ChecksumRow { crc: 0 })).unwrap();
		finder.on_row_added(3, &data_row(true, EndControl::Commit, uuid)).unwrap();
		assert_eq!(finder.get_index(&uuid).unwrap(), 1);
	}
}
