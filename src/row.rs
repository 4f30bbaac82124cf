//! Marshal/unmarshal fixed-size rows of every kind.
//!
//! Every row is `start_control(1) || end_control(2) || payload ||
//! checksum(8) || '\n'`, padded with spaces to exactly `header.row_size`
//! bytes. The payload area's length is therefore `row_size - 12` for
//! every row regardless of kind; each kind just disagrees about how
//! much of that area is meaningful content versus padding.

use uuid::Uuid;

use crate::checksum::{crc32, decode_checksum, decode_uuid, encode_checksum, encode_uuid, CHECKSUM_LEN, UUID_FIELD_LEN};
use crate::control::{EndControl, StartControl};
use crate::error::FrozenDbError;
use crate::header::Header;

/// Bytes reserved for control bytes, checksum, and the trailing newline;
/// what's left of `row_size` is the payload area.
const FRAME_OVERHEAD: usize = 1 /* start */ + 2 /* end */ + CHECKSUM_LEN + 1 /* \n */;

/// Width, in bytes, of a null row's fixed timestamp content.
const NULL_TIMESTAMP_LEN: usize = 6;

fn payload_area_len(header: &Header) -> usize {
	header.row_size - FRAME_OVERHEAD
}

/// A checksum row: a rolling checksum of the preceding segment (the
/// header, or the previous transaction's rows). Its own payload area
/// carries no content, it's pure space padding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumRow {
	pub crc: u32,
}

/// A data row: one record in an in-progress or committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
	/// `true` for the first row of a transaction (`start = T`), `false`
	/// for a continuation row (`start = R`).
	pub first: bool,
	pub end: EndControl,
	pub uuid: Uuid,
	pub value: Vec<u8>,
}

/// An empty-commit marker: a transaction that added no rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullRow {
	pub timestamp_ms: u64,
}

/// A reserved, in-progress row. No commit path ever produces one; the
/// codec only needs to recognize and discard it during open-time
/// recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialRow {
	pub first: bool,
}

/// The decoded form of a single on-disk row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
	Checksum(ChecksumRow),
	Data(DataRow),
	Null(NullRow),
	Partial(PartialRow),
}

impl Row {
	/// Encode this row into exactly `header.row_size` bytes.
	pub fn marshal(&self, header: &Header) -> Result<Vec<u8>, FrozenDbError> {
		let area_len = payload_area_len(header);
		match self {
			Row::Checksum(row) => Ok(frame(
				StartControl::Checksum,
				EndControl::ChecksumSealed,
				&[],
				area_len,
				encode_checksum(row.crc),
			)),
			Row::Null(row) => {
				let mut content = [0u8; NULL_TIMESTAMP_LEN];
				write_be48(&mut content, row.timestamp_ms);
				let crc = crc32(&content);
				Ok(frame(
					StartControl::Null,
					EndControl::NullCommit,
					&content,
					area_len,
					encode_checksum(crc),
				))
			}
			Row::Data(row) => {
				let mut content = Vec::with_capacity(UUID_FIELD_LEN + row.value.len());
				content.extend_from_slice(&encode_uuid(&row.uuid));
				content.extend_from_slice(&row.value);
				if content.len() > area_len {
					return Err(FrozenDbError::invalid_input(format!(
						"value of {} bytes does not fit in a row_size={} payload area",
						row.value.len(),
						header.row_size
					)));
				}
				let crc = crc32(&content);
				let start = if row.first {
					StartControl::TxStart
				} else {
					StartControl::TxContinue
				};
				Ok(frame(start, row.end, &content, area_len, encode_checksum(crc)))
			}
			Row::Partial(row) => {
				let start = if row.first {
					StartControl::TxStart
				} else {
					StartControl::TxContinue
				};
				Ok(frame(start, EndControl::Partial, &[], area_len, [b' '; CHECKSUM_LEN]))
			}
		}
	}

	/// Decode exactly `header.row_size` bytes into a `Row`.
	pub fn unmarshal(header: &Header, bytes: &[u8]) -> Result<Row, FrozenDbError> {
		if bytes.len() != header.row_size {
			return Err(FrozenDbError::corrupt(format!(
				"row must be {} bytes, got {}",
				header.row_size,
				bytes.len()
			)));
		}
		if bytes[header.row_size - 1] != b'\n' {
			return Err(FrozenDbError::corrupt("row is missing its trailing newline"));
		}

		let start = StartControl::from_byte(bytes[0])?;
		let end = EndControl::from_bytes([bytes[1], bytes[2]])?;

		let area_len = payload_area_len(header);
		let payload_area = &bytes[3..3 + area_len];
		let checksum_field = &bytes[3 + area_len..3 + area_len + CHECKSUM_LEN];

		match start {
			StartControl::Checksum => {
				if end != EndControl::ChecksumSealed {
					return Err(FrozenDbError::corrupt(
						"checksum row must have end-control CS",
					));
				}
				if payload_area.iter().any(|&b| b != b' ') {
					return Err(FrozenDbError::corrupt(
						"checksum row's payload area must be empty",
					));
				}
				let crc = decode_checksum(checksum_field)?;
				Ok(Row::Checksum(ChecksumRow { crc }))
			}
			StartControl::Null => {
				if end != EndControl::NullCommit {
					return Err(FrozenDbError::corrupt("null row must have end-control NR"));
				}
				if payload_area.len() < NULL_TIMESTAMP_LEN {
					return Err(FrozenDbError::corrupt("row too small to hold a null-row timestamp"));
				}
				let content = &payload_area[..NULL_TIMESTAMP_LEN];
				let crc = decode_checksum(checksum_field)?;
				if crc32(content) != crc {
					return Err(FrozenDbError::corrupt("null row checksum mismatch"));
				}
				Ok(Row::Null(NullRow {
					timestamp_ms: read_be48(content),
				}))
			}
			StartControl::TxStart | StartControl::TxContinue => {
				let first = start == StartControl::TxStart;
				if end == EndControl::Partial {
					// Reserved, in-progress row: tolerate it without validating
					// its checksum, since it was never finalized.
					return Ok(Row::Partial(PartialRow { first }));
				}

				let content_len = trim_trailing_spaces(payload_area);
				if content_len < UUID_FIELD_LEN {
					return Err(FrozenDbError::corrupt(
						"data row payload is too short to hold a uuid",
					));
				}
				let content = &payload_area[..content_len];

				let crc = decode_checksum(checksum_field)?;
				if crc32(content) != crc {
					return Err(FrozenDbError::corrupt("data row checksum mismatch"));
				}

				let uuid = decode_uuid(&content[..UUID_FIELD_LEN])?;
				if uuid.is_nil() || uuid.get_version() != Some(uuid::Version::SortRand) {
					return Err(FrozenDbError::invalid_input(
						"data row key must be a non-nil UUID v7",
					));
				}
				let value = content[UUID_FIELD_LEN..].to_vec();

				Ok(Row::Data(DataRow {
					first,
					end,
					uuid,
					value,
				}))
			}
		}
	}

	/// The `start_control` this row was (or would be) framed with.
	pub fn is_data_or_null(&self) -> bool {
		matches!(self, Row::Data(_) | Row::Null(_))
	}

	/// The end-control of this row, if it has a meaningful one (checksum
	/// and partial rows don't carry transaction-framing information).
	pub fn end_control(&self) -> Option<EndControl> {
		match self {
			Row::Data(r) => Some(r.end),
			Row::Null(_) => Some(EndControl::NullCommit),
			Row::Checksum(_) | Row::Partial(_) => None,
		}
	}

	/// Whether this row starts a new transaction (`T` or `N`).
	pub fn starts_transaction(&self) -> bool {
		match self {
			Row::Data(r) => r.first,
			Row::Null(_) => true,
			Row::Checksum(_) | Row::Partial(_) => false,
		}
	}
}

fn frame(
	start: StartControl,
	end: EndControl,
	content: &[u8],
	area_len: usize,
	checksum: [u8; CHECKSUM_LEN],
) -> Vec<u8> {
	let row_size = area_len + FRAME_OVERHEAD;
	let mut out = Vec::with_capacity(row_size);
	out.push(start.to_byte());
	out.extend_from_slice(&end.to_bytes());
	out.extend_from_slice(content);
	out.resize(3 + area_len, b' ');
	out.extend_from_slice(&checksum);
	out.push(b'\n');
	debug_assert_eq!(out.len(), row_size);
	out
}

fn write_be48(dest: &mut [u8; NULL_TIMESTAMP_LEN], value: u64) {
	for i in 0..NULL_TIMESTAMP_LEN {
		dest[i] = (value >> (8 * (NULL_TIMESTAMP_LEN - 1 - i))) as u8;
	}
}

fn read_be48(src: &[u8]) -> u64 {
	let mut v = 0u64;
	for &b in &src[..NULL_TIMESTAMP_LEN] {
		v = (v << 8) | b as u64;
	}
	v
}

/// The length of `area` with any trailing run of `0x20` bytes removed.
fn trim_trailing_spaces(area: &[u8]) -> usize {
	let mut len = area.len();
	while len > 0 && area[len - 1] == b' ' {
		len -= 1;
	}
	len
}

/// Extract the Unix-ms timestamp embedded in a UUID v7's first 48 bits.
pub fn uuid_timestamp_ms(uuid: &Uuid) -> u64 {
	let bytes = uuid.as_bytes();
	read_be48(&bytes[..6])
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::header::Header;

	fn header() -> Header {
		Header::new(128, 5000).unwrap()
	}

	#[test]
	fn checksum_row_round_trips() {
		let h = header();
		let row = Row::Checksum(ChecksumRow { crc: 0xdead_beef });
		let bytes = row.marshal(&h).unwrap();
		assert_eq!(bytes.len(), h.row_size);
		assert_eq!(Row::unmarshal(&h, &bytes).unwrap(), row);
	}

	#[test]
	fn data_row_round_trips() {
		let h = header();
		let uuid = Uuid::now_v7();
		let row = Row::Data(DataRow {
			first: true,
			end: EndControl::Continuation,
			uuid,
			value: b"hello".to_vec(),
		});
		let bytes = row.marshal(&h).unwrap();
		let back = Row::unmarshal(&h, &bytes).unwrap();
		assert_eq!(back, row);
	}

	#[test]
	fn null_row_round_trips() {
		let h = header();
		let row = Row::Null(NullRow {
			timestamp_ms: 1_700_000_000_123,
		});
		let bytes = row.marshal(&h).unwrap();
		assert_eq!(Row::unmarshal(&h, &bytes).unwrap(), row);
	}

	#[test]
	fn partial_row_tolerated_without_checksum_check() {
		let h = header();
		let row = Row::Partial(PartialRow { first: false });
		let bytes = row.marshal(&h).unwrap();
		assert_eq!(Row::unmarshal(&h, &bytes).unwrap(), row);
	}

	#[test]
	fn flipping_a_payload_byte_breaks_checksum() {
		let h = header();
		let row = Row::Data(DataRow {
			first: true,
			end: EndControl::Commit,
			uuid: Uuid::now_v7(),
			value: b"payload-bytes".to_vec(),
		});
		let mut bytes = row.marshal(&h).unwrap();
		// byte 3 is inside the base64 uuid prefix, part of the checksummed content
		bytes[3] ^= 0x01;
		assert!(Row::unmarshal(&h, &bytes).is_err());
	}

	#[test]
	fn flipping_a_padding_byte_is_tolerated() {
		let h = header();
		let row = Row::Data(DataRow {
			first: true,
			end: EndControl::Commit,
			uuid: Uuid::now_v7(),
			value: b"x".to_vec(),
		});
		let mut bytes = row.marshal(&h).unwrap();
		let last_pad_byte = bytes.len() - CHECKSUM_LEN - 2;
		assert_eq!(bytes[last_pad_byte], b' ');
		bytes[last_pad_byte] = b'!';
		assert_eq!(Row::unmarshal(&h, &bytes).unwrap(), row);
	}

	#[test]
	fn rejects_nil_uuid() {
		let h = header();
		let row = Row::Data(DataRow {
			first: true,
			end: EndControl::Commit,
			uuid: Uuid::nil(),
			value: b"x".to_vec(),
		});
		let bytes = row.marshal(&h).unwrap();
		assert!(Row::unmarshal(&h, &bytes).is_err());
	}

	#[test]
	fn rejects_non_v7_uuid() {
		let h = header();
		let row = Row::Data(DataRow {
			first: true,
			end: EndControl::Commit,
			uuid: Uuid::new_v4(),
			value: b"x".to_vec(),
		});
		let bytes = row.marshal(&h).unwrap();
		assert!(Row::unmarshal(&h, &bytes).is_err());
	}

	#[test]
	fn value_too_big_for_row_size_is_rejected() {
		let h = header();
		let row = Row::Data(DataRow {
			first: true,
			end: EndControl::Commit,
			uuid: Uuid::now_v7(),
			value: vec![b'x'; h.row_size],
		});
		assert!(row.marshal(&h).is_err());
	}

	#[test]
	fn wrong_length_is_corrupt() {
		let h = header();
		assert!(Row::unmarshal(&h, &[0u8; 10]).is_err());
	}

	#[test]
	fn uuid_timestamp_extraction() {
		let uuid = Uuid::now_v7();
		let ts = uuid_timestamp_ms(&uuid);
		let now = std::time::SystemTime::now()
			.duration_since(std::time::UNIX_EPOCH)
			.unwrap()
			.as_millis() as u64;
		assert!(ts <= now && now - ts < 60_000);
	}
}
