//! CRC32/IEEE checksums and the two fixed-width Base64 encodings the
//! wire format uses: an 8-character checksum field and a 24-character
//! UUID field.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use byteorder::{BigEndian, ByteOrder};

use crate::error::FrozenDbError;

/// CRC32/IEEE over `data`.
pub(crate) fn crc32(data: &[u8]) -> u32 {
	crc32fast::hash(data)
}

/// The fixed length, in bytes, of an encoded checksum field.
pub(crate) const CHECKSUM_LEN: usize = 8;

/// Encode a CRC32 value as the 8-character Base64 field stored on disk.
pub(crate) fn encode_checksum(crc: u32) -> [u8; CHECKSUM_LEN] {
	let mut be = [0u8; 4];
	BigEndian::write_u32(&mut be, crc);
	let encoded = STANDARD.encode(be);
	let mut out = [0u8; CHECKSUM_LEN];
	out.copy_from_slice(encoded.as_bytes());
	out
}

/// Decode an 8-character Base64 checksum field back into a CRC32 value.
pub(crate) fn decode_checksum(field: &[u8]) -> Result<u32, FrozenDbError> {
	if field.len() != CHECKSUM_LEN {
		return Err(FrozenDbError::corrupt("checksum field has the wrong length"));
	}
	let decoded = STANDARD
		.decode(field)
		.map_err(|e| FrozenDbError::corrupt(format!("checksum is not valid base64: {e}")))?;
	if decoded.len() != 4 {
		return Err(FrozenDbError::corrupt(
			"checksum did not decode to 4 bytes",
		));
	}
	Ok(BigEndian::read_u32(&decoded))
}

/// The fixed length, in bytes, of an encoded UUID field.
pub(crate) const UUID_FIELD_LEN: usize = 24;

/// Encode a UUID's 16-byte binary form as the 24-character Base64 field
/// stored at the start of every data row's payload.
pub(crate) fn encode_uuid(uuid: &uuid::Uuid) -> [u8; UUID_FIELD_LEN] {
	let encoded = STANDARD.encode(uuid.as_bytes());
	let mut out = [0u8; UUID_FIELD_LEN];
	out.copy_from_slice(encoded.as_bytes());
	out
}

/// Decode the 24-character Base64 UUID field.
pub(crate) fn decode_uuid(field: &[u8]) -> Result<uuid::Uuid, FrozenDbError> {
	if field.len() != UUID_FIELD_LEN {
		return Err(FrozenDbError::corrupt("uuid field has the wrong length"));
	}
	let decoded = STANDARD
		.decode(field)
		.map_err(|e| FrozenDbError::corrupt(format!("uuid is not valid base64: {e}")))?;
	let bytes: [u8; 16] = decoded
		.try_into()
		.map_err(|_| FrozenDbError::corrupt("uuid did not decode to 16 bytes"))?;
	Ok(uuid::Uuid::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn known_crc_value_encodes_to_known_base64() {
		assert_eq!(&encode_checksum(0x1234_5678), b"EjRWeA==");
		assert_eq!(decode_checksum(b"EjRWeA==").unwrap(), 0x1234_5678);
	}

	#[test]
	fn checksum_round_trips() {
		for crc in [0u32, 1, 0xffff_ffff, 0xdead_beef, crc32(b"hello world")] {
			let encoded = encode_checksum(crc);
			assert_eq!(decode_checksum(&encoded).unwrap(), crc);
		}
	}

	#[test]
	fn uuid_field_round_trips() {
		let id = uuid::Uuid::now_v7();
		let encoded = encode_uuid(&id);
		assert_eq!(encoded.len(), UUID_FIELD_LEN);
		assert_eq!(decode_uuid(&encoded).unwrap(), id);
	}

	#[test]
	fn rejects_garbage() {
		assert!(decode_checksum(b"short").is_err());
		assert!(decode_uuid(b"not enough bytes here at all!!!").is_err());
	}
}
