//! The fixed 64-byte text header every `.fdb` file begins with.

use crate::error::FrozenDbError;

/// Total on-disk size of the header, including its trailing newline.
pub const HEADER_LEN: usize = 64;

const SIGNATURE: &str = "fDB";
const VERSION: u32 = 1;

pub const MIN_ROW_SIZE: usize = 128;
pub const MAX_ROW_SIZE: usize = 65536;
pub const MAX_SKEW_MS: u64 = 86_400_000;

/// The parsed form of a `.fdb` file's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
	pub version: u32,
	pub row_size: usize,
	pub skew_ms: u64,
}

impl Header {
	/// Build a header, validating `row_size` and `skew_ms` against their
	/// allowed ranges.
	pub fn new(row_size: usize, skew_ms: u64) -> Result<Header, FrozenDbError> {
		if !(MIN_ROW_SIZE..=MAX_ROW_SIZE).contains(&row_size) {
			return Err(FrozenDbError::invalid_input(format!(
				"row_size must be in [{MIN_ROW_SIZE}, {MAX_ROW_SIZE}], got {row_size}"
			)));
		}
		if skew_ms > MAX_SKEW_MS {
			return Err(FrozenDbError::invalid_input(format!(
				"skew_ms must be in [0, {MAX_SKEW_MS}], got {skew_ms}"
			)));
		}
		Ok(Header {
			version: VERSION,
			row_size,
			skew_ms,
		})
	}

	/// Encode this header into its fixed 64-byte on-disk text form: a
	/// single-space-separated field line, padded with spaces to 63
	/// bytes, with `\n` at byte 63.
	pub fn marshal(&self) -> [u8; HEADER_LEN] {
		let line = format!(
			"{} {} {} {}",
			SIGNATURE, self.version, self.row_size, self.skew_ms
		);
		assert!(
			line.len() < HEADER_LEN - 1,
			"header line too long to fit the fixed 64-byte header"
		);
		let mut out = [b' '; HEADER_LEN];
		out[..line.len()].copy_from_slice(line.as_bytes());
		out[HEADER_LEN - 1] = b'\n';
		out
	}

	/// Decode a 64-byte header, validating its signature, version,
	/// and field ranges.
	pub fn unmarshal(bytes: &[u8]) -> Result<Header, FrozenDbError> {
		if bytes.len() != HEADER_LEN {
			return Err(FrozenDbError::corrupt(format!(
				"header must be {HEADER_LEN} bytes, got {}",
				bytes.len()
			)));
		}
		if bytes[HEADER_LEN - 1] != b'\n' {
			return Err(FrozenDbError::corrupt("header is missing its trailing newline"));
		}
		let line = std::str::from_utf8(&bytes[..HEADER_LEN - 1])
			.map_err(|_| FrozenDbError::corrupt("header is not valid UTF-8"))?
			.trim_end_matches(' ');

		let mut fields = line.split(' ');
		let signature = fields
			.next()
			.ok_or_else(|| FrozenDbError::corrupt("header is missing its signature"))?;
		if signature != SIGNATURE {
			return Err(FrozenDbError::corrupt(format!(
				"bad signature {signature:?}, expected {SIGNATURE:?}"
			)));
		}

		let parse_u32 = |name: &str, s: Option<&str>| -> Result<u32, FrozenDbError> {
			s.ok_or_else(|| FrozenDbError::corrupt(format!("header is missing {name}")))?
				.parse::<u32>()
				.map_err(|_| FrozenDbError::corrupt(format!("header has a malformed {name}")))
		};
		let parse_u64 = |name: &str, s: Option<&str>| -> Result<u64, FrozenDbError> {
			s.ok_or_else(|| FrozenDbError::corrupt(format!("header is missing {name}")))?
				.parse::<u64>()
				.map_err(|_| FrozenDbError::corrupt(format!("header has a malformed {name}")))
		};

		let version = parse_u32("version", fields.next())?;
		if version != VERSION {
			return Err(FrozenDbError::corrupt(format!(
				"unsupported header version {version}"
			)));
		}
		let row_size = parse_u32("row_size", fields.next())? as usize;
		let skew_ms = parse_u64("skew_ms", fields.next())?;

		if fields.next().is_some() {
			return Err(FrozenDbError::corrupt("header has trailing fields"));
		}

		Header::new(row_size, skew_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips() {
		let h = Header::new(1024, 5000).unwrap();
		let bytes = h.marshal();
		assert_eq!(bytes.len(), HEADER_LEN);
		assert_eq!(bytes[HEADER_LEN - 1], b'\n');
		let back = Header::unmarshal(&bytes).unwrap();
		assert_eq!(back, h);
	}

	#[test]
	fn rejects_bad_signature() {
		let mut bytes = Header::new(200, 0).unwrap().marshal();
		bytes[0] = b'x';
		assert!(Header::unmarshal(&bytes).is_err());
	}

	#[test]
	fn rejects_row_size_out_of_range() {
		assert!(Header::new(127, 0).is_err());
		assert!(Header::new(65537, 0).is_err());
		assert!(Header::new(128, 0).is_ok());
		assert!(Header::new(65536, 0).is_ok());
	}

	#[test]
	fn rejects_skew_out_of_range() {
		assert!(Header::new(200, MAX_SKEW_MS + 1).is_err());
		assert!(Header::new(200, MAX_SKEW_MS).is_ok());
	}

	#[test]
	fn rejects_wrong_length() {
		assert!(Header::unmarshal(&[0u8; 10]).is_err());
	}

	#[test]
	fn rejects_missing_newline() {
		let mut bytes = Header::new(200, 0).unwrap().marshal();
		bytes[HEADER_LEN - 1] = b' ';
		assert!(Header::unmarshal(&bytes).is_err());
	}
}
