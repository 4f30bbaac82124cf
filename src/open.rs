//! Open an existing `.fdb` file: verify its header, recover from a
//! truncated or partially-written tail, and replay every surviving row
//! into the caller's `Finder`.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use crate::error::FrozenDbError;
use crate::file_manager::FileManager;
use crate::finder::Finder;
use crate::header::{Header, HEADER_LEN};
use crate::row::Row;

/// The pieces assembled by a successful open.
pub struct Opened {
	pub header: Header,
	pub file_manager: Arc<FileManager>,
}

/// Open `path`, recovering a truncated tail and replaying every row
/// into `finder`.
pub fn open_fdb(path: &Path, writable: bool, finder: &dyn Finder) -> Result<Opened, FrozenDbError> {
	let mut raw = OpenOptions::new()
		.read(true)
		.write(writable)
		.open(path)
		.map_err(FrozenDbError::Path)?;

	let mut header_bytes = [0u8; HEADER_LEN];
	raw.read_exact(&mut header_bytes)
		.map_err(|e| FrozenDbError::corrupt(format!("failed to read header: {e}")))?;
	let header = Header::unmarshal(&header_bytes)?;

	let file_len = raw.metadata().map_err(FrozenDbError::Path)?.len();
	let body_len = file_len
		.checked_sub(HEADER_LEN as u64)
		.ok_or_else(|| FrozenDbError::corrupt("file is shorter than its own header"))?;
	let row_size = header.row_size as u64;
	let remainder = body_len % row_size;
	let mut complete_rows = body_len / row_size;

	if remainder != 0 {
		eprintln!(
			"frozendb: {} has a partial trailing row ({remainder} stray bytes); dropping it",
			path.display()
		);
		if writable {
			raw.set_len(HEADER_LEN as u64 + complete_rows * row_size)
				.map_err(FrozenDbError::Path)?;
		}
	}

	// Rows belonging to a transaction are buffered until its terminal
	// row is seen, so a dangling (never-committed) transaction can be
	// dropped wholesale instead of polluting the finder.
	let mut pending_tx: Vec<(u64, Row)> = Vec::new();
	let mut offset = HEADER_LEN as u64;
	for index in 0..complete_rows {
		let mut buf = vec![0u8; header.row_size];
		raw.seek(SeekFrom::Start(offset)).map_err(FrozenDbError::Path)?;
		raw.read_exact(&mut buf)
			.map_err(|e| FrozenDbError::corrupt(format!("failed to read row {index}: {e}")))?;
		let row = Row::unmarshal(&header, &buf)?;

		if matches!(row, Row::Checksum(_)) {
			finder.on_row_added(index, &row)?;
		} else {
			let terminal = row.end_control().map(|e| e.is_terminal()).unwrap_or(false);
			pending_tx.push((index, row));
			if terminal {
				for (i, r) in pending_tx.drain(..) {
					finder.on_row_added(i, &r)?;
				}
			}
		}
		offset += row_size;
	}

	if let Some(&(start, _)) = pending_tx.first() {
		eprintln!(
			"frozendb: {} ends mid-transaction at row {start}; truncating to the last committed checksum row",
			path.display()
		);
		complete_rows = start;
		if writable {
			raw.set_len(HEADER_LEN as u64 + complete_rows * row_size)
				.map_err(FrozenDbError::Path)?;
		}
	}

	drop(raw);
	let file_manager = Arc::new(FileManager::open(path, writable)?);
	Ok(Opened { header, file_manager })
}
