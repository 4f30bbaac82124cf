//! Produce a brand-new `.fdb` file: header, followed by the initial
//! checksum row covering it, written atomically via a temp file and
//! rename.

use std::io::Write;
use std::path::Path;

use crate::checksum::crc32;
use crate::error::FrozenDbError;
use crate::header::Header;
use crate::provisioner::FileProvisioner;
use crate::row::{ChecksumRow, Row};

/// Create a new `.fdb` file at `path` with the given `row_size` and
/// `skew_ms`, then hand it to `provisioner` for OS-level ceremony.
pub fn create_fdb(
	path: &Path,
	row_size: usize,
	skew_ms: u64,
	provisioner: &dyn FileProvisioner,
) -> Result<(), FrozenDbError> {
	if path.extension().and_then(|e| e.to_str()) != Some("fdb") {
		return Err(FrozenDbError::invalid_input(
			"path must end with a .fdb extension",
		));
	}
	if path.exists() {
		return Err(FrozenDbError::invalid_input(format!(
			"{} already exists",
			path.display()
		)));
	}
	let header = Header::new(row_size, skew_ms)?;
	let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));

	let header_bytes = header.marshal();
	let checksum_row = Row::Checksum(ChecksumRow {
		crc: crc32(&header_bytes),
	});
	let checksum_bytes = checksum_row.marshal(&header)?;

	let mut tmp = tempfile_fast::PersistableTempFile::new_in(dir).map_err(FrozenDbError::Path)?;
	tmp.write_all(&header_bytes).map_err(FrozenDbError::Write)?;
	tmp.write_all(&checksum_bytes).map_err(FrozenDbError::Write)?;
	tmp.flush().map_err(FrozenDbError::Write)?;

	let synced = tmp.try_clone().map_err(FrozenDbError::Write)?;
	synced.sync_all().map_err(FrozenDbError::Write)?;
	drop(synced);

	tmp.persist_by_rename(path).map_err(|e| FrozenDbError::Path(e.error))?;

	if let Some(umask) = read_umask() {
		use std::os::unix::fs::PermissionsExt;
		let perms = std::fs::Permissions::from_mode((0o666 & !umask) as u32);
		let _ = std::fs::set_permissions(path, perms);
	}

	provisioner.after_create(path)
}

/// Reads the calling process's umask out of `/proc/self/status`, the
/// way the kernel exposes it without a dedicated syscall.
fn read_umask() -> Option<libc::mode_t> {
	let status = std::fs::read_to_string("/proc/self/status").ok()?;
	for line in status.lines() {
		if let Some(value) = line.strip_prefix("Umask:") {
			return libc::mode_t::from_str_radix(value.trim(), 8).ok();
		}
	}
	None
}
