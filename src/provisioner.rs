//! OS-level ceremony performed once, right after a new `.fdb` file is
//! durably renamed into place: transferring ownership back to the
//! invoking user when created under `sudo`, and marking the file
//! append-only at the filesystem level.
//!
//! This is modeled as a trait so callers on platforms without this
//! ceremony (or running without `CAP_CHOWN`/`CAP_LINUX_IMMUTABLE`) can
//! swap in their own.

use std::ffi::CString;
use std::fs::File;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use crate::error::FrozenDbError;

const FS_IOC_GETFLAGS: libc::c_ulong = 0x8008_6601;
const FS_IOC_SETFLAGS: libc::c_ulong = 0x4008_6602;
const FS_APPEND_FL: libc::c_long = 0x0000_0020;

/// Runs once, after creation, against a newly-written `.fdb` file.
pub trait FileProvisioner: Send + Sync {
	fn after_create(&self, path: &Path) -> Result<(), FrozenDbError>;
}

/// `chown`s the file to `$SUDO_UID`/`$SUDO_GID` when present, then sets
/// the Linux `FS_APPEND_FL` inode attribute.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProvisioner;

impl FileProvisioner for DefaultProvisioner {
	fn after_create(&self, path: &Path) -> Result<(), FrozenDbError> {
		chown_to_sudo_user(path)?;
		set_append_only(path)
	}
}

/// Does nothing. Useful for tests and platforms where this ceremony
/// doesn't apply.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProvisioner;

impl FileProvisioner for NoopProvisioner {
	fn after_create(&self, _path: &Path) -> Result<(), FrozenDbError> {
		Ok(())
	}
}

fn chown_to_sudo_user(path: &Path) -> Result<(), FrozenDbError> {
	let uid = std::env::var("SUDO_UID")
		.ok()
		.and_then(|s| s.parse::<libc::uid_t>().ok());
	let gid = std::env::var("SUDO_GID")
		.ok()
		.and_then(|s| s.parse::<libc::gid_t>().ok());
	let (uid, gid) = match (uid, gid) {
		(Some(uid), Some(gid)) => (uid, gid),
		// Not running under sudo; leave ownership as-is.
		_ => return Ok(()),
	};

	let c_path = CString::new(path.as_os_str().as_bytes())
		.map_err(|_| FrozenDbError::invalid_input("path contains a nul byte"))?;
	let rc = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
	if rc != 0 {
		return Err(FrozenDbError::Write(std::io::Error::last_os_error()));
	}
	Ok(())
}

fn set_append_only(path: &Path) -> Result<(), FrozenDbError> {
	let file = File::open(path).map_err(FrozenDbError::Write)?;
	let fd = file.as_raw_fd();

	let mut flags: libc::c_long = 0;
	let rc = unsafe { libc::ioctl(fd, FS_IOC_GETFLAGS, &mut flags) };
	if rc != 0 {
		return Err(FrozenDbError::Write(std::io::Error::last_os_error()));
	}

	flags |= FS_APPEND_FL;
	let rc = unsafe { libc::ioctl(fd, FS_IOC_SETFLAGS, &flags) };
	if rc != 0 {
		return Err(FrozenDbError::Write(std::io::Error::last_os_error()));
	}
	Ok(())
}
