//! The control-byte alphabet that frames every row.
//!
//! `start_control` is a single ASCII byte identifying what kind of row
//! follows; `end_control` is a two-byte tag identifying the row's role
//! within its transaction. Both are represented here as closed
//! enumerations so the codec can never construct a row with bytes
//! outside the alphabet the format defines.

use crate::error::FrozenDbError;

/// The first byte of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartControl {
	/// `C`: a checksum row.
	Checksum,
	/// `T`: the first row of a transaction.
	TxStart,
	/// `R`: a non-first row of a transaction.
	TxContinue,
	/// `N`: an empty-commit marker.
	Null,
}

impl StartControl {
	pub(crate) fn to_byte(self) -> u8 {
		match self {
			StartControl::Checksum => b'C',
			StartControl::TxStart => b'T',
			StartControl::TxContinue => b'R',
			StartControl::Null => b'N',
		}
	}

	pub(crate) fn from_byte(b: u8) -> Result<Self, FrozenDbError> {
		match b {
			b'C' => Ok(StartControl::Checksum),
			b'T' => Ok(StartControl::TxStart),
			b'R' => Ok(StartControl::TxContinue),
			b'N' => Ok(StartControl::Null),
			other => Err(FrozenDbError::corrupt(format!(
				"unknown start control byte {:?}",
				other as char
			))),
		}
	}
}

/// The two bytes following `start_control`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndControl {
	/// `CS`: closes a checksum row.
	ChecksumSealed,
	/// `RE`: more rows follow in this transaction.
	Continuation,
	/// `TC`: commit, no savepoint was ever issued.
	Commit,
	/// `SC`: commit after a savepoint was issued.
	CommitAfterSavepoint,
	/// `NR`: closes a null (empty-commit) row.
	NullCommit,
	/// `PD`: reserved, in-progress row; never produced by a commit path.
	Partial,
	/// `R0..R9`: full rollback at one of ten rollback points.
	Rollback(u8),
	/// `S0..S9`: savepoint-relative rollback.
	SavepointRollback(u8),
}

impl EndControl {
	/// Whether this tag closes a transaction (as opposed to `Continuation`
	/// or the reserved, never-committed `Partial`).
	pub(crate) fn is_terminal(self) -> bool {
		matches!(
			self,
			EndControl::Commit
				| EndControl::CommitAfterSavepoint
				| EndControl::NullCommit
				| EndControl::Rollback(_)
				| EndControl::SavepointRollback(_)
		)
	}

	pub(crate) fn to_bytes(self) -> [u8; 2] {
		match self {
			EndControl::ChecksumSealed => *b"CS",
			EndControl::Continuation => *b"RE",
			EndControl::Commit => *b"TC",
			EndControl::CommitAfterSavepoint => *b"SC",
			EndControl::NullCommit => *b"NR",
			EndControl::Partial => *b"PD",
			EndControl::Rollback(n) => [b'R', digit(n)],
			EndControl::SavepointRollback(n) => [b'S', digit(n)],
		}
	}

	pub(crate) fn from_bytes(b: [u8; 2]) -> Result<Self, FrozenDbError> {
		Ok(match &b {
			b"CS" => EndControl::ChecksumSealed,
			b"RE" => EndControl::Continuation,
			b"TC" => EndControl::Commit,
			b"SC" => EndControl::CommitAfterSavepoint,
			b"NR" => EndControl::NullCommit,
			b"PD" => EndControl::Partial,
			[b'R', d] if d.is_ascii_digit() => EndControl::Rollback(d - b'0'),
			[b'S', d] if d.is_ascii_digit() => EndControl::SavepointRollback(d - b'0'),
			_ => {
				return Err(FrozenDbError::corrupt(format!(
					"unknown end control bytes {:?}",
					String::from_utf8_lossy(&b)
				)))
			}
		})
	}
}

fn digit(n: u8) -> u8 {
	debug_assert!(n <= 9);
	b'0' + n
}
