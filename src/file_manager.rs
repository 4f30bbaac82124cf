//! Owns the open file handle. Appends are serialized through a single
//! background writer task driven by a channel; reads are concurrent,
//! OS `pread`-style random reads that never block the writer.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use antidote::Mutex;
use crossbeam::channel;
use fs2::FileExt as _;

use crate::error::FrozenDbError;

struct AppendRequest {
	bytes: Vec<u8>,
	reply: channel::Sender<Result<(), FrozenDbError>>,
}

/// Owns a `.fdb` file's descriptors and its single writer task.
pub struct FileManager {
	path: PathBuf,
	read_file: File,
	current_size: Arc<AtomicU64>,
	tombstoned: Arc<AtomicBool>,
	writer: Mutex<Option<channel::Sender<AppendRequest>>>,
	writer_thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl FileManager {
	/// Open an existing `.fdb` file. `writable` additionally takes the
	/// OS advisory exclusive lock a writer-mode instance requires.
	pub fn open(path: &Path, writable: bool) -> Result<FileManager, FrozenDbError> {
		let read_file = OpenOptions::new()
			.read(true)
			.write(writable)
			.open(path)
			.map_err(FrozenDbError::Path)?;

		if writable {
			read_file
				.try_lock_exclusive()
				.map_err(FrozenDbError::Path)?;
		}

		let current_size = read_file.metadata().map_err(FrozenDbError::Path)?.len();

		Ok(FileManager {
			path: path.to_owned(),
			read_file,
			current_size: Arc::new(AtomicU64::new(current_size)),
			tombstoned: Arc::new(AtomicBool::new(false)),
			writer: Mutex::new(None),
			writer_thread: Mutex::new(None),
		})
	}

	/// The confirmed on-disk size. Monotonically non-decreasing.
	pub fn size(&self) -> u64 {
		self.current_size.load(Ordering::SeqCst)
	}

	fn check_alive(&self) -> Result<(), FrozenDbError> {
		if self.tombstoned.load(Ordering::SeqCst) {
			Err(FrozenDbError::Tombstoned)
		} else {
			Ok(())
		}
	}

	/// Random read of `size` bytes starting at `offset`.
	pub fn read(&self, offset: u64, size: usize) -> Result<Vec<u8>, FrozenDbError> {
		self.check_alive()?;
		if size == 0 {
			return Err(FrozenDbError::invalid_input("read size must be non-zero"));
		}
		let end = offset
			.checked_add(size as u64)
			.ok_or_else(|| FrozenDbError::invalid_input("offset + size overflows"))?;
		if end > self.size() {
			return Err(FrozenDbError::invalid_input(
				"read range extends past the confirmed file size",
			));
		}

		let mut buf = vec![0u8; size];
		let mut filled = 0usize;
		while filled < size {
			let n = self
				.read_file
				.read_at(&mut buf[filled..], offset + filled as u64)
				.map_err(FrozenDbError::Read)?;
			if n == 0 {
				return Err(FrozenDbError::Read(std::io::Error::new(
					std::io::ErrorKind::UnexpectedEof,
					"short read against a supposedly-confirmed range",
				)));
			}
			filled += n;
		}
		Ok(buf)
	}

	/// Install and spawn the single background writer task. At most one
	/// may be installed; a second call fails with `InvalidActionError`.
	pub fn set_writer(&self) -> Result<(), FrozenDbError> {
		self.check_alive()?;
		let mut slot = self.writer.lock();
		if slot.is_some() {
			return Err(FrozenDbError::invalid_action(
				"a writer task is already installed",
			));
		}

		let append_file = OpenOptions::new()
			.append(true)
			.open(&self.path)
			.map_err(FrozenDbError::Path)?;

		let (send, recv) = channel::unbounded::<AppendRequest>();
		let current_size = self.current_size.clone();
		let tombstoned = self.tombstoned.clone();
		let handle = std::thread::spawn(move || writer_loop(recv, append_file, current_size, tombstoned));

		*slot = Some(send);
		*self.writer_thread.lock() = Some(handle);
		Ok(())
	}

	/// Append `bytes` and block until it's durable (or the append fails).
	pub fn append(&self, bytes: Vec<u8>) -> Result<(), FrozenDbError> {
		self.check_alive()?;
		let sender = {
			let slot = self.writer.lock();
			slot.clone().ok_or_else(|| {
				FrozenDbError::invalid_action("no writer task is installed on this file manager")
			})?
		};

		let (reply_tx, reply_rx) = channel::bounded(1);
		sender
			.send(AppendRequest { bytes, reply: reply_tx })
			.map_err(|_| FrozenDbError::Tombstoned)?;
		reply_rx.recv().map_err(|_| FrozenDbError::Tombstoned)?
	}

	/// Idempotent. Drops the writer sender so the writer task drains and
	/// exits, then joins it. Subsequent reads fail with `TombstonedError`.
	pub fn close(&self) {
		self.tombstoned.store(true, Ordering::SeqCst);
		let sender = self.writer.lock().take();
		drop(sender);
		if let Some(handle) = self.writer_thread.lock().take() {
			let _ = handle.join();
		}
	}
}

impl Drop for FileManager {
	fn drop(&mut self) {
		self.close();
	}
}

fn writer_loop(
	recv: channel::Receiver<AppendRequest>,
	mut append_file: File,
	current_size: Arc<AtomicU64>,
	tombstoned: Arc<AtomicBool>,
) {
	use std::io::Write;

	for req in &recv {
		if tombstoned.load(Ordering::SeqCst) {
			let _ = req.reply.send(Err(FrozenDbError::Tombstoned));
			continue;
		}

		let result = append_file
			.write_all(&req.bytes)
			.and_then(|_| append_file.sync_data());
		match result {
			Ok(()) => {
				current_size.fetch_add(req.bytes.len() as u64, Ordering::SeqCst);
				let _ = req.reply.send(Ok(()));
			}
			Err(e) => {
				tombstoned.store(true, Ordering::SeqCst);
				let _ = req.reply.send(Err(FrozenDbError::Write(e)));
				// Drain and fail every request still queued, then exit.
				for req in recv.try_iter() {
					let _ = req.reply.send(Err(FrozenDbError::Tombstoned));
				}
				return;
			}
		}
	}
}
