use frozendb::{create, open, FinderStrategy, Mode};
use uuid::{ContextV7, Timestamp, Uuid};

fn uuid_at(ts_ms: u64) -> Uuid {
	let context = ContextV7::new();
	let seconds = ts_ms / 1000;
	let nanos = ((ts_ms % 1000) * 1_000_000) as u32;
	Uuid::new_v7(Timestamp::from_unix(&context, seconds, nanos))
}

fn write_timestamps(path: &std::path::Path, row_size: usize, skew_ms: u64, timestamps: &[u64]) {
	create(path, row_size, skew_ms).unwrap();
	let db = open(path, Mode::Write, FinderStrategy::InMemory).unwrap();
	for &ts in timestamps {
		let mut tx = db.begin_tx().unwrap();
		tx.add_row(uuid_at(ts), b"v".to_vec()).unwrap();
		tx.commit().unwrap();
	}
}

#[test]
fn fuzzy_hit_with_reorder() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("x.fdb");
	let base = 1_700_000_000_000u64;
	let offsets = [2i64, -2, 0, 1, -1];
	let timestamps: Vec<u64> = offsets.iter().map(|&o| (base as i64 + o) as u64).collect();
	write_timestamps(&path, 128, 5, &timestamps);

	let db = open(&path, Mode::Read, FinderStrategy::InMemory).unwrap();
	let found = db.fuzzy_find(base).unwrap();
	assert_eq!(db.get_transaction_start(found).unwrap(), found);
}

#[test]
fn fuzzy_miss_outside_skew() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("x.fdb");
	write_timestamps(&path, 128, 5, &[100, 200, 400, 500]);

	let db = open(&path, Mode::Read, FinderStrategy::InMemory).unwrap();
	assert!(db.fuzzy_find(300).is_err());
}

#[test]
fn scanning_and_in_memory_finders_agree() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("x.fdb");
	create(&path, 128, 5000).unwrap();

	let uuids: Vec<Uuid> = (0..5).map(|_| Uuid::now_v7()).collect();
	{
		let db = open(&path, Mode::Write, FinderStrategy::InMemory).unwrap();
		for u in &uuids {
			let mut tx = db.begin_tx().unwrap();
			tx.add_row(*u, b"x".to_vec()).unwrap();
			tx.commit().unwrap();
		}
		db.close();
	}

	let scanning = open(&path, Mode::Read, FinderStrategy::Simple).unwrap();
	let in_memory = open(&path, Mode::Read, FinderStrategy::InMemory).unwrap();

	for u in &uuids {
		assert_eq!(scanning.get_index(u).unwrap(), in_memory.get_index(u).unwrap());
	}
	for i in 1..=uuids.len() as u64 {
		assert_eq!(
			scanning.get_transaction_start(i).unwrap(),
			in_memory.get_transaction_start(i).unwrap()
		);
		assert_eq!(
			scanning.get_transaction_end(i).unwrap(),
			in_memory.get_transaction_end(i).unwrap()
		);
	}
	assert_eq!(scanning.max_timestamp(), in_memory.max_timestamp());
}
