//! Timestamp lookup tolerant of a bounded amount of out-of-order
//! writes: a three-way partitioned binary search over a skew window,
//! falling back to a bidirectional scan from the midpoint.

use crate::error::FrozenDbError;
use crate::header::MAX_SKEW_MS;

/// Find an index `i` in `0..num_keys` with `get(i) == target`, tolerating
/// up to `skew_ms` of reordering around it.
///
/// `get` is called `O(log(num_keys)) + k` times, where `k` is the
/// population of the skew window. A `KeyNotFoundError` from `get` is
/// propagated as-is; any other error is wrapped as `ReadError`.
pub fn fuzzy_binary_search(
	target: u64,
	skew_ms: u64,
	num_keys: u64,
	get: impl Fn(u64) -> Result<u64, FrozenDbError>,
) -> Result<u64, FrozenDbError> {
	if skew_ms > MAX_SKEW_MS {
		return Err(FrozenDbError::invalid_input(format!(
			"skew_ms must be in [0, {MAX_SKEW_MS}], got {skew_ms}"
		)));
	}
	if num_keys == 0 {
		return Err(FrozenDbError::KeyNotFound);
	}

	let lower = target.saturating_sub(skew_ms);
	let upper = target.saturating_add(skew_ms);
	let scan_lower = lower.saturating_sub(skew_ms);
	let scan_upper = upper.saturating_add(skew_ms);

	let get = |i: i64| -> Result<u64, FrozenDbError> {
		get(i as u64).map_err(|e| match e {
			FrozenDbError::KeyNotFound => e,
			other => FrozenDbError::Read(std::io::Error::new(
				std::io::ErrorKind::Other,
				other.to_string(),
			)),
		})
	};

	let mut lo: i64 = 0;
	let mut hi: i64 = num_keys as i64 - 1;

	while lo <= hi {
		let mid = lo + (hi - lo) / 2;
		let v = get(mid)?;

		if v < lower {
			lo = mid + 1;
			continue;
		}
		if v > upper {
			hi = mid - 1;
			continue;
		}
		if v == target {
			return Ok(mid as u64);
		}

		let mut i = mid - 1;
		while i >= 0 {
			let vi = get(i)?;
			if vi == target {
				return Ok(i as u64);
			}
			if vi < scan_lower {
				break;
			}
			i -= 1;
		}

		let mut j = mid + 1;
		while j < num_keys as i64 {
			let vj = get(j)?;
			if vj == target {
				return Ok(j as u64);
			}
			if vj > scan_upper {
				break;
			}
			j += 1;
		}

		return Err(FrozenDbError::KeyNotFound);
	}

	Err(FrozenDbError::KeyNotFound)
}
