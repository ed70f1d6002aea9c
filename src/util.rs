//! Contains miscellaneous helper utilities.

use std::cmp::Ordering;
use std::fs::OpenOptions;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::config::Config;
use crate::error::Error;
use crate::raw::dep;

/// Get the terminal's height, i.e. the number of rows it has.
///
/// # Returns:
/// * The terminal height, or `24` if it cannot be determined.
pub fn terminal_height() -> usize {
	if let Some((_, terminal_size::Height(rows))) = terminal_size::terminal_size() {
		usize::from(rows)
	} else {
		24
	}
}

/// Get the terminal's width, i.e. the number of columns it has.
///
/// # Returns:
/// * The terminal width, or `80` if it cannot be determined.
pub fn terminal_width() -> usize {
	if let Some((terminal_size::Width(cols), _)) = terminal_size::terminal_size() {
		usize::from(cols)
	} else {
		80
	}
}

/// Weight of a single byte during fragment comparison.
///
/// Tilde sorts before everything, including the end of a fragment.
/// Letters sort before anything that is not a letter.
fn order(c: u8) -> i32 {
	match c {
		b'~' => -1,
		b'0'..=b'9' => 0,
		b'a'..=b'z' | b'A'..=b'Z' => i32::from(c),
		0 => 0,
		_ => i32::from(c) + 256,
	}
}

fn at(s: &[u8], i: usize) -> u8 { s.get(i).copied().unwrap_or(0) }

/// Compare two upstream or revision fragments.
///
/// Alternates between a maximal run of non digits, compared by
/// [`order`], and a maximal run of digits, compared numerically with
/// leading zeros stripped. A missing fragment counts as empty.
fn cmp_fragment(a: &[u8], b: &[u8]) -> Ordering {
	let (mut i, mut j) = (0, 0);

	while i < a.len() || j < b.len() {
		// Non digit runs. The end of a fragment weighs 0, so a fragment
		// that ends here loses to letters but beats a tilde.
		while (i < a.len() && !at(a, i).is_ascii_digit())
			|| (j < b.len() && !at(b, j).is_ascii_digit())
		{
			let ac = order(at(a, i));
			let bc = order(at(b, j));
			if ac != bc {
				return ac.cmp(&bc);
			}
			i += 1;
			j += 1;
		}

		while at(a, i) == b'0' {
			i += 1;
		}
		while at(b, j) == b'0' {
			j += 1;
		}

		let mut first_diff = Ordering::Equal;
		while at(a, i).is_ascii_digit() && at(b, j).is_ascii_digit() {
			if first_diff == Ordering::Equal {
				first_diff = at(a, i).cmp(&at(b, j));
			}
			i += 1;
			j += 1;
		}

		// The longer digit run is the larger number.
		if at(a, i).is_ascii_digit() {
			return Ordering::Greater;
		}
		if at(b, j).is_ascii_digit() {
			return Ordering::Less;
		}
		if first_diff != Ordering::Equal {
			return first_diff;
		}
	}
	Ordering::Equal
}

/// Split a version string into its epoch, upstream and revision parts.
fn split_version(ver: &str) -> (u64, &str, &str) {
	let ver = ver.trim();
	let (epoch, rest) = match ver.split_once(':') {
		Some((epoch, rest)) => (epoch.parse().unwrap_or(0), rest),
		None => (0, ver),
	};

	let (upstream, revision) = match rest.rsplit_once('-') {
		Some((upstream, revision)) => (upstream, revision),
		None => (rest, ""),
	};
	(epoch, upstream, revision)
}

/// Compares two package versions, `ver1` and `ver2`. The returned enum
/// variant applies to the first version passed in.
///
/// # Examples
/// ```
/// use apt_core::util::cmp_versions;
/// use std::cmp::Ordering;
///
/// let ver1 = "5.0";
/// let ver2 = "6.0";
/// let result = cmp_versions(ver1, ver2);
///
/// assert_eq!(Ordering::Less, result);
/// ```
pub fn cmp_versions(ver1: &str, ver2: &str) -> Ordering {
	let (epoch1, upstream1, rev1) = split_version(ver1);
	let (epoch2, upstream2, rev2) = split_version(ver2);

	epoch1
		.cmp(&epoch2)
		.then_with(|| cmp_fragment(upstream1.as_bytes(), upstream2.as_bytes()))
		.then_with(|| cmp_fragment(rev1.as_bytes(), rev2.as_bytes()))
}

/// Check whether a candidate version satisfies a dependency target under
/// the given comparison operator.
pub fn check_dep(candidate: &str, op: u8, target: &str) -> bool {
	let res = cmp_versions(candidate, target);
	match op & !dep::OR {
		dep::NO_OP => true,
		dep::LESS_EQ => res != Ordering::Greater,
		dep::GREATER_EQ => res != Ordering::Less,
		dep::LESS => res == Ordering::Less,
		dep::GREATER => res == Ordering::Greater,
		dep::EQUALS => res == Ordering::Equal,
		dep::NOT_EQUALS => res != Ordering::Equal,
		_ => false,
	}
}

/// Disk Space that will be used by a transaction.
pub enum DiskSpace {
	/// Additional Disk Space required.
	Require(u64),
	/// Disk Space that will be freed
	Free(u64),
}

/// Numeral System for unit conversion.
pub enum NumSys {
	/// Base 2 | 1024 | KibiByte (KiB)
	Binary,
	/// Base 10 | 1000 | KiloByte (KB)
	Decimal,
}

/// Converts bytes into human readable output.
pub fn unit_str(val: u64, base: NumSys) -> String {
	let val = val as f64;
	let (num, tera, giga, mega, kilo) = match base {
		NumSys::Binary => (1024.0_f64, "TiB", "GiB", "MiB", "KiB"),
		NumSys::Decimal => (1000.0_f64, "TB", "GB", "MB", "KB"),
	};

	let powers = [
		(num.powi(4), tera),
		(num.powi(3), giga),
		(num.powi(2), mega),
		(num, kilo),
	];

	for (divisor, unit) in powers {
		if val > divisor {
			return format!("{:.2} {unit}", val / divisor);
		}
	}
	format!("{val} B")
}

/// Converts seconds into a human readable time string.
pub fn time_str(seconds: u64) -> String {
	if seconds > 60 * 60 * 24 {
		return format!(
			"{}d {}h {}min {}s",
			seconds / 60 / 60 / 24,
			(seconds / 60 / 60) % 24,
			(seconds / 60) % 60,
			seconds % 60,
		);
	}
	if seconds > 60 * 60 {
		return format!(
			"{}h {}min {}s",
			(seconds / 60 / 60) % 24,
			(seconds / 60) % 60,
			seconds % 60,
		);
	}
	if seconds > 60 {
		return format!("{}min {}s", (seconds / 60) % 60, seconds % 60,);
	}
	format!("{seconds}s")
}

/// Get an apt styled progress bar.
///
/// # Example:
/// ```
/// use apt_core::util::get_apt_progress_string;
/// let progress = get_apt_progress_string(0.5, 10);
/// assert_eq!(progress, "[####....]");
/// ```
pub fn get_apt_progress_string(percent: f32, output_width: u32) -> String {
	let width = output_width.max(3) as usize - 2;
	let filled = ((width as f32) * percent.clamp(0.0, 1.0)).round() as usize;

	let mut bar = String::with_capacity(width + 2);
	bar.push('[');
	for i in 0..width {
		bar.push(if i < filled { '#' } else { '.' });
	}
	bar.push(']');
	bar
}

struct LockState {
	file: Option<std::fs::File>,
	count: usize,
	inner: Option<std::fs::File>,
	inner_count: usize,
}

static LOCK: Mutex<LockState> = Mutex::new(LockState {
	file: None,
	count: 0,
	inner: None,
	inner_count: 0,
});

fn flock_path(path: &str) -> Result<std::fs::File, Error> {
	let file = OpenOptions::new()
		.create(true)
		.truncate(false)
		.write(true)
		.open(path)
		.map_err(|e| Error::io("open", path, e))?;

	let ret = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
	if ret != 0 {
		return Err(Error::LockBusy {
			path: PathBuf::from(path),
		});
	}
	Ok(file)
}

/// Lock the frontend lockfile.
/// This should be done before modifying any system state and
/// then [`apt_unlock`] should be called after.
///
/// This Function Requires root
///
/// If [`apt_lock`] is called `n` times, [`apt_unlock`] must also be
/// called `n` times to release all acquired locks.
pub fn apt_lock(config: &Config) -> Result<(), Error> {
	let mut state = LOCK.lock().unwrap();
	if state.count == 0 {
		let path = config.file("Dir::Lock", "/var/lib/dpkg/lock-frontend");
		state.file = Some(flock_path(&path)?);
	}
	state.count += 1;
	Ok(())
}

/// Unlock the frontend lockfile.
pub fn apt_unlock(_config: &Config) {
	let mut state = LOCK.lock().unwrap();
	if state.count == 0 {
		return;
	}
	state.count -= 1;
	if state.count == 0 {
		// Dropping the file releases the flock.
		state.file = None;
	}
}

/// Lock the installer backend's own lockfile.
/// This should be released with [`apt_unlock_inner`] before the backend
/// runs so that it can access its files.
///
/// This Function Requires root
pub fn apt_lock_inner(config: &Config) -> Result<(), Error> {
	let mut state = LOCK.lock().unwrap();
	if state.inner_count == 0 {
		let path = config.file("Dir::Lock::Inner", "/var/lib/dpkg/lock");
		state.inner = Some(flock_path(&path)?);
	}
	state.inner_count += 1;
	Ok(())
}

/// Unlock the installer backend's lockfile.
pub fn apt_unlock_inner(_config: &Config) {
	let mut state = LOCK.lock().unwrap();
	if state.inner_count == 0 {
		return;
	}
	state.inner_count -= 1;
	if state.inner_count == 0 {
		state.inner = None;
	}
}

/// Checks if any locks are currently active for the lockfile. Note that
/// this will only return [`true`] if the current process has an active
/// lock.
pub fn apt_is_locked() -> bool { LOCK.lock().unwrap().count > 0 }
