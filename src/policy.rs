//! Priority policy: assigns priorities to origins and picks candidates.
//!
//! Priority table:
//!
//! 1000 -> inf = Downgradeable priorities
//! 1000        = The 'no downgrade' pseudo status file
//! 100 -> 1000 = Standard priorities
//! 990         = Config file override package files
//! 989         = Start for preference auto priorities
//! 500         = Default package files
//! 100         = The status file
//! 0 -> 100    = NotAutomatic sources like experimental
//! -inf -> 0   = Never selected

use tracing::debug;

use crate::cache::Cache;
use crate::raw::{flag, pkf, pkg, ver, vrf};
/// How a pin rule selects its victims.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinType {
	None,
	/// Match an explicit version string, globs allowed.
	Version,
	/// Match release file fields (`a=stable,n=bookworm,o=Debian,...`).
	Release,
	/// Match the origin site of the index.
	Origin,
}

#[derive(Debug, Clone)]
pub struct Pin {
	pub pin_type: PinType,
	pub data: String,
	pub priority: i16,
}

impl Pin {
	fn none() -> Pin {
		Pin {
			pin_type: PinType::None,
			data: String::new(),
			priority: 0,
		}
	}
}

/// Simple shell style pattern match supporting `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
	let p: Vec<char> = pattern.chars().collect();
	let t: Vec<char> = text.chars().collect();
	let (mut pi, mut ti) = (0, 0);
	let mut star: Option<(usize, usize)> = None;

	while ti < t.len() {
		if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
			pi += 1;
			ti += 1;
		} else if pi < p.len() && p[pi] == '*' {
			star = Some((pi, ti));
			pi += 1;
		} else if let Some((sp, st)) = star {
			pi = sp + 1;
			ti = st + 1;
			star = Some((sp, st + 1));
		} else {
			return false;
		}
	}
	while pi < p.len() && p[pi] == '*' {
		pi += 1;
	}
	pi == p.len()
}

/// Does a release style pin expression match a PackageFile?
fn file_match(cache: &Cache, file_off: u32, data: &str) -> bool {
	let a = cache.arena();
	let field = |off: u32| a.str_at(a.get(file_off + off));

	// A bare word matches the archive or the codename.
	if !data.contains('=') {
		return field(pkf::ARCHIVE) == data || field(pkf::CODENAME) == data;
	}

	for part in data.split(',') {
		let Some((key, value)) = part.split_once('=') else { return false };
		let actual = match key.trim() {
			"a" => field(pkf::ARCHIVE),
			"n" => field(pkf::CODENAME),
			"v" => field(pkf::VERSION),
			"o" => field(pkf::ORIGIN),
			"l" => field(pkf::LABEL),
			"c" => field(pkf::COMPONENT),
			"b" => field(pkf::ARCH),
			"site" => field(pkf::SITE),
			_ => return false,
		};
		if !glob_match(value.trim(), actual) {
			return false;
		}
	}
	true
}

/// Assigns a priority to every origin and selects candidate versions.
pub struct Policy {
	/// Priority per PackageFile, indexed by its id.
	pf_priority: Vec<i16>,
	/// Per package pins, indexed by package id.
	pins: Vec<Pin>,
	/// Pins that apply to origins rather than single packages, in
	/// declaration order.
	defaults: Vec<Pin>,
	/// A pin above 1000 exists, so the installed version shortcut is off.
	status_override: bool,
}

impl Policy {
	/// Build the policy for a cache with the config's master override
	/// applied.
	pub fn new(cache: &Cache) -> Policy {
		let header = cache.header();
		let mut policy = Policy {
			pf_priority: vec![500; header.packagefile_count as usize],
			pins: vec![Pin::none(); header.package_count as usize],
			defaults: Vec::new(),
			status_override: false,
		};

		// The config file has a master override.
		let def_rel = cache.config().find("APT::Default-Release", "");
		if !def_rel.is_empty() {
			policy.create_pin(cache, PinType::Release, "", &def_rel, 990);
		}

		policy.init_defaults(cache);
		policy
	}

	/// Create an entry in the pin table.
	///
	/// A blank package name makes the pin a default that applies to whole
	/// origins; order of insertion matters there, earlier defaults win.
	pub fn create_pin(
		&mut self,
		cache: &Cache,
		pin_type: PinType,
		name: &str,
		data: &str,
		priority: i16,
	) {
		let pin = Pin {
			pin_type,
			data: data.to_string(),
			priority,
		};

		if name.is_empty() {
			self.defaults.push(pin);
			return;
		}

		match cache.find_pkg_offset(name, None) {
			Some(off) => {
				let id = cache.arena().get(off + pkg::ID) as usize;
				if let Some(slot) = self.pins.get_mut(id) {
					*slot = pin;
				}
			},
			None => debug!("pin for unknown package {name} dropped"),
		}
	}

	/// Recompute the per origin priorities from base rules and default
	/// pins. Call after the last [`Policy::create_pin`].
	pub fn init_defaults(&mut self, cache: &Cache) {
		let a = cache.arena();
		let header = cache.header();

		// Base priority of every origin.
		let mut file = header.first_file;
		while file != 0 {
			let id = a.get(file + pkf::ID) as usize;
			let flags = a.get(file + pkf::FLAGS);
			self.pf_priority[id] = if flags & flag::NOT_SOURCE != 0 {
				100
			} else if flags & flag::NOT_AUTOMATIC != 0 {
				1
			} else {
				500
			};
			file = a.get(file + pkf::NEXT_FILE);
		}

		// Apply the defaults in declaration order with the descending
		// auto priority for rules that did not set one.
		let mut fixed = vec![false; self.pf_priority.len()];
		let mut cur: i16 = 989;
		self.status_override = false;

		for pin in &self.defaults {
			let mut file = header.first_file;
			while file != 0 {
				let id = a.get(file + pkf::ID) as usize;
				if !fixed[id] && file_match(cache, file, &pin.data) {
					if pin.priority > 0 {
						cur = pin.priority;
					}
					self.pf_priority[id] = if pin.priority < 0 { pin.priority } else { cur };

					if self.pf_priority[id] > 1000 {
						self.status_override = true;
					}
					fixed[id] = true;
				}
				file = a.get(file + pkf::NEXT_FILE);
			}
			cur -= 1;
		}
	}

	/// The priority of one origin.
	pub fn priority_of_file(&self, cache: &Cache, file_off: u32) -> i16 {
		let id = cache.arena().get(file_off + pkf::ID) as usize;
		self.pf_priority.get(id).copied().unwrap_or(0)
	}

	/// The effective priority of a version: the best of its origins.
	pub fn priority_of_version(&self, cache: &Cache, ver_off: u32) -> i16 {
		let a = cache.arena();
		let mut best = i16::MIN;
		let mut vf = a.get(ver_off + ver::FILE_LIST);
		while vf != 0 {
			let prio = self.priority_of_file(cache, a.get(vf + vrf::FILE));
			if prio > best {
				best = prio;
			}
			vf = a.get(vf + vrf::NEXT);
		}
		if best == i16::MIN {
			0
		} else {
			best
		}
	}

	/// Priority granted by a package pin, zero when there is none.
	fn pin_priority(&self, pkg_id: u32) -> i16 {
		match self.pins.get(pkg_id as usize) {
			Some(pin) if pin.pin_type != PinType::None => {
				// In this case 0 means default priority.
				if pin.priority == 0 {
					989
				} else {
					pin.priority
				}
			},
			_ => 0,
		}
	}

	/// The version a package pin selects, if any.
	fn pin_match(&self, cache: &Cache, pkg_off: u32) -> u32 {
		let a = cache.arena();
		let pkg_id = a.get(pkg_off + pkg::ID);
		let Some(pin) = self.pins.get(pkg_id as usize) else { return 0 };

		let mut v = a.get(pkg_off + pkg::VERSIONS);
		while v != 0 {
			let matched = match pin.pin_type {
				PinType::None => return 0,
				PinType::Version => glob_match(&pin.data, a.str_at(a.get(v + ver::VERSION))),
				PinType::Release | PinType::Origin => {
					let mut vf = a.get(v + ver::FILE_LIST);
					let mut any = false;
					while vf != 0 {
						let file = a.get(vf + vrf::FILE);
						any = match pin.pin_type {
							PinType::Origin => {
								glob_match(&pin.data, a.str_at(a.get(file + pkf::SITE)))
							},
							_ => file_match(cache, file, &pin.data),
						};
						if any {
							break;
						}
						vf = a.get(vf + vrf::NEXT);
					}
					any
				},
			};
			if matched {
				return v;
			}
			v = a.get(v + ver::NEXT_VER);
		}
		0
	}

	/// Evaluate the pins and origin priorities to determine the best
	/// installable version of a package.
	pub fn candidate_version(&self, cache: &Cache, pkg_off: u32) -> u32 {
		let a = cache.arena();
		let pkg_id = a.get(pkg_off + pkg::ID);
		let current = a.get(pkg_off + pkg::CURRENT_VER);

		let mut max = self.pin_priority(pkg_id);
		let mut pref = self.pin_match(cache, pkg_off);

		let mut v = a.get(pkg_off + pkg::VERSIONS);
		while v != 0 {
			let mut vf = a.get(v + ver::FILE_LIST);
			while vf != 0 {
				let file = a.get(vf + vrf::FILE);

				// A status file entry that is not the installed version is
				// a leftover and never a candidate.
				if a.get(file + pkf::FLAGS) & flag::NOT_SOURCE != 0 && current != v {
					vf = a.get(vf + vrf::NEXT);
					continue;
				}

				let prio = self.priority_of_file(cache, file);
				if prio > max {
					pref = v;
					max = prio;
				}
				vf = a.get(vf + vrf::NEXT);
			}

			if current == v && max < 1000 {
				// Elevate our current selection to the pseudo status
				// priority.
				if pref == 0 {
					pref = v;
				}
				max = 1000;

				if !self.status_override {
					break;
				}
			}
			v = a.get(v + ver::NEXT_VER);
		}
		pref
	}

	/// Strict pinning check used by the solvers: a version that no origin
	/// grants a positive priority is not allowed unless installed.
	pub fn is_allowed_version(&self, cache: &Cache, ver_off: u32) -> bool {
		let a = cache.arena();
		let parent = a.get(ver_off + ver::PARENT_PKG);
		if a.get(parent + pkg::CURRENT_VER) == ver_off {
			return true;
		}
		self.priority_of_version(cache, ver_off) > 0
	}

	/// True when a pin above 1000 allows downgrades for this package.
	pub fn allows_downgrade(&self, pkg_id: u32) -> bool { self.pin_priority(pkg_id) > 1000 }
}
