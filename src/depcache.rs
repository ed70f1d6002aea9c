//! Contain DepCache related structs
//!
//! The DepCache overlays mutable per package decisions on the immutable
//! package cache: which version to install, whether to keep or remove,
//! and the bookkeeping derived from those choices. All mutation happens
//! inside an [`ActionGroup`]; statistics are recomputed when the
//! outermost group closes.

use std::cell::{Cell, OnceCell, RefCell};
use std::fs;

use tracing::debug;

use crate::cache::{Cache, Upgrade};
use crate::error::{AptErrors, Error};
use crate::raw::{dep, depend, flag, pkg, prv, ver};
use crate::resolver::ProblemResolver;
use crate::tagfile::parse_tagfile;
use crate::util::{cmp_versions, DiskSpace};
use crate::{Package, Version};

/// Maximum recursion depth when auto installing dependencies.
const MARK_DEPTH: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
	Delete,
	Keep,
	Install,
}

// iflags bits.
const REINSTALL: u8 = 1;
const PURGE: u8 = 2;

// flags bits.
const AUTO: u8 = 1;
const PROTECTED: u8 = 2;
const GARBAGE: u8 = 4;

/// Mutable decision state for one package.
#[derive(Debug, Clone)]
pub(crate) struct StateCache {
	pub candidate: u32,
	pub install: u32,
	pub mode: Mode,
	pub iflags: u8,
	pub flags: u8,
}

impl StateCache {
	fn new() -> StateCache {
		StateCache {
			candidate: 0,
			install: 0,
			mode: Mode::Keep,
			iflags: 0,
			flags: 0,
		}
	}
}

/// Which world a dependency is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum World {
	/// What is on disk right now.
	Now,
	/// What the current decisions would produce.
	Install,
	/// What policy candidates would produce.
	Candidate,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counts {
	install: u32,
	delete: u32,
	keep: u32,
	broken: u32,
}

/// Per package mutable decisions on top of the package cache.
#[derive(Debug)]
pub struct DepCache {
	states: RefCell<Vec<StateCache>>,
	group_level: Cell<u32>,
	counts: Cell<Counts>,
	resolver: OnceCell<ProblemResolver>,
}

impl DepCache {
	pub(crate) fn new(cache: &Cache) -> DepCache {
		let by_id = cache.pkgs_by_id();
		let mut states = vec![StateCache::new(); by_id.len()];

		for (id, &off) in by_id.iter().enumerate() {
			if off == 0 {
				continue;
			}
			let current = cache.arena().get(off + pkg::CURRENT_VER);
			states[id].candidate = cache.policy().candidate_version(cache, off);
			states[id].install = current;
		}

		let depcache = DepCache {
			states: RefCell::new(states),
			group_level: Cell::new(0),
			counts: Cell::new(Counts::default()),
			resolver: OnceCell::new(),
		};
		depcache.read_state_file(cache);
		depcache.update(cache);
		depcache
	}

	/// Load the automatically installed flags from the extended states
	/// file.
	fn read_state_file(&self, cache: &Cache) {
		let path = cache
			.config()
			.file("Dir::State::extended_states", "extended_states");
		let Ok(content) = fs::read_to_string(&path) else { return };
		let Ok(sections) = parse_tagfile(&content) else { return };

		let mut states = self.states.borrow_mut();
		for section in sections {
			let Some(name) = section.get("Package") else { continue };
			if section.get_default("Auto-Installed", "0").trim() != "1" {
				continue;
			}
			let arch = section.get("Architecture");
			if let Some(off) = cache.find_pkg_offset(name, arch) {
				let id = cache.arena().get(off + pkg::ID) as usize;
				if let Some(st) = states.get_mut(id) {
					st.flags |= AUTO;
				}
			}
		}
	}

	/// Get the ProblemResolver for these decisions.
	pub fn resolver(&self) -> &ProblemResolver { self.resolver.get_or_init(ProblemResolver::new) }

	/// Open an explicit action group.
	///
	/// Mutations already wrap themselves in one; this is for callers
	/// batching many marks who want a single recomputation at the end.
	pub fn action_group<'a>(&'a self, cache: &'a Cache) -> ActionGroup<'a> {
		self.begin();
		ActionGroup {
			depcache: self,
			cache,
		}
	}

	fn begin(&self) { self.group_level.set(self.group_level.get() + 1); }

	fn end(&self, cache: &Cache) {
		let level = self.group_level.get();
		debug_assert!(level > 0, "unbalanced action group");
		self.group_level.set(level.saturating_sub(1));
		if level <= 1 {
			self.update(cache);
		}
	}

	/// Error out if an action group is still open.
	pub(crate) fn ensure_closed(&self) -> Result<(), Error> {
		if self.group_level.get() != 0 {
			return Err(Error::InconsistentState {
				msg: "an action group is still open".to_string(),
			});
		}
		Ok(())
	}

	pub(crate) fn state(&self, id: u32) -> StateCache {
		self.states.borrow()[id as usize].clone()
	}

	fn pkg_state(&self, pkg_off: u32, cache: &Cache) -> StateCache {
		self.state(cache.arena().get(pkg_off + pkg::ID))
	}

	/// The version that would end up installed, or zero.
	pub(crate) fn install_ver_of(&self, cache: &Cache, pkg_off: u32) -> u32 {
		self.pkg_state(pkg_off, cache).install
	}

	/// The version a dependency world resolves a package to.
	pub(crate) fn world_ver(
		cache: &Cache,
		states: &[StateCache],
		pkg_off: u32,
		world: World,
	) -> u32 {
		match world {
			World::Now => cache.arena().get(pkg_off + pkg::CURRENT_VER),
			World::Install => {
				let id = cache.arena().get(pkg_off + pkg::ID) as usize;
				states.get(id).map(|s| s.install).unwrap_or(0)
			},
			World::Candidate => {
				let id = cache.arena().get(pkg_off + pkg::ID) as usize;
				states.get(id).map(|s| s.candidate).unwrap_or(0)
			},
		}
	}

	/// Whether a single dependency record holds in a world.
	pub(crate) fn dep_satisfied(
		cache: &Cache,
		states: &[StateCache],
		dep_off: u32,
		world: World,
	) -> bool {
		let negative = dep::is_negative(cache.arena().get8(dep_off + depend::DEP_TYPE));
		let found = cache.dep_targets(dep_off).into_iter().any(|v| {
			let parent = cache.arena().get(v + ver::PARENT_PKG);
			Self::world_ver(cache, states, parent, world) == v
		});
		if negative {
			!found
		} else {
			found
		}
	}

	/// Whether a whole or group starting at `dep_off` holds. Returns the
	/// offset just past the group as well.
	pub(crate) fn group_satisfied(
		cache: &Cache,
		states: &[StateCache],
		dep_off: u32,
		world: World,
	) -> (bool, u32) {
		let a = cache.arena();
		let mut off = dep_off;
		let mut ok = false;
		loop {
			if Self::dep_satisfied(cache, states, off, world) {
				ok = true;
			}
			let or = a.get8(off + depend::COMP_TYPE) & dep::OR != 0;
			off = a.get(off + depend::NEXT_DEP);
			if !or || off == 0 {
				break;
			}
		}
		(ok, off)
	}

	/// Does the chosen install version of this package have an
	/// unsatisfied critical dependency group?
	pub(crate) fn inst_broken(cache: &Cache, states: &[StateCache], pkg_off: u32) -> bool {
		let a = cache.arena();
		let id = a.get(pkg_off + pkg::ID) as usize;
		let install = match states.get(id) {
			Some(s) => s.install,
			None => return false,
		};
		if install == 0 {
			return false;
		}

		let mut off = a.get(install + ver::DEPENDS);
		while off != 0 {
			let dep_type = a.get8(off + depend::DEP_TYPE);
			let (ok, next) = Self::group_satisfied(cache, states, off, World::Install);
			if dep::is_critical(dep_type) && !ok {
				return true;
			}
			off = next;
		}
		false
	}

	fn now_broken(cache: &Cache, states: &[StateCache], pkg_off: u32) -> bool {
		let a = cache.arena();
		let current = a.get(pkg_off + pkg::CURRENT_VER);
		if current == 0 {
			return false;
		}

		let mut off = a.get(current + ver::DEPENDS);
		while off != 0 {
			let dep_type = a.get8(off + depend::DEP_TYPE);
			let (ok, next) = Self::group_satisfied(cache, states, off, World::Now);
			if dep::is_critical(dep_type) && !ok {
				return true;
			}
			off = next;
		}
		false
	}

	/// Recompute statistics and the garbage sweep. Runs when the
	/// outermost action group closes.
	fn update(&self, cache: &Cache) {
		self.mark_and_sweep(cache);

		let states = self.states.borrow();
		let mut counts = Counts::default();
		let a = cache.arena();

		for off in cache.pkg_offsets() {
			let id = a.get(off + pkg::ID) as usize;
			let st = &states[id];
			let current = a.get(off + pkg::CURRENT_VER);

			match st.mode {
				Mode::Install => {
					if st.install != current || st.iflags & REINSTALL != 0 {
						counts.install += 1;
					}
				},
				Mode::Delete => {
					if current != 0 {
						counts.delete += 1;
					}
				},
				Mode::Keep => {
					// Held back: an upgrade exists but is not taken.
					if current != 0 && st.candidate != 0 && st.candidate != current {
						counts.keep += 1;
					}
				},
			}

			if st.mode != Mode::Delete && Self::inst_broken(cache, &states, off) {
				counts.broken += 1;
			}
		}

		self.counts.set(counts);
	}

	/// Follow manual roots through their dependencies and flag anything
	/// automatically installed that is no longer reachable as garbage.
	fn mark_and_sweep(&self, cache: &Cache) {
		let a = cache.arena();
		let follow_recommends = cache
			.config()
			.bool("APT::AutoRemove::RecommendsImportant", true);
		let follow_suggests = cache.config().bool("APT::AutoRemove::SuggestsImportant", true);

		let mut states = self.states.borrow_mut();
		let npkgs = states.len();
		let mut reachable = vec![false; npkgs];
		let mut queue = Vec::new();

		for off in cache.pkg_offsets() {
			let id = a.get(off + pkg::ID) as usize;
			let st = &states[id];
			let present = st.install != 0;
			if !present {
				continue;
			}
			let is_root = st.flags & AUTO == 0
				|| a.get(off + pkg::FLAGS) & (flag::ESSENTIAL | flag::IMPORTANT) != 0;
			if is_root && !reachable[id] {
				reachable[id] = true;
				queue.push(off);
			}
		}

		while let Some(off) = queue.pop() {
			let id = a.get(off + pkg::ID) as usize;
			let world = states[id].install;
			if world == 0 {
				continue;
			}

			let mut dep_off = a.get(world + ver::DEPENDS);
			while dep_off != 0 {
				let dep_type = a.get8(dep_off + depend::DEP_TYPE);
				let interesting = matches!(dep_type, dep::DEPENDS | dep::PRE_DEPENDS)
					|| (dep_type == dep::RECOMMENDS && follow_recommends)
					|| (dep_type == dep::SUGGESTS && follow_suggests);

				if interesting {
					for target in cache.dep_targets(dep_off) {
						let parent = a.get(target + ver::PARENT_PKG);
						let pid = a.get(parent + pkg::ID) as usize;
						if states[pid].install == target && !reachable[pid] {
							reachable[pid] = true;
							queue.push(parent);
						}
					}
				}
				dep_off = a.get(dep_off + depend::NEXT_DEP);
			}
		}

		for off in cache.pkg_offsets() {
			let id = a.get(off + pkg::ID) as usize;
			let st = &mut states[id];
			if st.install != 0 && st.flags & AUTO != 0 && !reachable[id] {
				st.flags |= GARBAGE;
			} else {
				st.flags &= !GARBAGE;
			}
		}
	}

	/// The number of packages marked for installation.
	pub fn install_count(&self) -> u32 { self.counts.get().install }

	/// The number of packages marked for removal.
	pub fn delete_count(&self) -> u32 { self.counts.get().delete }

	/// The number of packages held back from an available upgrade.
	pub fn keep_count(&self) -> u32 { self.counts.get().keep }

	/// The number of packages with broken dependencies in the cache.
	pub fn broken_count(&self) -> u32 { self.counts.get().broken }

	/// The size of all archives that need to be fetched.
	pub fn download_size(&self, cache: &Cache) -> u64 {
		let states = self.states.borrow();
		let a = cache.arena();
		let mut total = 0;
		for off in cache.pkg_offsets() {
			let id = a.get(off + pkg::ID) as usize;
			let st = &states[id];
			let current = a.get(off + pkg::CURRENT_VER);
			if st.mode == Mode::Install && (st.install != current || st.iflags & REINSTALL != 0)
			{
				total += u64::from(a.get(st.install + ver::SIZE_BYTES));
			}
		}
		total
	}

	/// The amount of space required for installing/removing the packages,
	///
	/// i.e. the Installed-Size of all packages marked for installation
	/// minus the Installed-Size of all packages for removal.
	pub fn disk_size(&self, cache: &Cache) -> DiskSpace {
		let states = self.states.borrow();
		let a = cache.arena();
		let mut size: i64 = 0;
		for off in cache.pkg_offsets() {
			let id = a.get(off + pkg::ID) as usize;
			let st = &states[id];
			let current = a.get(off + pkg::CURRENT_VER);
			match st.mode {
				Mode::Install if st.install != current => {
					size += i64::from(a.get(st.install + ver::INSTALLED_SIZE));
					if current != 0 {
						size -= i64::from(a.get(current + ver::INSTALLED_SIZE));
					}
				},
				Mode::Delete if current != 0 => {
					size -= i64::from(a.get(current + ver::INSTALLED_SIZE));
				},
				_ => {},
			}
		}

		if size < 0 {
			return DiskSpace::Free(-size as u64);
		}
		DiskSpace::Require(size as u64)
	}

	pub(crate) fn candidate_version(&self, pkg: &Package) -> u32 {
		self.state(pkg.id()).candidate
	}

	pub(crate) fn install_version(&self, pkg: &Package) -> u32 { self.state(pkg.id()).install }

	/// Set a version to be the candidate of its package.
	pub fn set_candidate(&self, version: &Version) {
		let parent = version.parent();
		let id = parent.id() as usize;
		let mut states = self.states.borrow_mut();
		let st = &mut states[id];
		st.candidate = version.offset();
		if st.mode == Mode::Install {
			st.install = version.offset();
		}
	}

	pub fn is_upgradable(&self, pkg: &Package) -> bool {
		let st = self.state(pkg.id());
		let Some(installed) = pkg.installed() else { return false };
		if st.candidate == 0 || st.candidate == installed.offset() {
			return false;
		}
		let cand = Version::new(st.candidate, pkg.cache);
		cmp_versions(cand.version(), installed.version()) == std::cmp::Ordering::Greater
	}

	pub fn is_auto_installed(&self, pkg: &Package) -> bool {
		self.state(pkg.id()).flags & AUTO != 0
	}

	pub fn is_garbage(&self, pkg: &Package) -> bool { self.state(pkg.id()).flags & GARBAGE != 0 }

	pub(crate) fn is_protected_id(&self, id: u32) -> bool {
		self.state(id).flags & PROTECTED != 0
	}

	pub fn marked_install(&self, pkg: &Package) -> bool {
		self.state(pkg.id()).mode == Mode::Install
	}

	pub fn marked_new_install(&self, pkg: &Package) -> bool {
		self.marked_install(pkg) && !pkg.is_installed()
	}

	pub fn marked_upgrade(&self, pkg: &Package) -> bool {
		let st = self.state(pkg.id());
		if st.mode != Mode::Install || st.install == 0 {
			return false;
		}
		match pkg.installed() {
			Some(installed) if st.install != installed.offset() => {
				let to = Version::new(st.install, pkg.cache);
				cmp_versions(to.version(), installed.version()) == std::cmp::Ordering::Greater
			},
			Some(_) => false,
			None => true,
		}
	}

	pub fn marked_downgrade(&self, pkg: &Package) -> bool {
		let st = self.state(pkg.id());
		if st.mode != Mode::Install || st.install == 0 {
			return false;
		}
		match pkg.installed() {
			Some(installed) if st.install != installed.offset() => {
				let to = Version::new(st.install, pkg.cache);
				cmp_versions(to.version(), installed.version()) == std::cmp::Ordering::Less
			},
			_ => false,
		}
	}

	pub fn marked_delete(&self, pkg: &Package) -> bool {
		self.state(pkg.id()).mode == Mode::Delete
	}

	pub fn marked_purge(&self, pkg: &Package) -> bool {
		let st = self.state(pkg.id());
		st.mode == Mode::Delete && st.iflags & PURGE != 0
	}

	pub fn marked_keep(&self, pkg: &Package) -> bool { self.state(pkg.id()).mode == Mode::Keep }

	pub fn marked_reinstall(&self, pkg: &Package) -> bool {
		let st = self.state(pkg.id());
		st.mode == Mode::Install && st.iflags & REINSTALL != 0
	}

	pub fn marked_held(&self, pkg: &Package) -> bool {
		let st = self.state(pkg.id());
		pkg.selected_state() == crate::PkgSelectedState::Hold
			&& st.mode == Mode::Keep
			&& st.candidate != 0
			&& Some(st.candidate) != pkg.installed().map(|v| v.offset())
	}

	/// The dependency state bits of a single dependency record: whether
	/// it holds right now, in the planned world, against candidates, and
	/// the same for its whole or group.
	pub fn dep_state(&self, dep: &crate::BaseDep) -> u8 {
		use crate::iterators::DepFlags;

		let cache = dep.parent_version().parent().cache;
		let states = self.states.borrow();
		let mut bits = 0;

		if Self::dep_satisfied(cache, &states, dep.offset(), World::Now) {
			bits |= DepFlags::DepNow;
		}
		if Self::dep_satisfied(cache, &states, dep.offset(), World::Install) {
			bits |= DepFlags::DepInstall;
		}
		if Self::dep_satisfied(cache, &states, dep.offset(), World::Candidate) {
			bits |= DepFlags::DepCVer;
		}

		// Group bits take the whole or group into account. Walk back to
		// the group start first.
		let a = cache.arena();
		let parent_ver = a.get(dep.offset() + depend::PARENT_VER);
		let mut start = a.get(parent_ver + ver::DEPENDS);
		let mut group_start = start;
		while start != 0 && start != dep.offset() {
			let or = a.get8(start + depend::COMP_TYPE) & dep::OR != 0;
			start = a.get(start + depend::NEXT_DEP);
			if !or {
				group_start = start;
			}
		}

		for (world, bit) in [
			(World::Now, DepFlags::DepGNow),
			(World::Install, DepFlags::DepGInstall),
			(World::Candidate, DepFlags::DepGVer),
		] {
			if Self::group_satisfied(cache, &states, group_start, world).0 {
				bits |= bit;
			}
		}
		bits
	}

	pub fn is_now_broken(&self, pkg: &Package) -> bool {
		let states = self.states.borrow();
		Self::now_broken(pkg.cache, &states, pkg.offset())
	}

	pub fn is_inst_broken(&self, pkg: &Package) -> bool {
		let states = self.states.borrow();
		Self::inst_broken(pkg.cache, &states, pkg.offset())
	}

	/// Mark a package as automatically installed.
	pub fn mark_auto(&self, pkg: &Package, mark_auto: bool) {
		let mut states = self.states.borrow_mut();
		let st = &mut states[pkg.id() as usize];
		if mark_auto {
			st.flags |= AUTO;
		} else {
			st.flags &= !AUTO;
		}
	}

	pub(crate) fn mark_protected(&self, id: u32) {
		self.states.borrow_mut()[id as usize].flags |= PROTECTED;
	}

	/// Mark a package to stay at its current version.
	pub fn mark_keep(&self, pkg: &Package) -> bool {
		let cache = pkg.cache;
		self.begin();
		{
			let mut states = self.states.borrow_mut();
			let st = &mut states[pkg.id() as usize];
			st.mode = Mode::Keep;
			st.iflags &= !REINSTALL;
			st.install = cache.arena().get(pkg.offset() + pkg::CURRENT_VER);
		}
		self.end(cache);
		true
	}

	/// Mark a package for removal.
	pub fn mark_delete(&self, pkg: &Package, purge: bool) -> bool {
		let cache = pkg.cache;
		if pkg.is_essential() && !cache.config().bool("APT::Force-Remove-Essential", false) {
			debug!("refusing to remove essential package {}", pkg.name());
			return false;
		}

		self.begin();
		{
			let mut states = self.states.borrow_mut();
			let st = &mut states[pkg.id() as usize];
			st.mode = Mode::Delete;
			st.install = 0;
			st.iflags &= !REINSTALL;
			if purge {
				st.iflags |= PURGE;
			} else {
				st.iflags &= !PURGE;
			}
		}
		self.end(cache);
		true
	}

	/// Mark a package for installation.
	///
	/// auto_inst = Auto Install dependencies of the package.
	/// from_user = Mark the package as installed from the User.
	pub fn mark_install(&self, pkg: &Package, auto_inst: bool, from_user: bool) -> bool {
		let cache = pkg.cache;
		self.begin();
		let res = self.mark_install_inner(cache, pkg.offset(), auto_inst, MARK_DEPTH, from_user);
		self.end(cache);
		res
	}

	fn mark_install_inner(
		&self,
		cache: &Cache,
		pkg_off: u32,
		auto_inst: bool,
		depth: u32,
		from_user: bool,
	) -> bool {
		let a = cache.arena();
		let id = a.get(pkg_off + pkg::ID);
		let current = a.get(pkg_off + pkg::CURRENT_VER);

		let candidate = {
			let states = self.states.borrow();
			states[id as usize].candidate
		};

		// A virtual package can be installed through its only provider.
		if candidate == 0 {
			let mut providers = Vec::new();
			let mut p = a.get(pkg_off + pkg::PROVIDES);
			while p != 0 {
				let provider = a.get(a.get(p + prv::PARENT_VER) + ver::PARENT_PKG);
				if !providers.contains(&provider) {
					providers.push(provider);
				}
				p = a.get(p + prv::NEXT_PRV_PKG);
			}
			if providers.len() == 1 && depth > 0 {
				debug!(
					"selecting sole provider for virtual package {}",
					a.str_at(a.get(pkg_off + pkg::NAME))
				);
				return self.mark_install_inner(cache, providers[0], auto_inst, depth - 1, from_user);
			}
			return false;
		}

		{
			let mut states = self.states.borrow_mut();
			let st = &mut states[id as usize];
			if from_user {
				st.flags &= !AUTO;
			} else if current == 0 && st.mode != Mode::Install {
				st.flags |= AUTO;
			}

			if candidate == current && st.iflags & REINSTALL == 0 {
				// Nothing to do, it is already where it should be.
				st.mode = Mode::Keep;
				st.install = current;
				return true;
			}

			st.mode = Mode::Install;
			st.install = candidate;
		}

		if !auto_inst || depth == 0 {
			return true;
		}

		// Walk the candidate's dependency groups and pull in whatever is
		// not yet satisfied in the planned world.
		let install_recommends = cache.config().bool("APT::Install-Recommends", true);
		let mut dep_off = a.get(candidate + ver::DEPENDS);

		while dep_off != 0 {
			let dep_type = a.get8(dep_off + depend::DEP_TYPE);
			let group_start = dep_off;

			let (satisfied, next) = {
				let states = self.states.borrow();
				Self::group_satisfied(cache, &states, group_start, World::Install)
			};

			let wanted = matches!(dep_type, dep::DEPENDS | dep::PRE_DEPENDS)
				|| (dep_type == dep::RECOMMENDS && install_recommends);

			if wanted && !satisfied {
				self.resolve_group(cache, group_start, depth);
			}

			if dep::is_negative(dep_type) && !satisfied {
				self.remove_conflicts(cache, group_start);
			}

			dep_off = next;
		}

		true
	}

	/// Try to satisfy one unsatisfied positive or group by marking the
	/// first workable alternative.
	fn resolve_group(&self, cache: &Cache, group_start: u32, depth: u32) {
		let a = cache.arena();
		let mut off = group_start;

		loop {
			for target in cache.dep_targets(off) {
				let parent = a.get(target + ver::PARENT_PKG);
				let parent_id = a.get(parent + pkg::ID);
				let st = self.state(parent_id);

				// Only a target that is the candidate of its package can
				// be reached by marking that package.
				if st.candidate == target && st.mode != Mode::Delete {
					self.mark_install_inner(cache, parent, true, depth - 1, false);
					return;
				}
			}

			let or = a.get8(off + depend::COMP_TYPE) & dep::OR != 0;
			off = a.get(off + depend::NEXT_DEP);
			if !or || off == 0 {
				return;
			}
		}
	}

	/// Remove whatever an unsatisfied negative dependency points at.
	fn remove_conflicts(&self, cache: &Cache, dep_off: u32) {
		let a = cache.arena();
		for target in cache.dep_targets(dep_off) {
			let parent = a.get(target + ver::PARENT_PKG);
			let parent_id = a.get(parent + pkg::ID);
			let st = self.state(parent_id);

			if st.install == target && st.flags & PROTECTED == 0 {
				let pkg_view = Package::new(cache, parent);
				debug!("removing {} to solve a conflict", pkg_view.name());
				self.mark_delete(&pkg_view, false);
			}
		}
	}

	/// Mark a package for reinstallation.
	pub fn mark_reinstall(&self, pkg: &Package, reinstall: bool) {
		let cache = pkg.cache;
		self.begin();
		{
			let mut states = self.states.borrow_mut();
			let st = &mut states[pkg.id() as usize];
			if reinstall {
				st.iflags |= REINSTALL;
				if st.mode == Mode::Keep && st.install != 0 {
					st.mode = Mode::Install;
				}
			} else {
				st.iflags &= !REINSTALL;
			}
		}
		self.end(cache);
	}

	/// Mark every package the given upgrade mode wants changed.
	pub(crate) fn upgrade(&self, cache: &Cache, upgrade_type: Upgrade) -> Result<(), AptErrors> {
		{
			let _group = self.action_group(cache);

			// Upgrade all installed packages first without automatic
			// dependencies to help the resolver pick only needed changes.
			let upgradable: Vec<u32> = cache
				.pkg_offsets()
				.into_iter()
				.filter(|&off| {
					let p = Package::new(cache, off);
					p.is_installed() && self.is_upgradable(&p)
				})
				.collect();

			for &off in &upgradable {
				let p = Package::new(cache, off);
				self.mark_install(&p, false, false);
			}

			match upgrade_type {
				Upgrade::SafeUpgrade => {},
				Upgrade::Upgrade | Upgrade::FullUpgrade => {
					for &off in &upgradable {
						let p = Package::new(cache, off);
						if self.is_inst_broken(&p) {
							self.mark_install(&p, true, false);
						}
					}
				},
			}

			if let Upgrade::FullUpgrade = upgrade_type {
				// A distribution upgrade also pulls in essential packages
				// that are not installed yet.
				for off in cache.pkg_offsets() {
					let p = Package::new(cache, off);
					if !p.is_installed()
						&& cache.arena().get(off + pkg::FLAGS) & flag::ESSENTIAL != 0
						&& p.candidate().is_some()
					{
						self.mark_install(&p, true, false);
					}
				}
			}
		}

		match upgrade_type {
			Upgrade::FullUpgrade => self.resolver().resolve(cache, false),
			_ => self.resolver().resolve_by_keep(cache),
		}
	}

	pub(crate) fn set_state(&self, id: u32, f: impl FnOnce(&mut StateCache)) {
		let mut states = self.states.borrow_mut();
		f(&mut states[id as usize]);
	}

	pub(crate) fn with_states<R>(&self, f: impl FnOnce(&[StateCache]) -> R) -> R {
		let states = self.states.borrow();
		f(&states)
	}

	/// Recompute statistics outside of a group, for callers that used
	/// [`DepCache::set_state`] directly.
	pub(crate) fn refresh(&self, cache: &Cache) { self.update(cache); }
}

/// Scope for a batch of decisions.
///
/// Nested groups defer the broken count recomputation to the outermost
/// one. Transient decisions are retained across nested groups.
pub struct ActionGroup<'a> {
	depcache: &'a DepCache,
	cache: &'a Cache,
}

impl Drop for ActionGroup<'_> {
	fn drop(&mut self) { self.depcache.end(self.cache); }
}
