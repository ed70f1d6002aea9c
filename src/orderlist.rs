//! Represents and manipulates an ordered list of packages.
//!
//! A list of packages can be ordered by a number of conflicting criteria
//! each given a specific priority. Four independent ordering passes are
//! applied in sequence, each considering progressively fewer rules, so
//! that every consideration gets its own priority and the final order
//! satisfies the lowest applicable one.
//!
//! The rules for unpacking ordering:
//!  1) Unpacking ignores Depends: on all packages
//!  2) Unpacking requires Conflicts: on -ALL- packages to be satisfied
//!  3) Unpacking requires PreDepends: on this package only to be satisfied
//!  4) Removing requires that no packages depend on the package to be
//!     removed
//!
//! And the rule for configuration ordering:
//!  1) Configuring requires that the Depends: of the package be satisfied
//!
//! The rules listed above may never be violated and are called critical.
//! When a critical rule is violated a loop condition is recorded and has
//! to be dealt with in the caller.

use tracing::trace;

use crate::cache::Cache;
use crate::depcache::{DepCache, Mode};
use crate::error::Error;
use crate::raw::{dep, depend, flag, pkg, prio, prv, ver};

/// Package flag bits used while ordering.
pub mod oflag {
	pub const IN_LIST: u8 = 1 << 0;
	pub const ADDED: u8 = 1 << 1;
	/// Grey in the depth first search; seeing it again means a loop.
	pub const ADD_PENDING: u8 = 1 << 2;
	pub const LOOP: u8 = 1 << 3;
	/// Configure must directly follow unpack for this package.
	pub const IMMEDIATE: u8 = 1 << 4;
	pub const UNPACKED: u8 = 1 << 5;
	pub const CONFIGURED: u8 = 1 << 6;
	pub const REMOVED: u8 = 1 << 7;
}

/// Most loops recorded before further ones are dropped.
const MAX_LOOPS: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DepMode {
	UnPackCrit,
	UnPackPreD,
	UnPackPre,
	UnPackDep,
	Configure,
	Remove,
}

/// Orders the changed packages for unpacking and configuration.
pub struct OrderList<'a> {
	cache: &'a Cache,
	depcache: &'a DepCache,
	flags: Vec<u8>,
	list: Vec<u32>,
	out: Vec<u32>,
	loops: Vec<(u32, u32)>,
	loop_count: i32,
	depth: u32,
	primary: Option<DepMode>,
	secondary: Option<DepMode>,
	rev_depends: Option<DepMode>,
	remove: Option<DepMode>,
}

impl<'a> OrderList<'a> {
	pub fn new(cache: &'a Cache) -> OrderList<'a> {
		OrderList {
			cache,
			depcache: cache.depcache(),
			flags: vec![0; cache.header().package_count as usize],
			list: Vec::new(),
			out: Vec::new(),
			loops: Vec::new(),
			loop_count: -1,
			depth: 0,
			primary: None,
			secondary: None,
			rev_depends: None,
			remove: None,
		}
	}

	pub fn push(&mut self, pkg_off: u32) { self.list.push(pkg_off); }

	pub fn list(&self) -> &[u32] { &self.list }

	pub fn loops(&self) -> &[(u32, u32)] { &self.loops }

	fn id(&self, pkg_off: u32) -> usize { self.cache.arena().get(pkg_off + pkg::ID) as usize }

	pub fn is_flag(&self, pkg_off: u32, bit: u8) -> bool {
		self.flags[self.id(pkg_off)] & bit != 0
	}

	pub fn flag(&mut self, pkg_off: u32, bit: u8) {
		let id = self.id(pkg_off);
		self.flags[id] |= bit;
	}

	fn flag_clear(&mut self, pkg_off: u32, mask: u8) {
		let id = self.id(pkg_off);
		self.flags[id] &= !mask;
	}

	fn wipe_flags(&mut self, mask: u8) {
		for f in &mut self.flags {
			*f &= !mask;
		}
	}

	fn is_delete(&self, pkg_off: u32) -> bool {
		let id = self.cache.arena().get(pkg_off + pkg::ID);
		self.depcache.state(id).mode == Mode::Delete
	}

	fn install_ver(&self, pkg_off: u32) -> u32 {
		let id = self.cache.arena().get(pkg_off + pkg::ID);
		self.depcache.state(id).install
	}

	/// The package needs no dpkg action at all.
	fn needs_nothing(&self, pkg_off: u32) -> bool {
		let a = self.cache.arena();
		let id = a.get(pkg_off + pkg::ID);
		let st = self.depcache.state(id);
		st.mode == Mode::Keep && a.get8(pkg_off + pkg::CURRENT_STATE) == 6
	}

	/// Score the package for the initial sort. Higher scores order
	/// earlier.
	fn score(&self, pkg_off: u32) -> i32 {
		let a = self.cache.arena();

		// Removal is always done first.
		if self.is_delete(pkg_off) {
			return 200;
		}

		let mut score = 0;
		if a.get(pkg_off + pkg::FLAGS) & flag::ESSENTIAL != 0 {
			score += 100;
		}

		let install = self.install_ver(pkg_off);
		if install != 0 {
			let mut d = a.get(install + ver::DEPENDS);
			while d != 0 {
				if a.get8(d + depend::DEP_TYPE) == dep::PRE_DEPENDS {
					score += 50;
					break;
				}
				d = a.get(d + depend::NEXT_DEP);
			}

			let prio_map = [0, 5, 4, 3, 1, 0];
			let priority = a.get8(install + ver::PRIORITY) as usize;
			if priority <= prio::EXTRA as usize {
				score += prio_map[priority];
			}
		}
		score
	}

	fn initial_sort(&mut self) {
		let mut keyed: Vec<(bool, i32, String, u32)> = self
			.list
			.iter()
			.map(|&off| {
				let a = self.cache.arena();
				let name = a.str_at(a.get(off + pkg::NAME)).to_string();
				(self.needs_nothing(off), -self.score(off), name, off)
			})
			.collect();
		keyed.sort();
		self.list = keyed.into_iter().map(|(_, _, _, off)| off).collect();
	}

	/// Performs predepends and immediate configuration ordering only.
	/// This is termed critical unpacking ordering; any loops that form
	/// are fatal and indicate that the packages cannot be installed.
	pub fn order_critical(&mut self) -> Result<(), Error> {
		self.primary = Some(DepMode::UnPackPre);
		self.secondary = None;
		self.rev_depends = None;
		self.remove = None;
		self.loop_count = 0;
		self.loops.clear();

		self.initial_sort();
		self.do_run();

		if !self.loops.is_empty() {
			return Err(Error::FatalOrdering {
				msg: "predepends looping detected".to_string(),
			});
		}
		Ok(())
	}

	/// Performs complete unpacking ordering, creating an order suitable
	/// for unpacking.
	pub fn order_unpack(&mut self) -> Result<(), Error> {
		self.initial_sort();

		self.primary = Some(DepMode::UnPackCrit);
		self.secondary = Some(DepMode::Configure);
		self.rev_depends = Some(DepMode::UnPackDep);
		self.remove = Some(DepMode::Remove);
		self.loop_count = -1;
		self.do_run();

		self.secondary = None;
		self.do_run();

		self.loop_count = 0;
		self.rev_depends = None;
		self.remove = None; // Otherwise the libreadline remove problem occurs
		self.do_run();

		// The final pass considers only critical predepends; a loop here
		// cannot be recovered from.
		self.loop_count = 0;
		self.loops.clear();
		self.primary = Some(DepMode::UnPackPre);
		self.do_run();

		if !self.loops.is_empty() {
			return Err(Error::FatalOrdering {
				msg: "predepends looping detected".to_string(),
			});
		}
		Ok(())
	}

	/// Orders by depends only, producing an order suitable for
	/// configuration.
	pub fn order_configure(&mut self) {
		self.primary = Some(DepMode::Configure);
		self.secondary = None;
		self.rev_depends = None;
		self.remove = None;
		self.loop_count = -1;
		self.do_run();
	}

	/// One ordering run: rebuild the list through the coloured DFS.
	fn do_run(&mut self) {
		self.depth = 0;
		self.wipe_flags(oflag::ADDED | oflag::ADD_PENDING | oflag::LOOP | oflag::IN_LIST);

		let input = self.list.clone();
		for &p in &input {
			self.flag(p, oflag::IN_LIST);
		}

		self.out = Vec::with_capacity(input.len());
		for &p in &input {
			self.visit_node(p);
		}
		self.list = std::mem::take(&mut self.out);
	}

	/// The core ordering routine. Calls the configured dependency
	/// consideration functions, which potentially call this again.
	/// Finite depth is achieved through the colouring.
	fn visit_node(&mut self, pkg_off: u32) {
		// Looping or irrelevant.
		if pkg_off == 0
			|| self.is_flag(pkg_off, oflag::ADDED)
			|| self.is_flag(pkg_off, oflag::ADD_PENDING)
			|| !self.is_flag(pkg_off, oflag::IN_LIST)
		{
			return;
		}

		self.depth += 1;

		// Colour grey.
		self.flag(pkg_off, oflag::ADD_PENDING);

		let old = self.primary;
		// Immediate configuration means this package must be
		// configurable straight after its unpack.
		if self.is_flag(pkg_off, oflag::IMMEDIATE) && self.primary != Some(DepMode::UnPackPre) {
			self.primary = Some(DepMode::UnPackPreD);
		}

		let a = self.cache.arena();
		let current = a.get(pkg_off + pkg::CURRENT_VER);
		let install = self.install_ver(pkg_off);

		if !self.is_delete(pkg_off) {
			self.visit_deps(self.primary, pkg_off);
			self.visit_rdeps(self.primary, pkg_off);
			self.visit_rprovides(self.primary, current);
			self.visit_rprovides(self.primary, install);

			self.visit_rdeps(self.rev_depends, pkg_off);
			self.visit_rprovides(self.rev_depends, current);
			self.visit_rprovides(self.rev_depends, install);

			self.visit_deps(self.secondary, pkg_off);
			self.visit_rdeps(self.secondary, pkg_off);
			self.visit_rprovides(self.secondary, current);
			self.visit_rprovides(self.secondary, install);
		} else {
			self.visit_rdeps(self.remove, pkg_off);
			self.visit_rprovides(self.remove, current);
		}

		if !self.is_flag(pkg_off, oflag::ADDED) {
			self.flag_clear(pkg_off, oflag::ADD_PENDING);
			self.flag(pkg_off, oflag::ADDED);
			self.out.push(pkg_off);
		}

		self.primary = old;
		self.depth -= 1;
	}

	/// Forward install dependencies of the package.
	fn visit_deps(&mut self, mode: Option<DepMode>, pkg_off: u32) {
		let Some(mode) = mode else { return };
		let install = self.install_ver(pkg_off);
		if install == 0 {
			return;
		}
		let first = self.cache.arena().get(install + ver::DEPENDS);
		self.dispatch(mode, first, false);
	}

	/// Reverse dependencies of the package.
	fn visit_rdeps(&mut self, mode: Option<DepMode>, pkg_off: u32) {
		let Some(mode) = mode else { return };
		let first = self.cache.arena().get(pkg_off + pkg::REV_DEPENDS);
		self.dispatch(mode, first, true);
	}

	/// Reverse dependencies through the provides of a version.
	fn visit_rprovides(&mut self, mode: Option<DepMode>, ver_off: u32) {
		let Some(mode) = mode else { return };
		if ver_off == 0 {
			return;
		}
		let a = self.cache.arena();
		let mut p = a.get(ver_off + ver::PROVIDES);
		while p != 0 {
			let provided = a.get(p + prv::TARGET_PKG);
			let first = a.get(provided + pkg::REV_DEPENDS);
			self.dispatch(mode, first, true);
			p = a.get(p + prv::NEXT_PRV_VER);
		}
	}

	fn dispatch(&mut self, mode: DepMode, first: u32, reverse: bool) {
		match mode {
			DepMode::UnPackCrit => self.dep_unpack_crit(first, reverse),
			DepMode::UnPackPreD => self.dep_unpack_pre_d(first, reverse),
			DepMode::UnPackPre => self.dep_unpack_pre(first, reverse),
			DepMode::UnPackDep => self.dep_unpack_dep(first, reverse),
			DepMode::Configure => self.dep_configure(first, reverse),
			DepMode::Remove => self.dep_remove(first, reverse),
		}
	}

	fn chain(&self, off: u32, reverse: bool) -> u32 {
		let field = if reverse { depend::NEXT_REV } else { depend::NEXT_DEP };
		self.cache.arena().get(off + field)
	}

	/// Visit on all providing packages of the dependency.
	fn visit_provides(&mut self, dep_off: u32) {
		let a = self.cache.arena();
		let negative = dep::is_negative(a.get8(dep_off + depend::DEP_TYPE));

		for target in self.cache.dep_targets(dep_off) {
			let target_pkg = a.get(target + ver::PARENT_PKG);
			let id = a.get(target_pkg + pkg::ID);
			let st = self.depcache.state(id);

			if st.mode == Mode::Keep {
				continue;
			}
			if !negative && st.install != target {
				continue;
			}
			if negative && a.get(target_pkg + pkg::CURRENT_VER) != target {
				continue;
			}
			self.visit_node(target_pkg);
		}
	}

	/// A complete analysis of the dependency against the current add
	/// list. True if, after all ordered events are performed, the
	/// dependency still holds.
	fn check_dep(&self, dep_off: u32, reverse: bool) -> bool {
		let a = self.cache.arena();
		let negative = dep::is_negative(a.get8(dep_off + depend::DEP_TYPE));

		for target in self.cache.dep_targets(dep_off) {
			let target_pkg = a.get(target + ver::PARENT_PKG);

			/* Added means the package will be unpacked before this one,
			   AddPending after. Pending is therefore ignored except for
			   reverse loops, which must not count as present. */
			let added = self.is_flag(target_pkg, oflag::ADDED);
			let pending = self.is_flag(target_pkg, oflag::ADD_PENDING);
			if added || (pending && reverse) {
				if self.install_ver(target_pkg) != target {
					continue;
				}
			} else if a.get(target_pkg + pkg::CURRENT_VER) != target
				|| !self.needs_nothing(target_pkg)
			{
				continue;
			}

			// Conflicts requires that all versions are not present,
			// depends just needs one.
			return !negative;
		}
		negative
	}

	/// Record a loop edge and mark both ends.
	fn add_loop(&mut self, parent_pkg: u32, target_pkg: u32) {
		if self.loop_count < 0 || self.loop_count as usize >= MAX_LOOPS {
			return;
		}

		// Skip duplicates of the edge we just recorded.
		if let Some(&(last_parent, last_target)) = self.loops.last() {
			if last_parent == parent_pkg || last_target == parent_pkg {
				return;
			}
		}

		trace!("ordering loop detected");
		self.loop_count += 1;
		self.loops.push((parent_pkg, target_pkg));
		self.flag(parent_pkg, oflag::LOOP);
		self.flag(target_pkg, oflag::LOOP);
	}

	fn dep_parent_pkg(&self, dep_off: u32) -> u32 {
		let a = self.cache.arena();
		a.get(a.get(dep_off + depend::PARENT_VER) + ver::PARENT_PKG)
	}

	/// Critical unpacking ordering: satisfy Conflicts and PreDepends
	/// only. On a predepends the primary is temporarily switched to
	/// [`DepMode::UnPackPreD`]. Loops are preprocessed and logged.
	fn dep_unpack_crit(&mut self, first: u32, reverse: bool) {
		let a = self.cache.arena();
		let mut d = first;
		while d != 0 {
			let next = self.chain(d, reverse);
			let dep_type = a.get8(d + depend::DEP_TYPE);

			if reverse {
				/* Reverse dependencies are only interested in conflicts,
				   predepend breakage is ignored here. */
				if !dep::is_negative(dep_type) {
					d = next;
					continue;
				}
				let parent_pkg = self.dep_parent_pkg(d);
				let parent_ver = a.get(d + depend::PARENT_VER);
				// Duplication elimination, consider only the current
				// version.
				if a.get(parent_pkg + pkg::CURRENT_VER) != parent_ver {
					d = next;
					continue;
				}
				if self.check_dep(d, true) {
					d = next;
					continue;
				}
				self.visit_node(parent_pkg);
			} else {
				// Forward critical dependencies MUST be correct before
				// the package can be unpacked.
				if !dep::is_negative(dep_type) && dep_type != dep::PRE_DEPENDS {
					d = next;
					continue;
				}

				let target_pkg = a.get(d + depend::TARGET_PKG);
				if self.check_dep(d, false) {
					/* Catch predepends loops with the code below;
					   conflicts loops that are dep okay are ignored. */
					if !self.is_flag(target_pkg, oflag::ADD_PENDING)
						|| dep_type != dep::PRE_DEPENDS
					{
						d = next;
						continue;
					}
				}

				// This is the loop detection.
				if self.is_flag(target_pkg, oflag::ADDED)
					|| self.is_flag(target_pkg, oflag::ADD_PENDING)
				{
					if self.is_flag(target_pkg, oflag::ADD_PENDING) {
						self.add_loop(self.dep_parent_pkg(d), target_pkg);
					}
					d = next;
					continue;
				}

				/* Predepends require a special ordering stage: all of
				   their dependents must be installed as well. */
				let old = self.primary;
				if dep_type == dep::PRE_DEPENDS {
					self.primary = Some(DepMode::UnPackPreD);
				}
				self.visit_provides(d);
				self.primary = old;
			}
			d = next;
		}
	}

	/// Critical unpacking with depends: ensures not only that conflicts
	/// and predepends are met but that this package will be immediately
	/// configurable when it is unpacked.
	fn dep_unpack_pre_d(&mut self, first: u32, reverse: bool) {
		if reverse {
			return self.dep_unpack_crit(first, true);
		}

		let a = self.cache.arena();
		let mut d = first;
		while d != 0 {
			let next = self.chain(d, false);
			let dep_type = a.get8(d + depend::DEP_TYPE);

			if !dep::is_critical(dep_type) {
				d = next;
				continue;
			}

			let target_pkg = a.get(d + depend::TARGET_PKG);
			if self.check_dep(d, false) {
				if !self.is_flag(target_pkg, oflag::ADD_PENDING)
					|| dep_type != dep::PRE_DEPENDS
				{
					d = next;
					continue;
				}
			}

			if self.is_flag(target_pkg, oflag::ADDED)
				|| self.is_flag(target_pkg, oflag::ADD_PENDING)
			{
				if self.is_flag(target_pkg, oflag::ADD_PENDING) {
					self.add_loop(self.dep_parent_pkg(d), target_pkg);
				}
				d = next;
				continue;
			}

			self.visit_provides(d);
			d = next;
		}
	}

	/// Critical predepends ordering. All loops here are fatal.
	fn dep_unpack_pre(&mut self, first: u32, reverse: bool) {
		if reverse {
			return;
		}

		let a = self.cache.arena();
		let mut d = first;
		while d != 0 {
			let next = self.chain(d, false);
			let dep_type = a.get8(d + depend::DEP_TYPE);

			/* Only consider PreDepends or Depends; Depends are only
			   considered at the lowest depth or in the case of immediate
			   configure. */
			if dep_type != dep::PRE_DEPENDS {
				if dep_type == dep::DEPENDS {
					if self.depth == 1 && !self.is_flag(self.dep_parent_pkg(d), oflag::IMMEDIATE)
					{
						d = next;
						continue;
					}
				} else {
					d = next;
					continue;
				}
			}

			let target_pkg = a.get(d + depend::TARGET_PKG);
			if self.check_dep(d, false) && !self.is_flag(target_pkg, oflag::ADD_PENDING) {
				d = next;
				continue;
			}

			if self.is_flag(target_pkg, oflag::ADDED)
				|| self.is_flag(target_pkg, oflag::ADD_PENDING)
			{
				if self.is_flag(target_pkg, oflag::ADD_PENDING) {
					self.add_loop(self.dep_parent_pkg(d), target_pkg);
				}
				d = next;
				continue;
			}

			self.visit_provides(d);
			d = next;
		}
	}

	/// Reverse dependency considerations: if unpacking this package
	/// would break an existing dependency, the dependent is ordered
	/// before this one so it reaches the unpacked state first. The
	/// forward walk pulls dependents close to the package to reduce
	/// deconfigure time.
	fn dep_unpack_dep(&mut self, first: u32, reverse: bool) {
		let a = self.cache.arena();
		let mut d = first;
		while d != 0 {
			let next = self.chain(d, reverse);
			let dep_type = a.get8(d + depend::DEP_TYPE);

			if dep::is_critical(dep_type) {
				if reverse {
					let parent_pkg = self.dep_parent_pkg(d);
					let parent_ver = a.get(d + depend::PARENT_VER);
					/* Duplication prevention: consider rev deps only on
					   the current version, a not installed package
					   cannot break. */
					if a.get(parent_pkg + pkg::CURRENT_VER) == 0
						|| a.get(parent_pkg + pkg::CURRENT_VER) != parent_ver
					{
						d = next;
						continue;
					}
					// The dep will not break, so it is irrelevant.
					if self.check_dep(d, true) {
						d = next;
						continue;
					}
					self.visit_node(parent_pkg);
				} else if dep_type == dep::DEPENDS {
					self.visit_provides(d);
				}
			}
			d = next;
		}
	}

	/// Configuration ordering by the Depends line only. Loops are
	/// ignored, depends loop entry points are chaotic.
	fn dep_configure(&mut self, first: u32, reverse: bool) {
		// Never consider reverse configuration dependencies.
		if reverse {
			return;
		}
		let a = self.cache.arena();
		let mut d = first;
		while d != 0 {
			let next = self.chain(d, false);
			if a.get8(d + depend::DEP_TYPE) == dep::DEPENDS {
				self.visit_provides(d);
			}
			d = next;
		}
	}

	/// Removal ordering visits all reverse depends to see if removing
	/// this package is okay with them in the now state.
	fn dep_remove(&mut self, first: u32, reverse: bool) {
		if !reverse {
			return;
		}
		let a = self.cache.arena();
		let mut d = first;
		while d != 0 {
			let next = self.chain(d, true);
			let dep_type = a.get8(d + depend::DEP_TYPE);

			if dep_type == dep::DEPENDS || dep_type == dep::PRE_DEPENDS {
				let parent_pkg = self.dep_parent_pkg(d);
				let parent_ver = a.get(d + depend::PARENT_VER);
				// Duplication elimination, consider the current version
				// only.
				if a.get(parent_pkg + pkg::CURRENT_VER) != parent_ver {
					d = next;
					continue;
				}

				/* See if the dep on the parent package is okay in the
				   removed (install) state of the target pkg. */
				if self.check_dep(d, true) && !self.is_flag(parent_pkg, oflag::ADD_PENDING) {
					d = next;
					continue;
				}

				if self.is_flag(parent_pkg, oflag::ADDED)
					|| self.is_flag(parent_pkg, oflag::ADD_PENDING)
				{
					if self.is_flag(parent_pkg, oflag::ADD_PENDING) {
						self.add_loop(parent_pkg, a.get(d + depend::TARGET_PKG));
					}
					d = next;
					continue;
				}

				self.visit_node(parent_pkg);
			}
			d = next;
		}
	}
}

impl std::fmt::Debug for OrderList<'_> {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		let a = self.cache.arena();
		let names: Vec<&str> = self
			.list
			.iter()
			.map(|&off| a.str_at(a.get(off + pkg::NAME)))
			.collect();
		f.debug_struct("OrderList")
			.field("list", &names)
			.field("loops", &self.loops.len())
			.finish()
	}
}
