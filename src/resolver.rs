//! Contains dependency resolution related structs.
//!
//! This is the classic greedy resolver: score every package, then walk
//! the broken ones from important to expendable, either pulling in what
//! they need or demoting whatever got them into trouble. It terminates
//! when a fixpoint is reached or brokenness stops improving.

use std::cell::RefCell;

use tracing::debug;

use crate::cache::Cache;
use crate::error::{AptErrors, Error};
use crate::raw::{dep, depend, flag, pkg, prio, ver};
use crate::Package;

/// Passes over the broken set before giving up.
const MAX_PASSES: u32 = 10;

/// Score bonuses, larger means harder to disturb.
const SCORE_ESSENTIAL: i32 = 5000;
const SCORE_PROTECTED: i32 = 10000;
const SCORE_INSTALLED: i32 = 1;

pub struct ProblemResolver {
	scores: RefCell<Vec<i32>>,
}

impl Default for ProblemResolver {
	fn default() -> Self { Self::new() }
}

impl ProblemResolver {
	pub fn new() -> ProblemResolver {
		ProblemResolver {
			scores: RefCell::new(Vec::new()),
		}
	}

	/// Protect a package's state from the resolver's meddling.
	pub fn protect(&self, pkg: &Package) { pkg.cache.depcache().mark_protected(pkg.id()); }

	fn priority_score(priority: u8) -> i32 {
		match priority {
			prio::REQUIRED => 100,
			prio::IMPORTANT => 90,
			prio::STANDARD => 80,
			prio::OPTIONAL => 20,
			prio::EXTRA => 10,
			_ => 0,
		}
	}

	fn make_scores(&self, cache: &Cache) {
		let a = cache.arena();
		let depcache = cache.depcache();
		let mut scores = vec![0i32; cache.header().package_count as usize];

		for off in cache.pkg_offsets() {
			let id = a.get(off + pkg::ID) as usize;
			let mut score = 0;

			let install = depcache.install_ver_of(cache, off);
			if install != 0 {
				score += Self::priority_score(a.get8(install + ver::PRIORITY));
			}
			if a.get(off + pkg::FLAGS) & (flag::ESSENTIAL | flag::IMPORTANT) != 0 {
				score += SCORE_ESSENTIAL;
			}
			if depcache.is_protected_id(a.get(off + pkg::ID)) {
				score += SCORE_PROTECTED;
			}
			if a.get(off + pkg::CURRENT_VER) != 0 {
				score += SCORE_INSTALLED;
			}

			// Every critical reverse dependency makes a package a little
			// more important.
			let mut rd = a.get(off + pkg::REV_DEPENDS);
			while rd != 0 {
				if dep::is_critical(a.get8(rd + depend::DEP_TYPE)) {
					score += 1;
				}
				rd = a.get(rd + depend::NEXT_REV);
			}

			scores[id] = score;
		}

		*self.scores.borrow_mut() = scores;
	}

	fn broken_sorted(&self, cache: &Cache) -> Vec<u32> {
		let depcache = cache.depcache();
		let scores = self.scores.borrow();
		let a = cache.arena();

		let mut broken: Vec<u32> = cache
			.pkg_offsets()
			.into_iter()
			.filter(|&off| {
				let p = Package::new(cache, off);
				!depcache.marked_delete(&p) && depcache.is_inst_broken(&p)
			})
			.collect();

		broken.sort_by_key(|&off| {
			let id = a.get(off + pkg::ID) as usize;
			-scores.get(id).copied().unwrap_or(0)
		});
		broken
	}

	fn is_held(cache: &Cache, pkg_off: u32) -> bool {
		cache.arena().get8(pkg_off + pkg::SELECTED_STATE) == 2
			&& !cache
				.config()
				.bool("APT::Get::allow-change-held-packages", false)
	}

	/// Describe the first unsatisfied critical group of a package, for
	/// the infeasibility witness.
	fn witness(cache: &Cache, pkg_off: u32) -> String {
		let pkg_view = Package::new(cache, pkg_off);
		let depcache = cache.depcache();
		let a = cache.arena();
		let install = depcache.install_ver_of(cache, pkg_off);
		if install == 0 {
			return pkg_view.fullname(true);
		}

		let mut off = a.get(install + ver::DEPENDS);
		while off != 0 {
			let dep_type = a.get8(off + depend::DEP_TYPE);
			let (ok, next) = depcache.with_states(|states| {
				crate::depcache::DepCache::group_satisfied(
					cache,
					states,
					off,
					crate::depcache::World::Install,
				)
			});
			if dep::is_critical(dep_type) && !ok {
				let mut alts = Vec::new();
				let mut cur = off;
				while cur != 0 && cur != next {
					let target = a.get(cur + depend::TARGET_PKG);
					let tname = a.str_at(a.get(target + pkg::NAME));
					let tver = a.str_at(a.get(cur + depend::TARGET_VER));
					if tver.is_empty() {
						alts.push(tname.to_string());
					} else {
						alts.push(format!("{tname} ({tver})"));
					}
					cur = a.get(cur + depend::NEXT_DEP);
				}
				return format!(
					"{}: {}: {}",
					pkg_view.fullname(true),
					crate::DepType::from(dep_type),
					alts.join(" | ")
				);
			}
			off = next;
		}
		pkg_view.fullname(true)
	}

	/// Try to complete one broken package by installing an alternative
	/// from each unsatisfied critical group.
	fn try_fix(&self, cache: &Cache, pkg_off: u32) -> bool {
		let a = cache.arena();
		let depcache = cache.depcache();
		let install = depcache.install_ver_of(cache, pkg_off);
		if install == 0 {
			return true;
		}

		let mut fixed_all = true;
		let mut off = a.get(install + ver::DEPENDS);
		while off != 0 {
			let dep_type = a.get8(off + depend::DEP_TYPE);
			let (ok, next) = depcache.with_states(|states| {
				crate::depcache::DepCache::group_satisfied(
					cache,
					states,
					off,
					crate::depcache::World::Install,
				)
			});

			if dep::is_critical(dep_type) && !ok {
				if dep::is_negative(dep_type) {
					fixed_all &= self.fix_conflict(cache, off, pkg_off);
				} else {
					fixed_all &= self.fix_depends(cache, off, next);
				}
			}
			off = next;
		}
		fixed_all
	}

	/// Satisfy a positive group by marking the best scoring alternative.
	fn fix_depends(&self, cache: &Cache, group_start: u32, group_end: u32) -> bool {
		let a = cache.arena();
		let depcache = cache.depcache();

		let mut cur = group_start;
		while cur != 0 && cur != group_end {
			for target in cache.dep_targets(cur) {
				let parent = a.get(target + ver::PARENT_PKG);
				let st = depcache.state(a.get(parent + pkg::ID));

				if st.candidate != target || st.mode == crate::depcache::Mode::Delete {
					continue;
				}
				if Self::is_held(cache, parent) {
					continue;
				}

				let p = Package::new(cache, parent);
				debug!("resolver installing {} to fix a dependency", p.name());
				if depcache.mark_install(&p, true, false) {
					return true;
				}
			}
			cur = a.get(cur + depend::NEXT_DEP);
		}
		false
	}

	/// Clear a conflict by demoting the lower scoring side.
	fn fix_conflict(&self, cache: &Cache, dep_off: u32, parent_pkg: u32) -> bool {
		let a = cache.arena();
		let depcache = cache.depcache();
		let scores = self.scores.borrow();
		let parent_id = a.get(parent_pkg + pkg::ID) as usize;

		for target in cache.dep_targets(dep_off) {
			let other = a.get(target + ver::PARENT_PKG);
			let other_id = a.get(other + pkg::ID) as usize;
			let st = depcache.state(a.get(other + pkg::ID));
			if st.install != target {
				continue;
			}

			let other_view = Package::new(cache, other);
			let parent_view = Package::new(cache, parent_pkg);

			// Prefer to disturb the side that matters less.
			let other_score = scores.get(other_id).copied().unwrap_or(0);
			let parent_score = scores.get(parent_id).copied().unwrap_or(0);
			let demote_other =
				other_score <= parent_score && !depcache.is_protected_id(other_view.id());

			if demote_other && !Self::is_held(cache, other) {
				if other_view.is_installed() {
					debug!("resolver removing {} over a conflict", other_view.name());
					if depcache.mark_delete(&other_view, false) {
						return true;
					}
				} else {
					debug!("resolver keeping back {} over a conflict", other_view.name());
					if depcache.mark_keep(&other_view) {
						return true;
					}
				}
			}

			if !depcache.is_protected_id(parent_view.id()) && !Self::is_held(cache, parent_pkg)
			{
				debug!("resolver keeping back {} over a conflict", parent_view.name());
				if depcache.mark_keep(&parent_view) {
					return true;
				}
			}
		}
		false
	}

	/// Resolve brokenness by promoting installs and demoting offenders.
	///
	/// If `fix_broken` is set the resolver also repairs already installed
	/// packages whose dependencies are currently broken.
	pub fn resolve(&self, cache: &Cache, fix_broken: bool) -> Result<(), AptErrors> {
		let depcache = cache.depcache();
		depcache.ensure_closed().map_err(AptErrors::from)?;
		self.make_scores(cache);

		if fix_broken {
			let _group = depcache.action_group(cache);
			for off in cache.pkg_offsets() {
				let p = Package::new(cache, off);
				if p.is_installed() && depcache.is_now_broken(&p) {
					depcache.mark_install(&p, true, false);
				}
			}
		}

		for pass in 0..MAX_PASSES {
			let broken = self.broken_sorted(cache);
			if broken.is_empty() {
				return Ok(());
			}
			debug!("resolver pass {pass}: {} broken", broken.len());

			let before = broken.len();
			{
				let _group = depcache.action_group(cache);
				for off in &broken {
					self.try_fix(cache, *off);
				}
			}

			// Demote whatever is still broken; protected and held
			// packages are where we stop.
			let still = self.broken_sorted(cache);
			if still.len() >= before && pass > 0 {
				let _group = depcache.action_group(cache);
				for &off in still.iter().rev() {
					let p = Package::new(cache, off);
					if depcache.is_protected_id(p.id()) {
						return Err(AptErrors::from(Error::Unsatisfiable {
							witness: Self::witness(cache, off),
						}));
					}
					if Self::is_held(cache, off) {
						return Err(AptErrors::from(Error::Held {
							pkg: p.fullname(true),
						}));
					}
					depcache.mark_keep(&p);
				}
			}
		}

		let remaining = self.broken_sorted(cache);
		if remaining.is_empty() {
			return Ok(());
		}
		Err(AptErrors::from(Error::Unsatisfiable {
			witness: Self::witness(cache, remaining[0]),
		}))
	}

	/// Resolve brokenness only by holding packages back.
	pub fn resolve_by_keep(&self, cache: &Cache) -> Result<(), AptErrors> {
		let depcache = cache.depcache();
		depcache.ensure_closed().map_err(AptErrors::from)?;
		self.make_scores(cache);

		for _pass in 0..MAX_PASSES {
			let broken = self.broken_sorted(cache);
			if broken.is_empty() {
				return Ok(());
			}

			let _group = depcache.action_group(cache);
			// The least important packages give way first.
			for &off in broken.iter().rev() {
				let p = Package::new(cache, off);
				if depcache.is_protected_id(p.id()) {
					continue;
				}
				debug!("keeping back {}", p.name());
				depcache.mark_keep(&p);
			}
		}

		let remaining = self.broken_sorted(cache);
		if remaining.is_empty() {
			return Ok(());
		}
		Err(AptErrors::from(Error::Unsatisfiable {
			witness: Self::witness(cache, remaining[0]),
		}))
	}
}

impl std::fmt::Debug for ProblemResolver {
	fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
		write!(f, "ProblemResolver {{ scores: {} }}", self.scores.borrow().len())
	}
}
