//! The backtracking dependency solver.
//!
//! A brute force solver with heuristics and conflict learning. Package
//! and version decisions are `None`, `Must` or `MustNot` at a given
//! decision depth; unresolved positive dependencies sit in a prioritised
//! work queue, and failed choices unwind the decision stack. Rejects
//! caused by an earlier decision are recorded at the depth of that
//! decision, so unwinding past it clears them as well.

use tracing::{debug, trace};

use crate::cache::Cache;
use crate::depcache::Mode;
use crate::error::Error;
use crate::raw::{dep, depend, pkg, ver};
use crate::util::check_dep;

/// Hard ceiling on main loop iterations, far above anything a real
/// dependency graph produces.
const MAX_STEPS: u64 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Decision {
	#[default]
	None,
	Must,
	MustNot,
}

/// Why a state was entered: the package or version that forced it.
/// Empty means the solver's own seeding did.
#[derive(Debug, Clone, Copy, Default)]
struct Reason {
	is_version: bool,
	off: u32,
}

impl Reason {
	fn ver(off: u32) -> Reason {
		Reason {
			is_version: true,
			off,
		}
	}

	fn empty() -> Reason { Reason::default() }
}

/// Groups of work, ordered. Later groups are handled later; optional
/// entries in them may be skipped entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Group {
	HoldOrDelete,
	NewUnsatRecommends,
	SatisfyNew,
	Satisfy,
	SatisfyObsolete,
	UpgradeManual,
	InstallManual,
	ObsoleteManual,
	UpgradeAuto,
	KeepAuto,
	ObsoleteAuto,
}

#[derive(Debug, Clone, Copy, Default)]
struct State {
	decision: Decision,
	depth: u32,
	reason: Reason,
}

/// A positive dependency that still needs to be resolved.
#[derive(Debug, Clone)]
struct Work {
	reason: Reason,
	depth: u32,
	group: Group,
	/// Possible solutions, in order of preference.
	solutions: Vec<u32>,
	/// The choice taken, once this work became a choice point.
	choice: u32,
	optional: bool,
}

impl Work {
	/// Sort key; the smallest is handled first. Works are ordered by
	/// group, then depth, then by how many solutions remain, with
	/// optional items after required ones.
	fn key(&self) -> (Group, u32, usize, bool) {
		(self.group, self.depth, self.solutions.len(), self.optional)
	}
}

/// The backtracking solver over a cache and its decisions.
pub struct Solver<'a> {
	cache: &'a Cache,
	pkgs_by_id: Vec<u32>,
	pkg_states: Vec<State>,
	ver_states: Vec<State>,
	work: Vec<Work>,
	needs_rescore: bool,
	choices: Vec<Work>,
	solved: Vec<Work>,
	allow_remove: bool,
	strict_pinning: bool,
	install_recommends: bool,
}

impl<'a> Solver<'a> {
	pub fn new(cache: &'a Cache) -> Solver<'a> {
		let header = cache.header();
		Solver {
			cache,
			pkgs_by_id: cache.pkgs_by_id(),
			pkg_states: vec![State::default(); header.package_count as usize],
			ver_states: vec![State::default(); header.version_count as usize],
			work: Vec::new(),
			needs_rescore: false,
			choices: Vec::new(),
			solved: Vec::new(),
			allow_remove: cache.config().bool("APT::Solver::Remove", true),
			strict_pinning: cache.config().bool("APT::Solver::Strict-Pinning", true),
			install_recommends: cache.config().bool("APT::Install-Recommends", true),
		}
	}

	fn depth(&self) -> u32 { self.choices.len() as u32 }

	fn pkg_id(&self, pkg_off: u32) -> usize { self.cache.arena().get(pkg_off + pkg::ID) as usize }

	fn ver_id(&self, ver_off: u32) -> usize { self.cache.arena().get(ver_off + ver::ID) as usize }

	fn reason_depth(&self, reason: Reason) -> u32 {
		if reason.off == 0 {
			return self.depth();
		}
		let state = if reason.is_version {
			self.ver_states[self.ver_id(reason.off)]
		} else {
			self.pkg_states[self.pkg_id(reason.off)]
		};
		match state.decision {
			Decision::None => self.depth(),
			_ => state.depth,
		}
	}

	fn is_obsolete(&self, ver_off: u32) -> bool {
		let a = self.cache.arena();
		let parent = a.get(ver_off + ver::PARENT_PKG);
		if a.get(parent + pkg::CURRENT_VER) == ver_off {
			return false;
		}
		!crate::Version::new(ver_off, self.cache).is_downloadable()
	}

	fn is_allowed(&self, ver_off: u32) -> bool {
		if !self.strict_pinning {
			return true;
		}
		self.cache.policy().is_allowed_version(self.cache, ver_off)
	}

	/// Order solution candidates: current version first, then the policy
	/// candidate, then anything still downloadable, then alphabetical on
	/// package and the position of the architecture in the configured
	/// architecture list.
	fn compare_providers(&self, solutions: &mut [u32]) {
		let cache = self.cache;
		let a = cache.arena();
		let archs = cache.config().architectures();
		solutions.sort_by_key(|&v| {
			let parent = a.get(v + ver::PARENT_PKG);
			let parent_id = a.get(parent + pkg::ID);
			let installed = a.get(parent + pkg::CURRENT_VER) == v;
			let candidate = cache.depcache().state(parent_id).candidate == v;
			let obsolete = self.is_obsolete(v);
			let name = a.str_at(a.get(parent + pkg::NAME)).to_string();
			let arch = a.str_at(a.get(parent + pkg::ARCH));
			let arch_rank = archs
				.iter()
				.position(|configured| configured.as_str() == arch)
				.unwrap_or(usize::MAX);
			(!installed, !candidate, obsolete, name, arch_rank)
		});
	}

	fn add_work(&mut self, work: Work) {
		trace!("queueing work ({:?}, {} solutions)", work.group, work.solutions.len());
		self.work.push(work);
		self.needs_rescore = true;
	}

	fn rescore_if_needed(&mut self) {
		if !self.needs_rescore {
			return;
		}
		// Smallest key last so pop() hands out the best work.
		self.work.sort_by(|x, y| y.key().cmp(&x.key()));
		self.needs_rescore = false;
	}

	/// Mark a version as to be installed. Propagates: the parent package
	/// becomes Must, sibling versions and reverse conflicts become
	/// MustNot, and the version's dependencies are queued.
	fn install_ver(&mut self, ver_off: u32, reason: Reason, group: Group) -> bool {
		let a = self.cache.arena();
		let vid = self.ver_id(ver_off);
		match self.ver_states[vid].decision {
			Decision::Must => return true,
			Decision::MustNot => return false,
			Decision::None => {},
		}

		let depth = self.depth();
		self.ver_states[vid] = State {
			decision: Decision::Must,
			depth,
			reason,
		};

		let parent = a.get(ver_off + ver::PARENT_PKG);
		let pid = self.pkg_id(parent);
		if self.pkg_states[pid].decision == Decision::MustNot {
			return false;
		}
		self.pkg_states[pid] = State {
			decision: Decision::Must,
			depth,
			reason: Reason::ver(ver_off),
		};

		// All other versions of the package are out.
		let mut sibling = a.get(parent + pkg::VERSIONS);
		while sibling != 0 {
			if sibling != ver_off && !self.reject_ver(sibling, Reason::ver(ver_off)) {
				return false;
			}
			sibling = a.get(sibling + ver::NEXT_VER);
		}

		if !self.reject_reverse_conflicts(ver_off, parent) {
			return false;
		}

		// Negative dependencies of the version knock their targets out;
		// positive groups become work.
		let mut dep_off = a.get(ver_off + ver::DEPENDS);
		while dep_off != 0 {
			let dep_type = a.get8(dep_off + depend::DEP_TYPE);
			let (group_end, members) = self.group_members(dep_off);

			if dep::is_negative(dep_type) {
				for member in &members {
					for target in self.cache.dep_targets(*member) {
						if !self.reject_ver(target, Reason::ver(ver_off)) {
							return false;
						}
					}
				}
			} else if dep_type == dep::DEPENDS || dep_type == dep::PRE_DEPENDS {
				if !self.enqueue_or_group(&members, Reason::ver(ver_off), group, false) {
					return false;
				}
			} else if dep_type == dep::RECOMMENDS && self.install_recommends {
				// Optional items may be skipped rather than forcing a
				// backtrack.
				if !self.enqueue_or_group(
					&members,
					Reason::ver(ver_off),
					Group::NewUnsatRecommends,
					true,
				) {
					return false;
				}
			}

			dep_off = group_end;
		}

		true
	}

	/// Collect the members of the or group starting at `dep_off` and the
	/// offset just past it.
	fn group_members(&self, dep_off: u32) -> (u32, Vec<u32>) {
		let a = self.cache.arena();
		let mut members = Vec::new();
		let mut off = dep_off;
		loop {
			members.push(off);
			let or = a.get8(off + depend::COMP_TYPE) & dep::OR != 0;
			off = a.get(off + depend::NEXT_DEP);
			if !or || off == 0 {
				break;
			}
		}
		(off, members)
	}

	fn enqueue_or_group(
		&mut self,
		members: &[u32],
		reason: Reason,
		parent_group: Group,
		optional: bool,
	) -> bool {
		let mut solutions = Vec::new();
		for &member in members {
			for target in self.cache.dep_targets(member) {
				if self.ver_states[self.ver_id(target)].decision == Decision::Must {
					// Already satisfied, nothing to queue.
					return true;
				}
				if self.is_allowed(target) && !solutions.contains(&target) {
					solutions.push(target);
				}
			}
		}

		self.compare_providers(&mut solutions);

		let a = self.cache.arena();
		let all_new = solutions.iter().all(|&v| {
			let parent = a.get(v + ver::PARENT_PKG);
			a.get(parent + pkg::CURRENT_VER) == 0
		});
		let any_obsolete = solutions.iter().any(|&v| self.is_obsolete(v));

		let group = if optional || matches!(parent_group, Group::HoldOrDelete) {
			parent_group
		} else if all_new && !solutions.is_empty() {
			Group::SatisfyNew
		} else if any_obsolete {
			Group::SatisfyObsolete
		} else {
			Group::Satisfy
		};

		self.add_work(Work {
			reason,
			depth: self.depth(),
			group,
			solutions,
			choice: 0,
			optional,
		});
		true
	}

	/// Versions whose negative dependencies hit the newly installed one
	/// cannot be installed any more.
	fn reject_reverse_conflicts(&mut self, ver_off: u32, parent: u32) -> bool {
		let a = self.cache.arena();
		let ver_str = a.str_at(a.get(ver_off + ver::VERSION)).to_string();

		let mut rd = a.get(parent + pkg::REV_DEPENDS);
		while rd != 0 {
			let dep_type = a.get8(rd + depend::DEP_TYPE);
			if dep::is_negative(dep_type) {
				let target_ver = a.str_at(a.get(rd + depend::TARGET_VER));
				let op = a.get8(rd + depend::COMP_TYPE);
				let applies = target_ver.is_empty() || check_dep(&ver_str, op, target_ver);

				let conflicting = a.get(rd + depend::PARENT_VER);
				let conflicting_pkg = a.get(conflicting + ver::PARENT_PKG);
				if applies
					&& conflicting_pkg != parent
					&& !self.reject_ver(conflicting, Reason::ver(ver_off))
				{
					return false;
				}
			}
			rd = a.get(rd + depend::NEXT_REV);
		}
		true
	}

	/// Mark a version as not installable.
	///
	/// The reject is recorded at the depth of its cause, so backtracking
	/// past the cause clears it too.
	fn reject_ver(&mut self, ver_off: u32, reason: Reason) -> bool {
		let vid = self.ver_id(ver_off);
		match self.ver_states[vid].decision {
			Decision::MustNot => return true,
			Decision::Must => return false,
			Decision::None => {},
		}

		self.ver_states[vid] = State {
			decision: Decision::MustNot,
			depth: self.reason_depth(reason),
			reason,
		};
		self.needs_rescore = true;

		// An installed package with every version rejected means removal.
		let a = self.cache.arena();
		let parent = a.get(ver_off + ver::PARENT_PKG);
		let pid = self.pkg_id(parent);
		if self.pkg_states[pid].decision == Decision::Must {
			let mut v = a.get(parent + pkg::VERSIONS);
			let mut any_left = false;
			while v != 0 {
				if self.ver_states[self.ver_id(v)].decision != Decision::MustNot {
					any_left = true;
					break;
				}
				v = a.get(v + ver::NEXT_VER);
			}
			if !any_left {
				return false;
			}
		}
		if a.get(parent + pkg::CURRENT_VER) != 0 && !self.allow_remove {
			let mut v = a.get(parent + pkg::VERSIONS);
			let mut any_left = false;
			while v != 0 {
				if self.ver_states[self.ver_id(v)].decision != Decision::MustNot {
					any_left = true;
					break;
				}
				v = a.get(v + ver::NEXT_VER);
			}
			if !any_left {
				return false;
			}
		}
		true
	}

	fn reject_pkg(&mut self, pkg_off: u32, reason: Reason) -> bool {
		let pid = self.pkg_id(pkg_off);
		match self.pkg_states[pid].decision {
			Decision::MustNot => return true,
			Decision::Must => return false,
			Decision::None => {},
		}
		self.pkg_states[pid] = State {
			decision: Decision::MustNot,
			depth: self.reason_depth(reason),
			reason,
		};

		let a = self.cache.arena();
		let mut v = a.get(pkg_off + pkg::VERSIONS);
		while v != 0 {
			if !self.reject_ver(v, reason) {
				return false;
			}
			v = a.get(v + ver::NEXT_VER);
		}
		true
	}

	/// Seed works and root decisions from the current marks.
	fn from_depcache(&mut self) {
		let cache = self.cache;
		let a = cache.arena();
		let depcache = cache.depcache();

		for &off in &self.pkgs_by_id.clone() {
			if off == 0 {
				continue;
			}
			let id = a.get(off + pkg::ID);
			let st = depcache.state(id);
			let current = a.get(off + pkg::CURRENT_VER);

			if st.mode == Mode::Delete {
				self.reject_pkg(off, Reason::empty());
				continue;
			}

			// A hold binds the package to its current version.
			if a.get8(off + pkg::SELECTED_STATE) == 2 && current != 0 {
				self.add_work(Work {
					reason: Reason::empty(),
					depth: 0,
					group: Group::HoldOrDelete,
					solutions: vec![current],
					choice: 0,
					optional: false,
				});
				continue;
			}

			let auto = depcache.is_auto_installed(&crate::Package::new(cache, off));

			if st.mode == Mode::Install && st.install != 0 && st.install != current {
				let group = if auto {
					Group::UpgradeAuto
				} else if current == 0 {
					Group::InstallManual
				} else {
					Group::UpgradeManual
				};
				self.add_work(Work {
					reason: Reason::empty(),
					depth: 0,
					group,
					solutions: vec![st.install],
					choice: 0,
					optional: false,
				});
				continue;
			}

			if current != 0 {
				// Keep the installed package at some version, preferring
				// an upgrade over staying put over obsolescence.
				let mut solutions = Vec::new();
				let mut v = a.get(off + pkg::VERSIONS);
				while v != 0 {
					if self.is_allowed(v) || v == current {
						solutions.push(v);
					}
					v = a.get(v + ver::NEXT_VER);
				}
				self.compare_providers(&mut solutions);

				let obsolete = self.is_obsolete(current) && st.candidate == 0;
				let group = match (auto, obsolete) {
					(true, true) => Group::ObsoleteAuto,
					(true, false) => Group::KeepAuto,
					(false, true) => Group::ObsoleteManual,
					(false, false) => Group::UpgradeManual,
				};

				self.add_work(Work {
					reason: Reason::empty(),
					depth: 0,
					group,
					solutions,
					choice: 0,
					optional: auto,
				});
			}
		}
	}

	/// Write the solution back into the DepCache.
	fn to_depcache(&mut self) {
		let cache = self.cache;
		let a = cache.arena();
		let depcache = cache.depcache();

		for &off in &self.pkgs_by_id {
			if off == 0 {
				continue;
			}
			let pid = self.pkg_id(off);
			let id = a.get(off + pkg::ID);
			let current = a.get(off + pkg::CURRENT_VER);

			match self.pkg_states[pid].decision {
				Decision::Must => {
					let mut chosen = 0;
					let mut v = a.get(off + pkg::VERSIONS);
					while v != 0 {
						if self.ver_states[self.ver_id(v)].decision == Decision::Must {
							chosen = v;
							break;
						}
						v = a.get(v + ver::NEXT_VER);
					}
					if chosen == 0 {
						continue;
					}
					depcache.set_state(id, |st| {
						if chosen == current {
							st.mode = Mode::Keep;
							st.install = current;
						} else {
							st.mode = Mode::Install;
							st.install = chosen;
						}
					});
				},
				Decision::MustNot | Decision::None => {
					if current != 0 {
						depcache.set_state(id, |st| {
							st.mode = Mode::Delete;
							st.install = 0;
						});
					}
				},
			}
		}
		depcache.refresh(cache);
	}

	/// Unwind one choice point; the failed alternative stays rejected at
	/// the new depth.
	fn pop_choice(&mut self) -> bool {
		let Some(mut choice_work) = self.choices.pop() else { return false };
		let level = self.depth();

		for state in self.pkg_states.iter_mut().chain(self.ver_states.iter_mut()) {
			if state.decision != Decision::None && state.depth > level {
				*state = State::default();
			}
		}

		// Solved work from deeper levels may be invalid again.
		let mut requeue = Vec::new();
		self.solved.retain(|w| {
			if w.depth > level {
				requeue.push(w.clone());
				false
			} else {
				true
			}
		});
		for w in requeue {
			self.add_work(w);
		}

		debug!("backtracking to depth {level}");

		// The tried choice failed here, drop it and requeue the rest.
		let failed = choice_work.choice;
		choice_work.solutions.retain(|&v| v != failed);
		self.reject_ver(failed, choice_work.reason);
		choice_work.depth = level;
		self.add_work(choice_work);
		self.needs_rescore = true;
		true
	}

	fn describe(&self, reason: Reason) -> String {
		let a = self.cache.arena();
		match (reason.off, reason.is_version) {
			(0, _) => "user request".to_string(),
			(off, true) => {
				let parent = a.get(off + ver::PARENT_PKG);
				format!(
					"{} {}",
					a.str_at(a.get(parent + pkg::NAME)),
					a.str_at(a.get(off + ver::VERSION))
				)
			},
			(off, false) => a.str_at(a.get(off + pkg::NAME)).to_string(),
		}
	}

	/// Human readable chain of forced decisions for diagnostics.
	pub(crate) fn why_str(&self, mut reason: Reason) -> String {
		let mut chain = Vec::new();
		let mut guard = 0;
		while reason.off != 0 && guard < 32 {
			chain.push(self.describe(reason));
			let state = if reason.is_version {
				self.ver_states[self.ver_id(reason.off)]
			} else {
				self.pkg_states[self.pkg_id(reason.off)]
			};
			reason = state.reason;
			guard += 1;
		}
		if chain.is_empty() {
			"user request".to_string()
		} else {
			chain.join(" <- ")
		}
	}

	/// Solve the dependencies.
	pub fn solve(&mut self) -> Result<(), Error> {
		self.cache.depcache().ensure_closed()?;
		self.from_depcache();

		let mut steps: u64 = 0;
		loop {
			steps += 1;
			if steps > MAX_STEPS {
				return Err(Error::InternalInvariant {
					msg: "solver exceeded its step budget".to_string(),
				});
			}

			self.rescore_if_needed();
			let Some(work) = self.work.pop() else { break };

			// Already satisfied?
			if work
				.solutions
				.iter()
				.any(|&v| self.ver_states[self.ver_id(v)].decision == Decision::Must)
			{
				self.solved.push(work);
				continue;
			}

			let viable: Vec<u32> = work
				.solutions
				.iter()
				.copied()
				.filter(|&v| self.ver_states[self.ver_id(v)].decision == Decision::None)
				.collect();

			if viable.is_empty() {
				if work.optional {
					self.solved.push(work);
					continue;
				}
				let witness = format!(
					"no installable candidate while satisfying {} (chain: {})",
					self.describe(work.reason),
					self.why_str(work.reason)
				);
				if !self.pop_choice() {
					return Err(Error::Unsatisfiable { witness });
				}
				continue;
			}

			let choice = viable[0];
			let mut work = work;
			work.choice = choice;
			let reason = work.reason;
			let group = work.group;
			let multiple = viable.len() > 1;

			if multiple {
				// A real decision, push a choice point first.
				self.choices.push(work);
			} else {
				self.solved.push(work);
			}

			if !self.install_ver(choice, reason, group) {
				let witness = format!(
					"conflict while installing candidate (chain: {})",
					self.why_str(reason)
				);
				if !self.pop_choice() {
					return Err(Error::Unsatisfiable { witness });
				}
			}
		}

		self.to_depcache();
		Ok(())
	}
}
