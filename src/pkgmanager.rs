//! Turns the marked changes into the exact action sequence handed to
//! the installer backend.
//!
//! The ordering engine produces a linearisation of the changed packages;
//! this driver walks it and emits removes, unpacks and configures such
//! that every intermediate state the backend passes through is valid.

use tracing::debug;

use crate::cache::Cache;
use crate::error::Error;
use crate::orderlist::{oflag, OrderList};
use crate::raw::{dep, depend, flag, pkg, ver};
use crate::Package;

/// Overall result of driving an installation run.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderResult {
	Completed,
	Failed,
	Incomplete,
}

/// One step of the install plan, in execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
	/// Remove the package from the system; true means purge.
	Remove(String, bool),
	/// Unpack the archive of the named package.
	Unpack(String),
	/// Configure a previously unpacked package.
	Configure(String),
}

/// Plans and sequences the work of the installer backend.
pub struct PackageManager;

impl PackageManager {
	/// Compute the ordered action sequence for the current marks.
	///
	/// Every intermediate state obeys the critical rules: conflicts and
	/// predepends hold at each unpack, nothing still configured depends
	/// on a package at its removal, and configuration happens only once
	/// all depends are configured.
	pub fn plan_install(cache: &Cache) -> Result<Vec<Action>, Error> {
		let depcache = cache.depcache();
		depcache.ensure_closed()?;

		let a = cache.arena();
		let mut order = OrderList::new(cache);

		let changed: Vec<u32> = cache
			.pkg_offsets()
			.into_iter()
			.filter(|&off| {
				let p = Package::new(cache, off);
				depcache.marked_delete(&p)
					|| (depcache.marked_install(&p)
						&& depcache.install_version(&p) != a.get(off + pkg::CURRENT_VER))
			})
			.collect();

		if changed.is_empty() {
			return Ok(Vec::new());
		}

		let immediate_all = cache.config().bool("APT::Immediate-Configure-All", false);
		for &off in &changed {
			order.push(off);

			let p = Package::new(cache, off);
			if depcache.marked_delete(&p) {
				continue;
			}
			// Essential chains must be configurable the moment they are
			// unpacked.
			if immediate_all
				|| a.get(off + pkg::FLAGS)
					& (flag::ESSENTIAL | flag::IMPORTANT | flag::IMMEDIATE_CONF)
					!= 0
			{
				order.flag(off, oflag::IMMEDIATE);
			}
		}

		order.order_unpack()?;
		debug!("ordered {} changed packages", order.list().len());

		let mut actions = Vec::new();
		let sequence = order.list().to_vec();

		for &off in &sequence {
			let p = Package::new(cache, off);

			if depcache.marked_delete(&p) {
				actions.push(Action::Remove(p.fullname(true), depcache.marked_purge(&p)));
				order.flag(off, oflag::REMOVED);
				continue;
			}

			// A predepends target that is unpacked but not yet configured
			// must be configured before this unpack happens.
			let install = depcache.install_version(&p);
			if install != 0 {
				let mut d = a.get(install + ver::DEPENDS);
				while d != 0 {
					if a.get8(d + depend::DEP_TYPE) == dep::PRE_DEPENDS {
						for target in cache.dep_targets(d) {
							let target_pkg = a.get(target + ver::PARENT_PKG);
							if order.is_flag(target_pkg, oflag::UNPACKED)
								&& !order.is_flag(target_pkg, oflag::CONFIGURED)
							{
								let t = Package::new(cache, target_pkg);
								actions.push(Action::Configure(t.fullname(true)));
								order.flag(target_pkg, oflag::CONFIGURED);
							}
						}
					}
					d = a.get(d + depend::NEXT_DEP);
				}
			}

			actions.push(Action::Unpack(p.fullname(true)));
			order.flag(off, oflag::UNPACKED);

			if order.is_flag(off, oflag::IMMEDIATE) {
				actions.push(Action::Configure(p.fullname(true)));
				order.flag(off, oflag::CONFIGURED);
			}
		}

		// Final phase: configure everything left, ordered on depends
		// alone.
		let mut configure = OrderList::new(cache);
		for &off in &sequence {
			if order.is_flag(off, oflag::UNPACKED) && !order.is_flag(off, oflag::CONFIGURED) {
				configure.push(off);
			}
		}
		configure.order_configure();

		for &off in configure.list() {
			let p = Package::new(cache, off);
			actions.push(Action::Configure(p.fullname(true)));
			order.flag(off, oflag::CONFIGURED);
		}

		// Anything not configured now is a bug in the ordering.
		for &off in &sequence {
			let p = Package::new(cache, off);
			if !depcache.marked_delete(&p) && !order.is_flag(off, oflag::CONFIGURED) {
				return Err(Error::InternalInvariant {
					msg: format!("{} was never configured", p.fullname(true)),
				});
			}
		}

		Ok(actions)
	}

	/// Convenience check mirroring the backend's tri state result.
	pub fn order_result(cache: &Cache) -> OrderResult {
		match Self::plan_install(cache) {
			Ok(_) => OrderResult::Completed,
			Err(Error::FatalOrdering { .. }) => OrderResult::Failed,
			Err(_) => OrderResult::Incomplete,
		}
	}
}
