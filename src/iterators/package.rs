use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;

use crate::raw::{flag, pkg, ver};
use crate::{create_depends_map, Cache, DepType, Dependency, Provider, Version};

/// The state that the user wishes the package to be in.
#[derive(Debug, Eq, PartialEq, Hash)]
pub enum PkgSelectedState {
	Unknown = 0,
	Install = 1,
	Hold = 2,
	DeInstall = 3,
	Purge = 4,
}

impl From<u8> for PkgSelectedState {
	fn from(value: u8) -> Self {
		match value {
			0 => PkgSelectedState::Unknown,
			1 => PkgSelectedState::Install,
			2 => PkgSelectedState::Hold,
			3 => PkgSelectedState::DeInstall,
			4 => PkgSelectedState::Purge,
			_ => panic!("PkgSelectedState is malformed?"),
		}
	}
}

/// Installation state of the package
#[derive(Debug, Eq, PartialEq, Hash)]
pub enum PkgInstState {
	Ok = 0,
	ReInstReq = 1,
	HoldInst = 2,
	HoldReInstReq = 3,
}

impl From<u8> for PkgInstState {
	fn from(value: u8) -> Self {
		match value {
			0 => PkgInstState::Ok,
			1 => PkgInstState::ReInstReq,
			2 => PkgInstState::HoldInst,
			3 => PkgInstState::HoldReInstReq,
			_ => panic!("PkgInstState is malformed?"),
		}
	}
}

/// The current state of a Package.
#[derive(Debug, Eq, PartialEq, Hash)]
pub enum PkgCurrentState {
	NotInstalled = 0,
	UnPacked = 1,
	HalfConfigured = 2,
	HalfInstalled = 4,
	ConfigFiles = 5,
	Installed = 6,
}

impl From<u8> for PkgCurrentState {
	fn from(value: u8) -> Self {
		match value {
			0 => PkgCurrentState::NotInstalled,
			1 => PkgCurrentState::UnPacked,
			2 => PkgCurrentState::HalfConfigured,
			4 => PkgCurrentState::HalfInstalled,
			5 => PkgCurrentState::ConfigFiles,
			6 => PkgCurrentState::Installed,
			_ => panic!("PkgCurrentState is malformed?"),
		}
	}
}

#[derive(Debug)]
pub enum Marked {
	NewInstall,
	Install,
	ReInstall,
	Remove,
	Purge,
	Keep,
	Upgrade,
	Downgrade,
	Held,
	None,
}

/// A single unique package.
pub struct Package<'a> {
	pub(crate) cache: &'a Cache,
	pub(crate) off: u32,
	rdepends_map: OnceCell<HashMap<DepType, Vec<Dependency<'a>>>>,
}

impl<'a> Package<'a> {
	pub fn new(cache: &'a Cache, off: u32) -> Package<'a> {
		Package {
			cache,
			off,
			rdepends_map: OnceCell::new(),
		}
	}

	/// Get the name of the package without the architecture.
	pub fn name(&self) -> &'a str {
		let a = self.cache.arena();
		a.str_at(a.get(self.off + pkg::NAME))
	}

	/// Get the architecture of the package.
	pub fn arch(&self) -> &'a str {
		let a = self.cache.arena();
		a.str_at(a.get(self.off + pkg::ARCH))
	}

	/// Get the fullname of the package.
	///
	/// Pretty is a bool that will omit the native arch.
	pub fn fullname(&self, pretty: bool) -> String {
		if pretty && self.arch() == self.cache.config().architecture() {
			self.name().to_string()
		} else {
			format!("{}:{}", self.name(), self.arch())
		}
	}

	/// The offset of this package inside the cache arena.
	pub fn offset(&self) -> u32 { self.off }

	/// Sequential id of the package, usable as a side table index.
	pub fn id(&self) -> u32 { self.cache.arena().get(self.off + pkg::ID) }

	/// Returns a Reverse Dependency Map of the package
	///
	/// Dependencies are in a `Vec<Dependency>`
	///
	/// The Dependency struct represents an Or Group of dependencies.
	pub fn rdepends(&self) -> &HashMap<DepType, Vec<Dependency<'a>>> {
		self.rdepends_map.get_or_init(|| {
			let first = self.cache.arena().get(self.off + pkg::REV_DEPENDS);
			create_depends_map(self.cache, first, true)
		})
	}

	/// Return either a Version or None
	pub fn get_version(&self, version_str: &str) -> Option<Version<'a>> {
		self.versions().find(|ver| ver.version() == version_str)
	}

	/// True if the Package is installed.
	pub fn is_installed(&self) -> bool { self.cache.arena().get(self.off + pkg::CURRENT_VER) != 0 }

	/// True if the package has versions.
	///
	/// If a package has no versions it is considered virtual.
	pub fn has_versions(&self) -> bool { self.cache.arena().get(self.off + pkg::VERSIONS) != 0 }

	/// True if anything provides this package.
	pub fn has_provides(&self) -> bool { self.provides().next().is_some() }

	/// True if the package is essential.
	pub fn is_essential(&self) -> bool {
		self.cache.arena().get(self.off + pkg::FLAGS) & flag::ESSENTIAL != 0
	}

	/// The installed state of this package.
	pub fn inst_state(&self) -> PkgInstState {
		PkgInstState::from(self.cache.arena().get8(self.off + pkg::INST_STATE))
	}

	/// The selected state of this package.
	pub fn selected_state(&self) -> PkgSelectedState {
		PkgSelectedState::from(self.cache.arena().get8(self.off + pkg::SELECTED_STATE))
	}

	/// The current state of this package.
	pub fn current_state(&self) -> PkgCurrentState {
		PkgCurrentState::from(self.cache.arena().get8(self.off + pkg::CURRENT_STATE))
	}

	/// Returns the version object of the installed version.
	///
	/// If there isn't an installed version, returns None
	pub fn installed(&self) -> Option<Version<'a>> {
		let off = self.cache.arena().get(self.off + pkg::CURRENT_VER);
		if off == 0 {
			return None;
		}
		Some(Version::new(off, self.cache))
	}

	/// Returns the version object of the candidate.
	///
	/// If there isn't a candidate, returns None
	pub fn candidate(&self) -> Option<Version<'a>> {
		let off = self.cache.depcache().candidate_version(self);
		if off == 0 {
			return None;
		}
		Some(Version::new(off, self.cache))
	}

	/// Returns the install version if it exists.
	///
	/// * If a version is marked for install this will return the version
	///   to be installed.
	/// * If an installed package is marked for removal, this will return
	///   [`None`].
	pub fn install_version(&self) -> Option<Version<'a>> {
		let off = self.cache.depcache().install_version(self);
		if off == 0 {
			return None;
		}
		Some(Version::new(off, self.cache))
	}

	/// Returns a version list
	/// starting with the newest and ending with the oldest.
	pub fn versions(&self) -> impl Iterator<Item = Version<'a>> {
		let cache = self.cache;
		let mut off = cache.arena().get(self.off + pkg::VERSIONS);
		std::iter::from_fn(move || {
			if off == 0 {
				return None;
			}
			let this = off;
			off = cache.arena().get(this + ver::NEXT_VER);
			Some(Version::new(this, cache))
		})
	}

	/// Returns a list of providers
	pub fn provides(&self) -> impl Iterator<Item = Provider<'a>> {
		Provider::pkg_iter(self.cache, self.off)
	}

	/// Check if the package is upgradable.
	pub fn is_upgradable(&self) -> bool {
		self.is_installed() && self.cache.depcache().is_upgradable(self)
	}

	/// Check if the package is auto installed. (Not installed by the user)
	pub fn is_auto_installed(&self) -> bool { self.cache.depcache().is_auto_installed(self) }

	/// Check if the package is auto removable
	pub fn is_auto_removable(&self) -> bool {
		(self.is_installed() || self.marked_install()) && self.cache.depcache().is_garbage(self)
	}

	pub fn marked(&self) -> Marked {
		// Held is also marked keep. It needs to come before keep.
		if self.marked_held() {
			return Marked::Held;
		}

		if self.marked_keep() {
			return Marked::Keep;
		}

		// Upgrade, NewInstall, Reinstall and Downgrade are marked Install.
		// They need to come before Install.
		if self.marked_reinstall() {
			return Marked::ReInstall;
		}

		if self.marked_upgrade() && self.is_installed() {
			return Marked::Upgrade;
		}

		if self.marked_new_install() {
			return Marked::NewInstall;
		}

		if self.marked_downgrade() {
			return Marked::Downgrade;
		}

		if self.marked_install() {
			return Marked::Install;
		}

		// Purge is also marked delete. Needs to come first.
		if self.marked_purge() {
			return Marked::Purge;
		}

		if self.marked_delete() {
			return Marked::Remove;
		}

		Marked::None
	}

	/// Check if the package is now broken
	pub fn is_now_broken(&self) -> bool { self.cache.depcache().is_now_broken(self) }

	/// Check if the package to be installed is broken
	pub fn is_inst_broken(&self) -> bool { self.cache.depcache().is_inst_broken(self) }

	/// Check if the package is marked NewInstall
	pub fn marked_new_install(&self) -> bool { self.cache.depcache().marked_new_install(self) }

	/// Check if the package is marked install
	pub fn marked_install(&self) -> bool { self.cache.depcache().marked_install(self) }

	/// Check if the package is marked upgrade
	pub fn marked_upgrade(&self) -> bool { self.cache.depcache().marked_upgrade(self) }

	/// Check if the package is marked purge
	pub fn marked_purge(&self) -> bool { self.cache.depcache().marked_purge(self) }

	/// Check if the package is marked delete
	pub fn marked_delete(&self) -> bool { self.cache.depcache().marked_delete(self) }

	/// Check if the package is marked held
	pub fn marked_held(&self) -> bool { self.cache.depcache().marked_held(self) }

	/// Check if the package is marked keep
	pub fn marked_keep(&self) -> bool { self.cache.depcache().marked_keep(self) }

	/// Check if the package is marked downgrade
	pub fn marked_downgrade(&self) -> bool { self.cache.depcache().marked_downgrade(self) }

	/// Check if the package is marked reinstall
	pub fn marked_reinstall(&self) -> bool { self.cache.depcache().marked_reinstall(self) }

	/// # Mark a package as automatically installed.
	///
	/// ## mark_auto:
	///   * [true] = Mark the package as automatically installed.
	///   * [false] = Mark the package as manually installed.
	pub fn mark_auto(&self, mark_auto: bool) -> bool {
		self.cache.depcache().mark_auto(self, mark_auto);
		// Convert to a bool to remain consistent with other mark functions.
		true
	}

	/// # Mark a package for keep.
	///
	/// ## Returns:
	///   * [true] if the mark was successful
	///   * [false] if the mark was unsuccessful
	///
	/// This means that the package will not be changed from its current
	/// version. This will not stop a reinstall, but will stop removal,
	/// upgrades and downgrades
	pub fn mark_keep(&self) -> bool { self.cache.depcache().mark_keep(self) }

	/// # Mark a package for removal.
	///
	/// ## Returns:
	///   * [true] if the mark was successful
	///   * [false] if the mark was unsuccessful
	///
	/// ## purge:
	///   * [true] = Configuration files will be removed along with the
	///     package.
	///   * [false] = Only the package will be removed.
	pub fn mark_delete(&self, purge: bool) -> bool {
		self.cache.depcache().mark_delete(self, purge)
	}

	/// # Mark a package for installation.
	///
	/// ## auto_inst:
	///   * [true] = Additionally mark the dependencies for this package.
	///   * [false] = Mark only this package.
	///
	/// ## from_user:
	///   * [true] = The package will be marked manually installed.
	///   * [false] = The package will be unmarked automatically installed.
	///
	/// ## Returns:
	///   * [true] if the mark was successful
	///   * [false] if the mark was unsuccessful
	///
	/// If a package is already installed, at the latest version,
	/// and you mark that package for install you will get true,
	/// but the package will not be altered.
	/// `pkg.marked_install()` will be false
	pub fn mark_install(&self, auto_inst: bool, from_user: bool) -> bool {
		self.cache
			.depcache()
			.mark_install(self, auto_inst, from_user)
	}

	/// # Mark a package for reinstallation.
	///
	/// ## Returns:
	///   * [true] if the mark was successful
	///   * [false] if the mark was unsuccessful
	///
	/// ## reinstall:
	///   * [true] = The package will be marked for reinstall.
	///   * [false] = The package will be unmarked for reinstall.
	pub fn mark_reinstall(&self, reinstall: bool) -> bool {
		self.cache.depcache().mark_reinstall(self, reinstall);
		// Convert to a bool to remain consistent with other mark functions.
		true
	}

	/// Protect a package's state
	/// for when [`crate::cache::Cache::resolve`] is called.
	pub fn protect(&self) { self.cache.depcache().resolver().protect(self); }
}

impl<'a> fmt::Display for Package<'a> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.name())?;
		Ok(())
	}
}

impl<'a> fmt::Debug for Package<'a> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let versions: Vec<Version> = self.versions().collect();
		f.debug_struct("Package")
			.field("name", &self.name())
			.field("arch", &self.arch())
			.field("virtual", &versions.is_empty())
			.field("versions", &versions)
			.finish_non_exhaustive()
	}
}
