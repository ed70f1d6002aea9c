use std::fmt;

use crate::raw::{pkg, prv};
use crate::{Cache, Package, Version};

/// A Provider provides a Version and/or Package.
///
/// Typically if you had a virtual package you would get its providers
/// to find which Package/Version you should really install.
pub struct Provider<'a> {
	pub(crate) off: u32,
	cache: &'a Cache,
}

impl<'a> Provider<'a> {
	pub fn new(off: u32, cache: &'a Cache) -> Provider<'a> { Provider { off, cache } }

	/// Iterate the providers hanging off a package record.
	pub(crate) fn pkg_iter(cache: &'a Cache, pkg_off: u32) -> impl Iterator<Item = Provider<'a>> {
		let mut off = cache.arena().get(pkg_off + pkg::PROVIDES);
		std::iter::from_fn(move || {
			if off == 0 {
				return None;
			}
			let this = off;
			off = cache.arena().get(this + prv::NEXT_PRV_PKG);
			Some(Provider::new(this, cache))
		})
	}

	/// The name of the package being provided.
	pub fn name(&self) -> &'a str {
		let a = self.cache.arena();
		a.str_at(a.get(a.get(self.off + prv::TARGET_PKG) + pkg::NAME))
	}

	/// The version string the virtual package is provided at, if any.
	pub fn version_str(&self) -> Option<&'a str> {
		let a = self.cache.arena();
		let v = a.get(self.off + prv::TARGET_VER);
		if v == 0 {
			return None;
		}
		Some(a.str_at(v))
	}

	/// Return the Target Package of the provider.
	pub fn package(&self) -> Package<'a> {
		let a = self.cache.arena();
		Package::new(self.cache, a.get(self.off + prv::TARGET_PKG))
	}

	/// Return the Version doing the providing.
	pub fn version(&self) -> Version<'a> {
		let a = self.cache.arena();
		Version::new(a.get(self.off + prv::PARENT_VER), self.cache)
	}
}

impl fmt::Display for Provider<'_> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let version = self.version();
		write!(
			f,
			"{} provides {} {}",
			version.parent().fullname(false),
			self.name(),
			self.version_str().unwrap_or(""),
		)?;
		Ok(())
	}
}

impl fmt::Debug for Provider<'_> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.debug_struct("Provider")
			.field("name", &self.name())
			.field("version", &self.version())
			.finish()
	}
}
