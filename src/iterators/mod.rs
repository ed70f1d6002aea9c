pub mod dependency;
pub mod files;
pub mod package;
pub mod provider;
#[cfg(feature = "serde")]
pub mod serde;
pub mod version;

pub use dependency::{create_depends_map, BaseDep, DepFlags, DepType, Dependency};
pub use files::{PackageFile, VersionFile};
pub use package::{Marked, Package, PkgCurrentState, PkgInstState, PkgSelectedState};
pub use provider::Provider;
pub use version::Version;
