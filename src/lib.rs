//! apt-core is a native implementation of the apt package management
//! core: the binary package cache, the dependency solvers, the
//! unpack/configure ordering engine, the file list cache with its
//! extraction stream, and the incremental index patcher.
//!
//! The entry point for most operations is [`Cache`]:
//!
//! ```no_run
//! use apt_core::new_cache;
//!
//! let cache = new_cache!().unwrap();
//! if let Some(pkg) = cache.get("apt") {
//!     println!("{} {:?}", pkg.name(), pkg.candidate());
//! }
//! ```
//!
//! All long lived cache structures live in offset addressed arenas that
//! are persisted as single files and memory mapped back in; see the
//! `raw` module for the record layer.

pub mod cache;
pub mod config;
pub mod depcache;
pub mod error;
pub mod extract;
pub mod filelist;
pub mod iterators;
pub mod listparser;
pub mod macros;
pub mod orderlist;
pub mod pkgmanager;
pub mod policy;
pub mod progress;
pub mod raw;
pub mod records;
pub mod resolver;
pub mod rred;
pub mod solver;
pub mod tagfile;
pub mod util;
pub mod worker;

pub use cache::{Cache, IndexSource, PackageSort, ReleaseInfo, Upgrade};
pub use depcache::{ActionGroup, DepCache};
pub use error::{AptError, AptErrors, Error};
pub use iterators::{
	create_depends_map, BaseDep, DepFlags, DepType, Dependency, Marked, Package, PackageFile,
	PkgCurrentState, PkgInstState, PkgSelectedState, Provider, Version, VersionFile,
};
pub use records::RecordField;
