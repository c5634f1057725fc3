//! Identity cache and ownership bridge for [GDAL](http://gdal.org/) object
//! wrappers.
//!
//! A binding layer hands GDAL/OGR objects (datasets, layers, features,
//! geometries, raster bands, spatial references) to callers as [`Wrapper`]s.
//! This crate keeps that mapping sane:
//!
//! * at most one wrapper per live native pointer within a [`Session`],
//! * explicit, idempotent [`Wrapper::dispose`] that cascades to children,
//! * per-subtype native release following the wrapper's [`OwnershipPolicy`],
//! * child wrappers keep their parent alive,
//! * a disposed wrapper fails with [`GdalWrapError::DestroyedObject`] instead
//!   of touching freed memory.
//!
//! The native side is reached through the [`NativeLibrary`] trait. With the
//! `gdal` feature, [`gdal_native::GdalLibrary`] implements it over `gdal-sys`;
//! [`test_utils::SpyLibrary`] is an in-memory implementation for tests.
//!
//! ## Use
//!
//! ```
//! use gdal_wrap::test_utils::SpyLibrary;
//! use gdal_wrap::{GdalWrapError, ObjectKind, Session, WrapOptions};
//!
//! let native = SpyLibrary::new();
//! let session = Session::new(native.clone());
//!
//! let dataset = session.adopt(native.alloc(), ObjectKind::Dataset).unwrap();
//! let band_ptr = native.alloc();
//! let band = session
//!     .wrap(band_ptr, ObjectKind::RasterBand, WrapOptions::borrowed().with_parent(unsafe {
//!         dataset.handle().unwrap().as_ptr()
//!     }))
//!     .unwrap()
//!     .unwrap();
//!
//! // the dataset is closed once; the band goes with it
//! dataset.dispose();
//! assert_eq!(native.release_count(), 1);
//! assert_eq!(
//!     band.invoke("getXSize", &[]),
//!     Err(GdalWrapError::DestroyedObject { type_name: "RasterBand" })
//! );
//! ```

#![crate_name = "gdal_wrap"]
#![crate_type = "lib"]

pub mod cache;
pub mod config;
pub mod errors;
#[cfg(feature = "gdal")]
pub mod gdal_native;
pub mod handle;
pub mod marshal;
pub mod native;
pub mod ownership;
mod session;
pub mod test_utils;
#[cfg(feature = "gdal")]
mod utils;
mod wrapper;

pub use config::SessionOptions;
pub use errors::{GdalWrapError, Result};
pub use handle::{GeometryType, KindFamily, NativeHandle, ObjectKind};
pub use marshal::{Expected, Param, Value};
pub use native::{NativeArg, NativeLibrary, NativeObject, NativeValue};
pub use ownership::{OwnershipPolicy, Release};
pub use session::{Session, WrapOptions};
pub use wrapper::Wrapper;
