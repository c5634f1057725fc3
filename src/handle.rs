//! Native object identity and the closed set of wrapped subtypes.

use std::fmt;
use std::ptr::NonNull;

use libc::c_void;

use crate::errors::{GdalWrapError, Result};

/// Opaque, non-owning reference to an object living on the native heap.
///
/// Two handles are equal iff they point at the same native object. A handle
/// is never dereferenced on the Rust side; it is only a cache key and the
/// value handed back to the native library.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(NonNull<c_void>);

impl NativeHandle {
    /// Returns `None` for a null pointer.
    pub fn from_ptr(ptr: *mut c_void) -> Option<Self> {
        NonNull::new(ptr).map(NativeHandle)
    }

    /// Returns the wrapped C pointer
    ///
    /// # Safety
    /// The pointer may have been released by the native library; only pass it
    /// back to native calls while the owning wrapper is alive.
    pub unsafe fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }

    pub fn addr(&self) -> usize {
        self.0.as_ptr() as usize
    }
}

// Handles are identifiers only; the Rust side never dereferences them.
unsafe impl Send for NativeHandle {}
unsafe impl Sync for NativeHandle {}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:p}]", self.0)
    }
}

/// OGR geometry subtypes the bridge knows how to wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryType {
    Point,
    LineString,
    LinearRing,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
    GeometryCollection,
}

const WKB_25D_BIT: u32 = 0x8000_0000;
const WKB_LINEAR_RING: u32 = 101;

impl GeometryType {
    /// Select the subtype from the native discriminant.
    ///
    /// `code` is the `OGRwkbGeometryType` value, which may carry the 2.5D bit
    /// or an ISO Z/M/ZM offset. `name` is the native geometry name; OGR reports
    /// linear rings as line strings, so the name wins for `LINEARRING`.
    pub fn from_native(code: u32, name: &str) -> Result<GeometryType> {
        if name.eq_ignore_ascii_case("LINEARRING") {
            return Ok(GeometryType::LinearRing);
        }
        let flat = match code & !WKB_25D_BIT {
            WKB_LINEAR_RING => WKB_LINEAR_RING,
            c if c >= 1000 => c % 1000,
            c => c,
        };
        let gt = match flat {
            1 => GeometryType::Point,
            2 => GeometryType::LineString,
            3 => GeometryType::Polygon,
            4 => GeometryType::MultiPoint,
            5 => GeometryType::MultiLineString,
            6 => GeometryType::MultiPolygon,
            7 => GeometryType::GeometryCollection,
            WKB_LINEAR_RING => GeometryType::LinearRing,
            _ => {
                return Err(GdalWrapError::Unsupported(format!(
                    "Tried to create unsupported geometry type {code} ({name})"
                )))
            }
        };
        Ok(gt)
    }

    pub fn name(&self) -> &'static str {
        match self {
            GeometryType::Point => "Point",
            GeometryType::LineString => "LineString",
            GeometryType::LinearRing => "LinearRing",
            GeometryType::Polygon => "Polygon",
            GeometryType::MultiPoint => "MultiPoint",
            GeometryType::MultiLineString => "MultiLineString",
            GeometryType::MultiPolygon => "MultiPolygon",
            GeometryType::GeometryCollection => "GeometryCollection",
        }
    }

    /// Whether this subtype holds other geometries.
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            GeometryType::MultiPoint
                | GeometryType::MultiLineString
                | GeometryType::MultiPolygon
                | GeometryType::GeometryCollection
        )
    }
}

/// Native subtype of a wrapped object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Dataset,
    Layer,
    Feature,
    FeatureDefn,
    RasterBand,
    SpatialRef,
    Geometry(GeometryType),
}

impl ObjectKind {
    /// Declared type name, used in error messages and `Display`.
    pub fn type_name(&self) -> &'static str {
        match self {
            ObjectKind::Dataset => "Dataset",
            ObjectKind::Layer => "Layer",
            ObjectKind::Feature => "Feature",
            ObjectKind::FeatureDefn => "FeatureDefn",
            ObjectKind::RasterBand => "RasterBand",
            ObjectKind::SpatialRef => "SpatialReference",
            ObjectKind::Geometry(gt) => gt.name(),
        }
    }

    /// `true` when `self` may stand in for an argument declared as `family`.
    ///
    /// Every geometry subtype is accepted where a generic geometry is
    /// expected; other kinds only match themselves.
    pub fn is_a(&self, family: KindFamily) -> bool {
        match (self, family) {
            (ObjectKind::Geometry(_), KindFamily::Geometry) => true,
            (kind, KindFamily::Exact(want)) => *kind == want,
            _ => false,
        }
    }
}

/// What a parameter accepts: one exact kind, or any geometry subtype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindFamily {
    Exact(ObjectKind),
    Geometry,
}

impl KindFamily {
    pub fn type_name(&self) -> &'static str {
        match self {
            KindFamily::Exact(kind) => kind.type_name(),
            KindFamily::Geometry => "Geometry",
        }
    }
}
