//! The seam between the bridge and the wrapped native library.
//!
//! Everything the cache needs from GDAL/OGR goes through [`NativeLibrary`]:
//! the per-subtype release calls, the discovery of derived objects that must
//! be disposed along with their owner, the geometry discriminant, reference
//! counting on shared definitions, and a generic `invoke` used for every
//! other operation.

use std::ffi::{c_void, CStr, CString};

use crate::errors::{GdalWrapError, Result};
use crate::handle::{NativeHandle, ObjectKind};
use crate::ownership::{OwnershipPolicy, Release};

/// An argument after conversion to a native representation.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeArg {
    /// An optional argument that was not supplied.
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(CString),
    Array(Vec<NativeArg>),
    Handle(NativeHandle),
}

impl NativeArg {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            NativeArg::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            NativeArg::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            NativeArg::Double(d) => Some(*d),
            NativeArg::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_c_str(&self) -> Option<&CStr> {
        match self {
            NativeArg::Str(s) => Some(s.as_c_str()),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<NativeHandle> {
        match self {
            NativeArg::Handle(h) => Some(*h),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, NativeArg::Null)
    }
}

/// A native object returned by an operation, before it is wrapped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeObject {
    pub ptr: *mut c_void,
    pub policy: OwnershipPolicy,
    /// Object that owns the returned object's memory, if any.
    pub parent: Option<*mut c_void>,
}

impl NativeObject {
    pub fn borrowed(ptr: *mut c_void) -> Self {
        NativeObject {
            ptr,
            policy: OwnershipPolicy::borrowed(),
            parent: None,
        }
    }

    pub fn owned(ptr: *mut c_void) -> Self {
        NativeObject {
            ptr,
            policy: OwnershipPolicy::owned(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: *mut c_void) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_policy(mut self, policy: OwnershipPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Result of a native operation, before it is converted back to a
/// [`Value`](crate::marshal::Value).
#[derive(Debug, Clone, PartialEq)]
pub enum NativeValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    List(Vec<NativeValue>),
    Object(ObjectKind, NativeObject),
    /// A geometry whose subtype still has to be read from the native object.
    Geometry(NativeObject),
}

/// Operations the bridge needs from the wrapped library.
///
/// Implementations must not call back into the owning
/// [`Session`](crate::Session).
pub trait NativeLibrary {
    /// Free or hand back a native object.
    fn release(&self, release: Release) -> Result<()>;

    /// Native objects derived from `handle` whose wrappers must be disposed
    /// before `handle` itself (overview and mask bands of a band, bands and
    /// layers of a dataset).
    fn dependents(&self, kind: ObjectKind, handle: NativeHandle) -> Vec<NativeHandle> {
        let _ = (kind, handle);
        Vec::new()
    }

    /// The `OGRwkbGeometryType` code and geometry name of a geometry.
    fn geometry_discriminant(&self, handle: NativeHandle) -> Result<(u32, String)>;

    /// Take one reference on a shared feature definition.
    fn reference_defn(&self, handle: NativeHandle) -> Result<()>;

    /// Copy a feature definition; the copy starts without references.
    fn clone_defn(&self, handle: NativeHandle) -> Result<*mut c_void>;

    /// Run any other operation on a live native object.
    fn invoke(
        &self,
        kind: ObjectKind,
        handle: NativeHandle,
        method: &str,
        args: &[NativeArg],
    ) -> Result<NativeValue>;

    /// Short description used by `Display`, e.g. a layer name.
    fn describe(&self, kind: ObjectKind, handle: NativeHandle) -> Option<String> {
        let _ = (kind, handle);
        None
    }
}

/// Error for an operation a library does not provide.
pub fn unsupported_method(kind: ObjectKind, method: &str) -> GdalWrapError {
    GdalWrapError::Unsupported(format!("{}.{}", kind.type_name(), method))
}

/// Fetch a required argument by position, for use inside `invoke`
/// implementations.
pub fn required_arg<'a>(
    args: &'a [NativeArg],
    position: usize,
    name: &str,
) -> Result<&'a NativeArg> {
    match args.get(position) {
        Some(arg) if !arg.is_null() => Ok(arg),
        _ => Err(GdalWrapError::invalid_argument(
            position,
            name,
            format!("{name} must be given"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_arg_accessors() {
        assert_eq!(NativeArg::Int(3).as_double(), Some(3.0));
        assert_eq!(NativeArg::Double(1.5).as_int(), None);
        let s = NativeArg::Str(CString::new("x").unwrap());
        assert_eq!(s.as_c_str().unwrap().to_str().unwrap(), "x");
        assert!(NativeArg::Null.is_null());
    }

    #[test]
    fn test_required_arg() {
        let args = [NativeArg::Int(1), NativeArg::Null];
        assert_eq!(required_arg(&args, 0, "index").unwrap(), &NativeArg::Int(1));
        let err = required_arg(&args, 1, "force").unwrap_err();
        assert_eq!(err.to_string(), "argument 1 (force): force must be given");
        assert!(required_arg(&args, 5, "other").is_err());
    }
}
