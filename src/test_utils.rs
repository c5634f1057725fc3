//! In-memory stand-in for the native library.
//!
//! [`SpyLibrary`] hands out fake native addresses and records every call the
//! bridge makes, so tests can check release counts and that disposed
//! wrappers never reach the native layer. The addresses are never
//! dereferenced.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::rc::Rc;

use crate::errors::{GdalWrapError, Result};
use crate::handle::{NativeHandle, ObjectKind};
use crate::native::{unsupported_method, NativeArg, NativeLibrary, NativeValue};
use crate::ownership::Release;

const FIRST_ADDR: usize = 0x1000;
const ADDR_STEP: usize = 0x10;

#[derive(Default)]
struct SpyState {
    next_addr: usize,
    geometries: HashMap<NativeHandle, (u32, String)>,
    dependents: HashMap<NativeHandle, Vec<NativeHandle>>,
    descriptions: HashMap<NativeHandle, String>,
    responses: HashMap<String, NativeValue>,
    failing: HashMap<String, GdalWrapError>,
    fail_releases: bool,
    releases: Vec<Release>,
    references: HashMap<NativeHandle, i64>,
    invokes: usize,
}

/// Call-recording [`NativeLibrary`].
///
/// Clones share state: keep one clone for assertions and give the other to
/// the [`Session`](crate::Session).
///
/// Operations answer with the value registered through
/// [`respond`](SpyLibrary::respond). The `echo` operation returns its first
/// argument. Anything else is unsupported.
#[derive(Clone, Default)]
pub struct SpyLibrary {
    state: Rc<RefCell<SpyState>>,
}

fn handle(ptr: *mut c_void) -> Option<NativeHandle> {
    NativeHandle::from_ptr(ptr)
}

impl SpyLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh fake native object.
    pub fn alloc(&self) -> *mut c_void {
        let mut state = self.state.borrow_mut();
        if state.next_addr == 0 {
            state.next_addr = FIRST_ADDR;
        }
        let addr = state.next_addr;
        state.next_addr += ADDR_STEP;
        addr as *mut c_void
    }

    /// A fresh fake geometry reporting `code` and `name` as its discriminant.
    pub fn alloc_geometry(&self, code: u32, name: &str) -> *mut c_void {
        let ptr = self.alloc();
        if let Some(h) = handle(ptr) {
            self.state
                .borrow_mut()
                .geometries
                .insert(h, (code, name.to_string()));
        }
        ptr
    }

    /// Report `child` as derived from `owner` (an overview or mask band).
    pub fn add_dependent(&self, owner: *mut c_void, child: *mut c_void) {
        if let (Some(owner), Some(child)) = (handle(owner), handle(child)) {
            self.state
                .borrow_mut()
                .dependents
                .entry(owner)
                .or_default()
                .push(child);
        }
    }

    pub fn set_description(&self, ptr: *mut c_void, description: &str) {
        if let Some(h) = handle(ptr) {
            self.state
                .borrow_mut()
                .descriptions
                .insert(h, description.to_string());
        }
    }

    /// Answer every later `method` call with `value`.
    pub fn respond(&self, method: &str, value: NativeValue) {
        self.state
            .borrow_mut()
            .responses
            .insert(method.to_string(), value);
    }

    /// Fail every later `method` call with `err`. `"reference_defn"` makes
    /// [`NativeLibrary::reference_defn`] fail.
    pub fn fail_method(&self, method: &str, err: GdalWrapError) {
        self.state
            .borrow_mut()
            .failing
            .insert(method.to_string(), err);
    }

    /// Make releases fail. Failed releases are still recorded.
    pub fn fail_releases(&self, fail: bool) {
        self.state.borrow_mut().fail_releases = fail;
    }

    pub fn releases(&self) -> Vec<Release> {
        self.state.borrow().releases.clone()
    }

    pub fn release_count(&self) -> usize {
        self.state.borrow().releases.len()
    }

    /// How many times the object at `ptr` was released.
    pub fn releases_of(&self, ptr: *mut c_void) -> usize {
        let Some(h) = handle(ptr) else {
            return 0;
        };
        self.state
            .borrow()
            .releases
            .iter()
            .filter(|r| r.handle() == h)
            .count()
    }

    pub fn invoke_count(&self) -> usize {
        self.state.borrow().invokes
    }

    /// Outstanding references on a feature definition.
    pub fn references(&self, ptr: *mut c_void) -> i64 {
        handle(ptr)
            .and_then(|h| self.state.borrow().references.get(&h).copied())
            .unwrap_or(0)
    }
}

impl NativeLibrary for SpyLibrary {
    fn release(&self, release: Release) -> Result<()> {
        let mut state = self.state.borrow_mut();
        state.releases.push(release);
        if state.fail_releases {
            return Err(GdalWrapError::from_ogr_err(6, "release", Some("release refused")));
        }
        if let Release::ReleaseDefn(h) = release {
            *state.references.entry(h).or_insert(0) -= 1;
        }
        Ok(())
    }

    fn dependents(&self, _kind: ObjectKind, handle: NativeHandle) -> Vec<NativeHandle> {
        self.state
            .borrow()
            .dependents
            .get(&handle)
            .cloned()
            .unwrap_or_default()
    }

    fn geometry_discriminant(&self, handle: NativeHandle) -> Result<(u32, String)> {
        self.state
            .borrow()
            .geometries
            .get(&handle)
            .cloned()
            .ok_or_else(|| GdalWrapError::NullPointer {
                method_name: "OGR_G_GetGeometryName",
                msg: format!("{handle:?} is not a geometry"),
            })
    }

    fn reference_defn(&self, handle: NativeHandle) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(err) = state.failing.get("reference_defn") {
            return Err(err.clone());
        }
        *state.references.entry(handle).or_insert(0) += 1;
        Ok(())
    }

    fn clone_defn(&self, _handle: NativeHandle) -> Result<*mut c_void> {
        Ok(self.alloc())
    }

    fn invoke(
        &self,
        kind: ObjectKind,
        _handle: NativeHandle,
        method: &str,
        args: &[NativeArg],
    ) -> Result<NativeValue> {
        let mut state = self.state.borrow_mut();
        state.invokes += 1;
        if let Some(err) = state.failing.get(method) {
            return Err(err.clone());
        }
        if let Some(value) = state.responses.get(method) {
            return Ok(value.clone());
        }
        match method {
            "echo" => Ok(args.first().map_or(NativeValue::Null, echo)),
            _ => Err(unsupported_method(kind, method)),
        }
    }

    fn describe(&self, _kind: ObjectKind, handle: NativeHandle) -> Option<String> {
        self.state.borrow().descriptions.get(&handle).cloned()
    }
}

fn echo(arg: &NativeArg) -> NativeValue {
    match arg {
        NativeArg::Null | NativeArg::Handle(_) => NativeValue::Null,
        NativeArg::Bool(b) => NativeValue::Bool(*b),
        NativeArg::Int(i) => NativeValue::Int(*i),
        NativeArg::Double(d) => NativeValue::Double(*d),
        NativeArg::Str(s) => NativeValue::Str(s.to_string_lossy().into_owned()),
        NativeArg::Array(items) => NativeValue::List(items.iter().map(echo).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_is_unique_and_aligned() {
        let spy = SpyLibrary::new();
        let a = spy.alloc();
        let b = spy.alloc();
        assert_ne!(a, b);
        assert_eq!(a as usize, FIRST_ADDR);
        assert_eq!(b as usize - a as usize, ADDR_STEP);
    }

    #[test]
    fn test_records_calls() {
        let spy = SpyLibrary::new();
        let defn = handle(spy.alloc()).unwrap();
        spy.reference_defn(defn).unwrap();
        spy.reference_defn(defn).unwrap();
        spy.release(Release::ReleaseDefn(defn)).unwrap();
        assert_eq!(spy.references(unsafe { defn.as_ptr() }), 1);
        assert_eq!(spy.releases_of(unsafe { defn.as_ptr() }), 1);

        let err = spy
            .invoke(ObjectKind::Layer, defn, "getExtent", &[])
            .unwrap_err();
        assert_eq!(err, GdalWrapError::Unsupported("Layer.getExtent".to_string()));
        assert_eq!(
            spy.invoke(ObjectKind::Layer, defn, "echo", &[NativeArg::Int(4)]),
            Ok(NativeValue::Int(4))
        );
        assert_eq!(spy.invoke_count(), 2);
    }
}
