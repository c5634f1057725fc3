use std::cell::RefCell;
use std::ffi::c_void;
use std::rc::Rc;

use log::{debug, error, warn};

use crate::cache::IdentityCache;
use crate::config::{DefnDiscipline, SessionOptions};
use crate::errors::{GdalWrapError, Result};
use crate::handle::{GeometryType, NativeHandle, ObjectKind};
use crate::marshal::Value;
use crate::native::{NativeLibrary, NativeValue};
use crate::ownership::{OwnershipPolicy, Release};
use crate::wrapper::{Wrapper, WrapperCell};

/// How a native pointer should be wrapped.
#[derive(Debug, Clone, Copy, Default)]
pub struct WrapOptions {
    pub policy: OwnershipPolicy,
    /// Native object that must outlive the wrapped one. It has to be wrapped
    /// already.
    pub parent: Option<*mut c_void>,
}

impl WrapOptions {
    pub fn borrowed() -> Self {
        WrapOptions::default()
    }

    pub fn owned() -> Self {
        WrapOptions {
            policy: OwnershipPolicy::owned(),
            parent: None,
        }
    }

    /// A layer returned by a query on `dataset`; it is handed back to the
    /// dataset when disposed.
    pub fn result_set(dataset: *mut c_void) -> Self {
        WrapOptions {
            policy: OwnershipPolicy::RESULT_SET,
            parent: Some(dataset),
        }
    }

    pub fn with_parent(mut self, parent: *mut c_void) -> Self {
        self.parent = Some(parent);
        self
    }
}

pub(crate) struct SessionInner {
    pub(crate) library: Box<dyn NativeLibrary>,
    pub(crate) cache: RefCell<IdentityCache<WrapperCell>>,
    pub(crate) options: SessionOptions,
}

/// One independent set of wrappers over a native library.
///
/// A session owns the identity cache: within a session each native object is
/// represented by at most one [`Wrapper`]. Sessions are single-threaded
/// (neither `Send` nor `Sync`).
///
/// Dropping the session disposes every wrapper still cached.
///
/// # Example
///
/// ```
/// use gdal_wrap::test_utils::SpyLibrary;
/// use gdal_wrap::{ObjectKind, Session, WrapOptions};
///
/// let native = SpyLibrary::new();
/// let session = Session::new(native.clone());
///
/// let ptr = native.alloc();
/// let ds = session.wrap(ptr, ObjectKind::Dataset, WrapOptions::owned()).unwrap().unwrap();
/// let again = session.wrap(ptr, ObjectKind::Dataset, WrapOptions::owned()).unwrap().unwrap();
/// assert_eq!(ds, again);
///
/// ds.dispose();
/// assert_eq!(native.release_count(), 1);
/// let null = std::ptr::null_mut();
/// assert!(session
///     .wrap(null, ObjectKind::Layer, WrapOptions::borrowed())
///     .unwrap()
///     .is_none());
/// ```
pub struct Session {
    inner: Rc<SessionInner>,
}

impl Session {
    pub fn new<L: NativeLibrary + 'static>(library: L) -> Session {
        Self::with_options(library, SessionOptions::default())
    }

    pub fn with_options<L: NativeLibrary + 'static>(
        library: L,
        options: SessionOptions,
    ) -> Session {
        Session {
            inner: Rc::new(SessionInner {
                library: Box::new(library),
                cache: RefCell::new(IdentityCache::new()),
                options,
            }),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }

    pub fn library(&self) -> &dyn NativeLibrary {
        self.inner.library.as_ref()
    }

    /// Wrap a pointer returned by a native call.
    ///
    /// Returns `Ok(None)` for a null pointer, and the existing wrapper if the
    /// object is already wrapped (its policy and parent are left unchanged).
    pub fn wrap(
        &self,
        ptr: *mut c_void,
        kind: ObjectKind,
        options: WrapOptions,
    ) -> Result<Option<Wrapper>> {
        self.inner.wrap(ptr, kind, options)
    }

    /// Wrap a native object that was just allocated for this wrapper.
    ///
    /// The wrapper always owns the object.
    pub fn adopt(&self, ptr: *mut c_void, kind: ObjectKind) -> Result<Wrapper> {
        self.inner.adopt(ptr, kind)
    }

    /// Wrap a geometry, reading its subtype from the native object.
    pub fn wrap_geometry(&self, ptr: *mut c_void, options: WrapOptions) -> Result<Option<Wrapper>> {
        self.inner.wrap_geometry(ptr, options)
    }

    /// Wrap a feature definition according to the session's
    /// [`DefnDiscipline`].
    ///
    /// `owned` is for definitions created for this wrapper; shared ones
    /// (typically a layer's) are referenced or copied.
    pub fn wrap_feature_defn(&self, ptr: *mut c_void, owned: bool) -> Result<Option<Wrapper>> {
        self.inner.wrap_feature_defn(ptr, owned)
    }

    /// Convert a native result, wrapping any object it carries.
    pub fn to_value(&self, value: NativeValue) -> Result<Value> {
        self.inner.to_value(value)
    }

    pub fn lookup(&self, ptr: *mut c_void) -> Option<Wrapper> {
        NativeHandle::from_ptr(ptr).and_then(|h| self.inner.lookup(h))
    }

    pub fn is_cached(&self, ptr: *mut c_void) -> bool {
        NativeHandle::from_ptr(ptr).is_some_and(|h| self.inner.cache.borrow().has(h))
    }

    /// Number of live wrappers in the cache.
    pub fn cached_count(&self) -> usize {
        self.inner.cache.borrow().live().len()
    }

    /// Dispose every cached wrapper.
    ///
    /// Wrappers without a parent go first so that their children are
    /// released through the cascade before the parent itself.
    pub fn close(&self) {
        let live: Vec<Wrapper> = self
            .inner
            .cache
            .borrow()
            .live()
            .into_iter()
            .map(Wrapper)
            .collect();
        if live.is_empty() {
            return;
        }
        debug!("Closing session with {} cached objects", live.len());
        let (roots, rest): (Vec<_>, Vec<_>) = live.into_iter().partition(|w| w.parent().is_none());
        for wrapper in roots.iter().chain(rest.iter()) {
            wrapper.dispose();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl SessionInner {
    pub(crate) fn lookup(&self, handle: NativeHandle) -> Option<Wrapper> {
        self.cache.borrow().lookup(handle).map(Wrapper)
    }

    pub(crate) fn wrap(
        self: &Rc<Self>,
        ptr: *mut c_void,
        kind: ObjectKind,
        options: WrapOptions,
    ) -> Result<Option<Wrapper>> {
        let Some(handle) = NativeHandle::from_ptr(ptr) else {
            return Ok(None);
        };
        if let Some(existing) = self.lookup(handle) {
            return Ok(Some(existing));
        }
        let parent = self.resolve_parent(kind, handle, options.parent)?;
        self.insert_new(handle, kind, options.policy, parent).map(Some)
    }

    pub(crate) fn adopt(self: &Rc<Self>, ptr: *mut c_void, kind: ObjectKind) -> Result<Wrapper> {
        let handle = NativeHandle::from_ptr(ptr).ok_or_else(|| GdalWrapError::NullPointer {
            method_name: "Session::adopt",
            msg: format!("cannot adopt a null {}", kind.type_name()),
        })?;
        if self.cache.borrow().has(handle) {
            return Err(GdalWrapError::DuplicateHandle(handle));
        }
        if kind == ObjectKind::FeatureDefn {
            self.library.reference_defn(handle)?;
            return self
                .insert_new(handle, kind, OwnershipPolicy::owned(), None)
                .inspect_err(|_| self.release_defn(handle));
        }
        self.insert_new(handle, kind, OwnershipPolicy::owned(), None)
    }

    pub(crate) fn wrap_geometry(
        self: &Rc<Self>,
        ptr: *mut c_void,
        options: WrapOptions,
    ) -> Result<Option<Wrapper>> {
        let Some(handle) = NativeHandle::from_ptr(ptr) else {
            return Ok(None);
        };
        if let Some(existing) = self.lookup(handle) {
            return Ok(Some(existing));
        }
        let (code, name) = self.library.geometry_discriminant(handle)?;
        let kind = ObjectKind::Geometry(GeometryType::from_native(code, &name)?);
        let parent = self.resolve_parent(kind, handle, options.parent)?;
        self.insert_new(handle, kind, options.policy, parent).map(Some)
    }

    pub(crate) fn wrap_feature_defn(
        self: &Rc<Self>,
        ptr: *mut c_void,
        owned: bool,
    ) -> Result<Option<Wrapper>> {
        let Some(handle) = NativeHandle::from_ptr(ptr) else {
            return Ok(None);
        };
        if let Some(existing) = self.lookup(handle) {
            if owned {
                return Err(GdalWrapError::DuplicateHandle(handle));
            }
            return Ok(Some(existing));
        }
        let cloned = !owned && self.options.defn_discipline == DefnDiscipline::Clone;
        let target = if cloned {
            let copy = self.library.clone_defn(handle)?;
            NativeHandle::from_ptr(copy).ok_or_else(|| GdalWrapError::NullPointer {
                method_name: "clone_defn",
                msg: String::new(),
            })?
        } else {
            handle
        };

        if let Err(e) = self.library.reference_defn(target) {
            if cloned {
                self.release_defn(target);
            }
            return Err(e);
        }
        self.insert_new(target, ObjectKind::FeatureDefn, OwnershipPolicy::owned(), None)
            .map(Some)
            .inspect_err(|_| self.release_defn(target))
    }

    /// Undo a reference taken (or a copy made) for a wrapper that was never
    /// created.
    fn release_defn(&self, handle: NativeHandle) {
        if let Err(e) = self.library.release(Release::ReleaseDefn(handle)) {
            warn!("Releasing FeatureDefn {:?} failed: {}", handle, e);
        }
    }

    pub(crate) fn to_value(self: &Rc<Self>, value: NativeValue) -> Result<Value> {
        let value = match value {
            NativeValue::Null => Value::Null,
            NativeValue::Bool(b) => Value::Bool(b),
            NativeValue::Int(i) => Value::Int(i),
            NativeValue::Double(d) => Value::Double(d),
            NativeValue::Str(s) => Value::Str(s),
            NativeValue::List(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.to_value(item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            NativeValue::Object(ObjectKind::FeatureDefn, obj) => self
                .wrap_feature_defn(obj.ptr, obj.policy.is_owned())?
                .into(),
            NativeValue::Object(kind, obj) => {
                let options = WrapOptions {
                    policy: obj.policy,
                    parent: obj.parent,
                };
                self.wrap(obj.ptr, kind, options)?.into()
            }
            NativeValue::Geometry(obj) => {
                let options = WrapOptions {
                    policy: obj.policy,
                    parent: obj.parent,
                };
                self.wrap_geometry(obj.ptr, options)?.into()
            }
        };
        Ok(value)
    }

    fn resolve_parent(
        &self,
        kind: ObjectKind,
        handle: NativeHandle,
        parent: Option<*mut c_void>,
    ) -> Result<Option<Wrapper>> {
        let Some(parent_handle) = parent.and_then(NativeHandle::from_ptr) else {
            return Ok(None);
        };
        match self.lookup(parent_handle) {
            Some(parent) => Ok(Some(parent)),
            None => {
                error!(
                    "{}'s parent disappeared from cache ({:?}, parent = {:?})",
                    kind.type_name(),
                    handle,
                    parent_handle
                );
                Err(GdalWrapError::ParentEvicted {
                    child: kind.type_name(),
                    parent: parent_handle,
                })
            }
        }
    }

    pub(crate) fn insert_new(
        self: &Rc<Self>,
        handle: NativeHandle,
        kind: ObjectKind,
        policy: OwnershipPolicy,
        parent: Option<Wrapper>,
    ) -> Result<Wrapper> {
        if policy.is_owned() && !Release::has_release(kind) {
            return Err(GdalWrapError::Unsupported(format!(
                "{} belongs to its dataset and cannot be owned",
                kind.type_name()
            )));
        }
        let producer = if policy.is_result_set() {
            parent.as_ref().and_then(Wrapper::raw_handle)
        } else {
            None
        };
        let parent_for_edge = parent.clone();
        let wrapper = Wrapper(Rc::new(WrapperCell::new(
            Rc::clone(self),
            kind,
            handle,
            policy,
            producer,
            parent,
        )));

        let inserted = self.cache.borrow_mut().insert(handle, &wrapper.0);
        if let Err(e) = inserted {
            // never wrapped, so nothing to release
            wrapper.0.handle.set(None);
            return Err(e);
        }
        if let Some(parent) = parent_for_edge {
            parent.0.children.borrow_mut().push(Rc::downgrade(&wrapper.0));
        }

        debug!(
            "Created {} {:?} ({})",
            kind.type_name(),
            handle,
            if policy.is_owned() { "owned" } else { "unowned" }
        );
        Ok(wrapper)
    }
}
