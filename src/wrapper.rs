use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

use log::{debug, warn};

use crate::errors::{GdalWrapError, Result};
use crate::handle::{NativeHandle, ObjectKind};
use crate::marshal::{self, Param, Value};
use crate::native::{NativeArg, NativeValue};
use crate::ownership::{OwnershipPolicy, Release};
use crate::session::SessionInner;

pub(crate) struct WrapperCell {
    kind: ObjectKind,
    pub(crate) handle: Cell<Option<NativeHandle>>,
    policy: OwnershipPolicy,
    /// Dataset a result set has to be returned to.
    producer: Option<NativeHandle>,
    /// Retention edge: keeps the parent alive while this object is.
    parent: Option<Wrapper>,
    /// Live objects created with this one as their parent.
    pub(crate) children: RefCell<Vec<Weak<WrapperCell>>>,
    session: Rc<SessionInner>,
}

impl WrapperCell {
    pub(crate) fn new(
        session: Rc<SessionInner>,
        kind: ObjectKind,
        handle: NativeHandle,
        policy: OwnershipPolicy,
        producer: Option<NativeHandle>,
        parent: Option<Wrapper>,
    ) -> Self {
        WrapperCell {
            kind,
            handle: Cell::new(Some(handle)),
            policy,
            producer,
            parent,
            children: RefCell::new(Vec::new()),
            session,
        }
    }

    fn teardown(&self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let type_name = self.kind.type_name();
        debug!(
            "Disposing {} {:?} ({})",
            type_name,
            handle,
            if self.policy.is_owned() { "owned" } else { "unowned" }
        );

        let session = &self.session;
        session.cache.borrow_mut().evict(handle);
        if let Some(parent) = &self.parent {
            parent.0.forget_child(self);
        }

        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children.iter().filter_map(Weak::upgrade) {
            Wrapper(child).dispose();
        }
        if session.options.cascade_dependents {
            for dependent in session.library.dependents(self.kind, handle) {
                let cached = session.lookup(dependent);
                if let Some(dependent) = cached {
                    dependent.dispose();
                }
            }
        }

        match Release::for_object(self.kind, handle, self.policy, self.producer) {
            Some(release) => {
                if let Err(e) = session.library.release(release) {
                    warn!("Releasing {} {:?} failed: {}", type_name, handle, e);
                }
            }
            None if self.policy.is_result_set() => {
                warn!("Result set {:?} has no producing dataset", handle);
            }
            None => {}
        }

        debug!("Disposed {} {:?}", type_name, handle);
    }

    /// Drop `child` from the registry, along with entries of dead children.
    fn forget_child(&self, child: &WrapperCell) {
        self.children
            .borrow_mut()
            .retain(|w| w.strong_count() > 0 && !std::ptr::eq(w.as_ptr(), child));
    }
}

impl Drop for WrapperCell {
    fn drop(&mut self) {
        let Some(handle) = self.handle.get() else {
            return;
        };
        if self.session.options.release_on_drop {
            self.teardown();
        } else {
            warn!(
                "{} {:?} dropped without dispose; native object not released",
                self.kind.type_name(),
                handle
            );
            self.handle.set(None);
            self.session.cache.borrow_mut().evict(handle);
            if let Some(parent) = &self.parent {
                parent.0.forget_child(self);
            }
        }
    }
}

/// Caller-visible proxy for one native object.
///
/// Clones share the same object: `==` compares identity. The wrapper stays
/// usable until [`dispose`](Wrapper::dispose) is called on any clone, or
/// until its [`Session`](crate::Session) is closed; after that every guarded
/// operation fails with [`GdalWrapError::DestroyedObject`].
#[derive(Clone)]
pub struct Wrapper(pub(crate) Rc<WrapperCell>);

impl Wrapper {
    pub fn kind(&self) -> ObjectKind {
        self.0.kind
    }

    pub fn type_name(&self) -> &'static str {
        self.0.kind.type_name()
    }

    pub fn policy(&self) -> OwnershipPolicy {
        self.0.policy
    }

    pub fn is_owned(&self) -> bool {
        self.0.policy.is_owned()
    }

    pub fn is_disposed(&self) -> bool {
        self.0.handle.get().is_none()
    }

    /// The wrapper this one keeps alive, if any.
    pub fn parent(&self) -> Option<&Wrapper> {
        self.0.parent.as_ref()
    }

    /// Handles of the live objects created with this wrapper as their parent.
    pub fn children(&self) -> Vec<NativeHandle> {
        self.0
            .children
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .filter_map(|child| child.handle.get())
            .collect()
    }

    /// The native handle, or `DestroyedObject` once disposed.
    pub fn handle(&self) -> Result<NativeHandle> {
        self.0.handle.get().ok_or(GdalWrapError::DestroyedObject {
            type_name: self.type_name(),
        })
    }

    pub(crate) fn raw_handle(&self) -> Option<NativeHandle> {
        self.0.handle.get()
    }

    /// Run `f` with the native handle if the wrapper is still alive.
    pub fn with_handle<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(NativeHandle) -> Result<R>,
    {
        f(self.handle()?)
    }

    /// Release this wrapper's native object according to its policy.
    ///
    /// Cached children and native dependents are disposed first. Calling it
    /// again is a no-op. Never fails: native release errors are logged and
    /// discarded.
    pub fn dispose(&self) {
        self.0.teardown();
    }

    /// Forward an operation with already converted arguments.
    pub fn invoke(&self, method: &str, args: &[NativeArg]) -> Result<NativeValue> {
        let handle = self.handle()?;
        self.0
            .session
            .library
            .invoke(self.0.kind, handle, method, args)
    }

    /// Forward an operation, converting `args` according to `params` and the
    /// result back to a [`Value`].
    ///
    /// Objects in the result go through the identity cache, so an object
    /// returned twice comes back as the same wrapper.
    pub fn call(&self, method: &str, params: &[Param], args: &[Value]) -> Result<Value> {
        let handle = self.handle()?;
        let native_args = marshal::marshal_args(params, args)?;
        let session = &self.0.session;
        let result = session
            .library
            .invoke(self.0.kind, handle, method, &native_args)?;
        session.to_value(result)
    }

    /// Wrap an object whose memory belongs to this one.
    pub fn wrap_child(
        &self,
        ptr: *mut c_void,
        kind: ObjectKind,
        policy: OwnershipPolicy,
    ) -> Result<Option<Wrapper>> {
        self.handle()?;
        let Some(child) = NativeHandle::from_ptr(ptr) else {
            return Ok(None);
        };
        let session = &self.0.session;
        if let Some(existing) = session.lookup(child) {
            return Ok(Some(existing));
        }
        session
            .insert_new(child, kind, policy, Some(self.clone()))
            .map(Some)
    }
}

impl PartialEq for Wrapper {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Wrapper {}

impl Hash for Wrapper {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Rc::as_ptr(&self.0), state)
    }
}

impl fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wrapper")
            .field("kind", &self.0.kind)
            .field("handle", &self.0.handle.get())
            .field("policy", &self.0.policy)
            .field("parent", &self.0.parent.as_ref().and_then(Wrapper::raw_handle))
            .finish()
    }
}

impl fmt::Display for Wrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.type_name();
        match self.0.handle.get() {
            None => write!(f, "{name} (destroyed)"),
            Some(handle) => match self.0.session.library.describe(self.0.kind, handle) {
                Some(description) => write!(f, "{name} ({description})"),
                None => f.write_str(name),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::GeometryType;
    use crate::marshal::Expected;
    use crate::test_utils::SpyLibrary;
    use crate::{Session, WrapOptions};

    fn session() -> (SpyLibrary, Session) {
        let native = SpyLibrary::new();
        let session = Session::new(native.clone());
        (native, session)
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let (native, session) = session();
        let geom = session
            .adopt(native.alloc_geometry(1, "POINT"), ObjectKind::Geometry(GeometryType::Point))
            .unwrap();
        geom.dispose();
        assert!(geom.is_disposed());
        geom.dispose();
        assert!(geom.is_disposed());
        assert_eq!(native.release_count(), 1);
    }

    #[test]
    fn test_guarded_operations_after_dispose() {
        let (native, session) = session();
        native.respond("getName", NativeValue::Str("roads".to_string()));
        let layer = session
            .wrap(native.alloc(), ObjectKind::Layer, WrapOptions::borrowed())
            .unwrap()
            .unwrap();
        assert_eq!(
            layer.invoke("getName", &[]).unwrap(),
            NativeValue::Str("roads".to_string())
        );
        assert_eq!(native.invoke_count(), 1);

        layer.dispose();
        let destroyed = GdalWrapError::DestroyedObject { type_name: "Layer" };
        assert_eq!(layer.invoke("getName", &[]), Err(destroyed.clone()));
        assert_eq!(layer.call("getName", &[], &[]), Err(destroyed.clone()));
        assert_eq!(layer.handle(), Err(destroyed.clone()));
        assert_eq!(layer.with_handle(|_| Ok(())), Err(destroyed));
        assert_eq!(native.invoke_count(), 1);
    }

    #[test]
    fn test_call_marshals_arguments() {
        let (native, session) = session();
        let band = session
            .wrap(native.alloc(), ObjectKind::RasterBand, WrapOptions::borrowed())
            .unwrap()
            .unwrap();
        let params = [Param::required("value", Expected::Integer)];
        assert_eq!(
            band.call("echo", &params, &[Value::Int(7)]).unwrap(),
            Value::Int(7)
        );

        let err = band
            .call("echo", &params, &[Value::Str("7".into())])
            .unwrap_err();
        assert_eq!(err.to_string(), "argument 0 (value): value must be an integer");
        // rejected before reaching the native layer
        assert_eq!(native.invoke_count(), 1);
    }

    #[test]
    fn test_call_wraps_returned_objects_once() {
        let (native, session) = session();
        let band = session
            .wrap(native.alloc(), ObjectKind::RasterBand, WrapOptions::borrowed())
            .unwrap()
            .unwrap();
        let mask = native.alloc();
        native.respond(
            "getMaskBand",
            NativeValue::Object(
                ObjectKind::RasterBand,
                crate::native::NativeObject::borrowed(mask)
                    .with_parent(unsafe { band.handle().unwrap().as_ptr() }),
            ),
        );

        let first = band.call("getMaskBand", &[], &[]).unwrap();
        let second = band.call("getMaskBand", &[], &[]).unwrap();
        let first = first.as_wrapper().unwrap();
        assert_eq!(Some(first), second.as_wrapper());
        assert_eq!(first.parent(), Some(&band));
        assert_eq!(band.children().len(), 1);
    }

    #[test]
    fn test_display() {
        let (native, session) = session();
        let ptr = native.alloc();
        native.set_description(ptr, "roads");
        let layer = session
            .wrap(ptr, ObjectKind::Layer, WrapOptions::borrowed())
            .unwrap()
            .unwrap();
        assert_eq!(layer.to_string(), "Layer (roads)");

        let band = session
            .wrap(native.alloc(), ObjectKind::RasterBand, WrapOptions::borrowed())
            .unwrap()
            .unwrap();
        assert_eq!(band.to_string(), "RasterBand");

        layer.dispose();
        assert_eq!(layer.to_string(), "Layer (destroyed)");
    }

    #[test]
    fn test_wrap_child() {
        let (native, session) = session();
        let ds = session
            .wrap(native.alloc(), ObjectKind::Dataset, WrapOptions::owned())
            .unwrap()
            .unwrap();
        let band_ptr = native.alloc();
        let band = ds
            .wrap_child(band_ptr, ObjectKind::RasterBand, OwnershipPolicy::borrowed())
            .unwrap()
            .unwrap();
        assert_eq!(band.parent(), Some(&ds));
        assert_eq!(
            ds.wrap_child(band_ptr, ObjectKind::RasterBand, OwnershipPolicy::borrowed())
                .unwrap(),
            Some(band.clone())
        );
        assert!(ds
            .wrap_child(std::ptr::null_mut(), ObjectKind::RasterBand, OwnershipPolicy::borrowed())
            .unwrap()
            .is_none());

        ds.dispose();
        assert!(band.is_disposed());
        assert_eq!(
            ds.wrap_child(native.alloc(), ObjectKind::RasterBand, OwnershipPolicy::borrowed()),
            Err(GdalWrapError::DestroyedObject { type_name: "Dataset" })
        );
    }
}
