use bitflags::bitflags;

use crate::handle::{NativeHandle, ObjectKind};

bitflags! {
    /// Decides what disposing a wrapper does to its native object.
    ///
    /// An empty policy means the wrapper only borrows the native object;
    /// something else (a parent dataset, a layer) frees it.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OwnershipPolicy: u32 {
        /// The wrapper releases the native object when disposed.
        const OWNED = 0x01;
        /// The object came out of a query and must be handed back to the
        /// collection that produced it instead of being freed directly.
        const RESULT_SET = 0x02;
    }
}

impl Default for OwnershipPolicy {
    fn default() -> OwnershipPolicy {
        OwnershipPolicy::empty()
    }
}

impl OwnershipPolicy {
    pub fn owned() -> OwnershipPolicy {
        OwnershipPolicy::OWNED
    }

    pub fn borrowed() -> OwnershipPolicy {
        OwnershipPolicy::empty()
    }

    pub fn is_owned(&self) -> bool {
        self.contains(OwnershipPolicy::OWNED)
    }

    pub fn is_result_set(&self) -> bool {
        self.contains(OwnershipPolicy::RESULT_SET)
    }
}

/// Native release action for one object.
///
/// Subtypes do not all release the same way: geometries go through the
/// geometry factory, shared definitions drop a reference, result sets are
/// returned to their dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    DestroyGeometry(NativeHandle),
    DestroyFeature(NativeHandle),
    ReleaseDefn(NativeHandle),
    ReleaseSpatialRef(NativeHandle),
    CloseDataset(NativeHandle),
    ReleaseResultSet {
        dataset: NativeHandle,
        layer: NativeHandle,
    },
}

impl Release {
    /// Pick the release action for an object being disposed.
    ///
    /// Returns `None` when the policy does not make the wrapper responsible
    /// for the native object, or when the subtype is always owned elsewhere
    /// (raster bands and plain layers belong to their dataset).
    pub fn for_object(
        kind: ObjectKind,
        handle: NativeHandle,
        policy: OwnershipPolicy,
        producer: Option<NativeHandle>,
    ) -> Option<Release> {
        if policy.is_result_set() {
            return match (kind, producer) {
                (ObjectKind::Layer, Some(dataset)) => Some(Release::ReleaseResultSet {
                    dataset,
                    layer: handle,
                }),
                _ => None,
            };
        }
        if !policy.is_owned() {
            return None;
        }
        match kind {
            ObjectKind::Geometry(_) => Some(Release::DestroyGeometry(handle)),
            ObjectKind::Feature => Some(Release::DestroyFeature(handle)),
            ObjectKind::FeatureDefn => Some(Release::ReleaseDefn(handle)),
            ObjectKind::SpatialRef => Some(Release::ReleaseSpatialRef(handle)),
            ObjectKind::Dataset => Some(Release::CloseDataset(handle)),
            ObjectKind::Layer | ObjectKind::RasterBand => None,
        }
    }

    /// Whether `kind` has a release of its own. Raster bands and plain layers
    /// are freed with their dataset, so a wrapper cannot own them.
    pub fn has_release(kind: ObjectKind) -> bool {
        !matches!(kind, ObjectKind::Layer | ObjectKind::RasterBand)
    }

    /// The object this action releases.
    pub fn handle(&self) -> NativeHandle {
        match self {
            Release::DestroyGeometry(h)
            | Release::DestroyFeature(h)
            | Release::ReleaseDefn(h)
            | Release::ReleaseSpatialRef(h)
            | Release::CloseDataset(h) => *h,
            Release::ReleaseResultSet { layer, .. } => *layer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::GeometryType;
    use libc::c_void;

    fn fake(addr: usize) -> NativeHandle {
        NativeHandle::from_ptr(addr as *mut c_void).unwrap()
    }

    #[test]
    fn test_borrowed_never_releases() {
        for kind in [
            ObjectKind::Dataset,
            ObjectKind::Feature,
            ObjectKind::FeatureDefn,
            ObjectKind::SpatialRef,
            ObjectKind::Geometry(GeometryType::Point),
        ] {
            assert_eq!(
                Release::for_object(kind, fake(0x10), OwnershipPolicy::borrowed(), None),
                None
            );
        }
    }

    #[test]
    fn test_owned_release_per_subtype() {
        let h = fake(0x20);
        let owned = OwnershipPolicy::owned();
        assert_eq!(
            Release::for_object(ObjectKind::Geometry(GeometryType::Polygon), h, owned, None),
            Some(Release::DestroyGeometry(h))
        );
        assert_eq!(
            Release::for_object(ObjectKind::FeatureDefn, h, owned, None),
            Some(Release::ReleaseDefn(h))
        );
        assert_eq!(
            Release::for_object(ObjectKind::Dataset, h, owned, None),
            Some(Release::CloseDataset(h))
        );
        assert_eq!(Release::for_object(ObjectKind::RasterBand, h, owned, None), None);
        assert_eq!(Release::for_object(ObjectKind::Layer, h, owned, None), None);
        assert!(!Release::has_release(ObjectKind::RasterBand));
        assert!(!Release::has_release(ObjectKind::Layer));
        assert!(Release::has_release(ObjectKind::SpatialRef));
    }

    #[test]
    fn test_result_set_goes_back_to_dataset() {
        let layer = fake(0x30);
        let dataset = fake(0x40);
        let policy = OwnershipPolicy::RESULT_SET;
        let release = Release::for_object(ObjectKind::Layer, layer, policy, Some(dataset));
        assert_eq!(release, Some(Release::ReleaseResultSet { dataset, layer }));
        assert_eq!(release.unwrap().handle(), layer);

        // no producer, nothing to route the release through
        assert_eq!(Release::for_object(ObjectKind::Layer, layer, policy, None), None);
    }
}
