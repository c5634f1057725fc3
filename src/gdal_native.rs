//! [`NativeLibrary`] backed by the GDAL C API.
//!
//! ```no_run
//! use gdal_wrap::gdal_native::GdalLibrary;
//! use gdal_wrap::{ObjectKind, Session, Value};
//!
//! let session = Session::new(GdalLibrary::new());
//! let ptr = GdalLibrary::open("fixtures/roads.geojson", false).unwrap();
//! let ds = session.adopt(ptr, ObjectKind::Dataset).unwrap();
//! let layer = ds.call("getLayer", &GdalLibrary::INDEX, &[Value::Int(0)]).unwrap();
//! println!("{}", layer.as_wrapper().unwrap());
//! ds.dispose();
//! ```

use std::ffi::{c_void, CString};
use std::path::Path;

use gdal_sys::{CPLErr, OGRErr};
use libc::{c_char, c_int};
use log::debug;

use crate::errors::{GdalWrapError, Result};
use crate::handle::{NativeHandle, ObjectKind};
use crate::marshal::{Expected, Param};
use crate::native::{
    required_arg, unsupported_method, NativeArg, NativeLibrary, NativeObject, NativeValue,
};
use crate::ownership::{OwnershipPolicy, Release};
use crate::utils::{
    _last_cpl_err, _last_err_msg, _last_null_pointer_err, _path_to_c_string, _string,
};

/// The process-wide GDAL library.
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalLibrary;

impl GdalLibrary {
    /// Parameters of `getLayer` and `getRasterBand`.
    pub const INDEX: [Param; 1] = [Param::required("index", Expected::Integer)];
    /// Parameters of `executeSQL`.
    pub const EXECUTE_SQL: [Param; 2] = [
        Param::required("statement", Expected::String),
        Param::optional("dialect", Expected::String),
    ];
    /// Parameters of `getFeatureCount`.
    pub const FEATURE_COUNT: [Param; 1] = [Param::optional("force", Expected::Boolean)];
    /// Parameters of `testCapability`.
    pub const CAPABILITY: [Param; 1] = [Param::required("capability", Expected::String)];

    /// Registers all drivers.
    pub fn new() -> GdalLibrary {
        unsafe { gdal_sys::GDALAllRegister() };
        GdalLibrary
    }

    /// Open a dataset. The returned pointer is meant for
    /// [`Session::adopt`](crate::Session::adopt).
    pub fn open<P: AsRef<Path>>(path: P, update: bool) -> Result<*mut c_void> {
        let c_path = _path_to_c_string(path.as_ref())?;
        let mut flags = gdal_sys::GDAL_OF_VERBOSE_ERROR;
        if update {
            flags |= gdal_sys::GDAL_OF_UPDATE;
        }
        let c_dataset = unsafe {
            gdal_sys::GDALOpenEx(
                c_path.as_ptr(),
                flags,
                std::ptr::null(),
                std::ptr::null(),
                std::ptr::null(),
            )
        };
        if c_dataset.is_null() {
            return Err(_last_null_pointer_err("GDALOpenEx"));
        }
        Ok(c_dataset)
    }
}

fn check_ogr(rv: OGRErr::Type, method_name: &'static str) -> Result<()> {
    if rv as c_int != OGRErr::OGRERR_NONE as c_int {
        let last = _last_err_msg();
        return Err(GdalWrapError::from_ogr_err(rv as c_int, method_name, Some(&last)));
    }
    Ok(())
}

fn check_cpl() -> Result<()> {
    let cpl_err = unsafe { gdal_sys::CPLGetLastErrorType() };
    if cpl_err != CPLErr::CE_None {
        return Err(_last_cpl_err(cpl_err));
    }
    Ok(())
}

fn string_result(raw: *const c_char) -> NativeValue {
    _string(raw).map_or(NativeValue::Null, NativeValue::Str)
}

fn int_arg(args: &[NativeArg], position: usize, name: &str) -> Result<i64> {
    required_arg(args, position, name)?.as_int().ok_or_else(|| {
        GdalWrapError::invalid_argument(position, name, format!("{name} must be an integer"))
    })
}

fn c_index(args: &[NativeArg], position: usize, name: &str) -> Result<c_int> {
    let index = int_arg(args, position, name)?;
    c_int::try_from(index).map_err(|_| {
        GdalWrapError::invalid_argument(position, name, format!("{name} is out of range"))
    })
}

fn str_arg<'a>(
    args: &'a [NativeArg],
    position: usize,
    name: &str,
) -> Result<&'a std::ffi::CStr> {
    required_arg(args, position, name)?.as_c_str().ok_or_else(|| {
        GdalWrapError::invalid_argument(position, name, format!("{name} must be a string"))
    })
}

fn child(ptr: *mut c_void, parent: *mut c_void) -> NativeObject {
    NativeObject::borrowed(ptr).with_parent(parent)
}

impl GdalLibrary {
    fn invoke_layer(
        &self,
        layer: *mut c_void,
        method: &str,
        args: &[NativeArg],
    ) -> Result<NativeValue> {
        let value = match method {
            "getName" => string_result(unsafe { gdal_sys::OGR_L_GetName(layer) }),
            "getFeatureCount" => {
                let force = args.first().and_then(NativeArg::as_bool).unwrap_or(true);
                let count = unsafe { gdal_sys::OGR_L_GetFeatureCount(layer, force as c_int) };
                NativeValue::Int(count)
            }
            "syncToDisk" => {
                let rv = unsafe { gdal_sys::OGR_L_SyncToDisk(layer) };
                check_ogr(rv, "OGR_L_SyncToDisk")?;
                NativeValue::Null
            }
            "testCapability" => {
                let capability = str_arg(args, 0, "capability")?;
                let rv = unsafe { gdal_sys::OGR_L_TestCapability(layer, capability.as_ptr()) };
                NativeValue::Bool(rv == 1)
            }
            "getLayerDefn" => {
                let c_defn = unsafe { gdal_sys::OGR_L_GetLayerDefn(layer) };
                NativeValue::Object(ObjectKind::FeatureDefn, NativeObject::borrowed(c_defn))
            }
            _ => return Err(unsupported_method(ObjectKind::Layer, method)),
        };
        Ok(value)
    }

    fn invoke_band(&self, band: *mut c_void, method: &str) -> Result<NativeValue> {
        let value = match method {
            "getXSize" => {
                NativeValue::Int(unsafe { gdal_sys::GDALGetRasterBandXSize(band) }.into())
            }
            "getYSize" => {
                NativeValue::Int(unsafe { gdal_sys::GDALGetRasterBandYSize(band) }.into())
            }
            "flush" => {
                unsafe { gdal_sys::CPLErrorReset() };
                let rv = unsafe { gdal_sys::GDALFlushRasterCache(band) };
                if rv != CPLErr::CE_None {
                    return Err(_last_cpl_err(rv));
                }
                NativeValue::Null
            }
            "getMaskFlags" => {
                NativeValue::Int(unsafe { gdal_sys::GDALGetMaskFlags(band) }.into())
            }
            "getMaskBand" => {
                let c_mask = unsafe { gdal_sys::GDALGetMaskBand(band) };
                NativeValue::Object(ObjectKind::RasterBand, child(c_mask, band))
            }
            _ => return Err(unsupported_method(ObjectKind::RasterBand, method)),
        };
        Ok(value)
    }

    fn invoke_geometry(
        &self,
        kind: ObjectKind,
        geom: *mut c_void,
        method: &str,
    ) -> Result<NativeValue> {
        let value = match method {
            "toWKT" => {
                let mut c_wkt: *mut c_char = std::ptr::null_mut();
                let rv = unsafe { gdal_sys::OGR_G_ExportToWkt(geom, &mut c_wkt) };
                let wkt = _string(c_wkt);
                unsafe { gdal_sys::VSIFree(c_wkt as *mut c_void) };
                check_ogr(rv, "OGR_G_ExportToWkt")?;
                wkt.map_or(NativeValue::Null, NativeValue::Str)
            }
            "isEmpty" => NativeValue::Bool(unsafe { gdal_sys::OGR_G_IsEmpty(geom) } == 1),
            "isValid" => NativeValue::Bool(unsafe { gdal_sys::OGR_G_IsValid(geom) } == 1),
            "getDimension" => {
                NativeValue::Int(unsafe { gdal_sys::OGR_G_GetDimension(geom) }.into())
            }
            "clone" => {
                let c_clone = unsafe { gdal_sys::OGR_G_Clone(geom) };
                if c_clone.is_null() {
                    return Err(_last_null_pointer_err("OGR_G_Clone"));
                }
                NativeValue::Geometry(NativeObject::owned(c_clone))
            }
            _ => return Err(unsupported_method(kind, method)),
        };
        Ok(value)
    }

    fn invoke_defn(&self, defn: *mut c_void, method: &str) -> Result<NativeValue> {
        let value = match method {
            "getName" => string_result(unsafe { gdal_sys::OGR_FD_GetName(defn) }),
            "getFieldCount" => {
                NativeValue::Int(unsafe { gdal_sys::OGR_FD_GetFieldCount(defn) }.into())
            }
            "getGeomType" => {
                NativeValue::Int(unsafe { gdal_sys::OGR_FD_GetGeomType(defn) } as i64)
            }
            _ => return Err(unsupported_method(ObjectKind::FeatureDefn, method)),
        };
        Ok(value)
    }

    fn invoke_dataset(
        &self,
        ds: *mut c_void,
        method: &str,
        args: &[NativeArg],
    ) -> Result<NativeValue> {
        let value = match method {
            "getLayerCount" => {
                NativeValue::Int(unsafe { gdal_sys::GDALDatasetGetLayerCount(ds) }.into())
            }
            "getRasterCount" => {
                NativeValue::Int(unsafe { gdal_sys::GDALGetRasterCount(ds) }.into())
            }
            "getLayer" => {
                let index = c_index(args, 0, "index")?;
                let c_layer = unsafe { gdal_sys::GDALDatasetGetLayer(ds, index) };
                if c_layer.is_null() {
                    return Err(_last_null_pointer_err("GDALDatasetGetLayer"));
                }
                NativeValue::Object(ObjectKind::Layer, child(c_layer, ds))
            }
            "getRasterBand" => {
                let index = c_index(args, 0, "index")?;
                let c_band = unsafe { gdal_sys::GDALGetRasterBand(ds, index) };
                if c_band.is_null() {
                    return Err(_last_null_pointer_err("GDALGetRasterBand"));
                }
                NativeValue::Object(ObjectKind::RasterBand, child(c_band, ds))
            }
            "executeSQL" => {
                let statement = str_arg(args, 0, "statement")?;
                let dialect = args.get(1).and_then(NativeArg::as_c_str);
                let dialect_ptr = dialect.map_or(std::ptr::null(), |d| d.as_ptr());
                unsafe { gdal_sys::CPLErrorReset() };
                let c_layer = unsafe {
                    gdal_sys::GDALDatasetExecuteSQL(
                        ds,
                        statement.as_ptr(),
                        std::ptr::null_mut(),
                        dialect_ptr,
                    )
                };
                check_cpl()?;
                if c_layer.is_null() {
                    NativeValue::Null
                } else {
                    NativeValue::Object(
                        ObjectKind::Layer,
                        child(c_layer, ds).with_policy(OwnershipPolicy::RESULT_SET),
                    )
                }
            }
            _ => return Err(unsupported_method(ObjectKind::Dataset, method)),
        };
        Ok(value)
    }

    fn invoke_feature(&self, feature: *mut c_void, method: &str) -> Result<NativeValue> {
        let value = match method {
            "getFID" => NativeValue::Int(unsafe { gdal_sys::OGR_F_GetFID(feature) }),
            "getGeometryRef" => {
                let c_geom = unsafe { gdal_sys::OGR_F_GetGeometryRef(feature) };
                if c_geom.is_null() {
                    NativeValue::Null
                } else {
                    NativeValue::Geometry(child(c_geom, feature))
                }
            }
            _ => return Err(unsupported_method(ObjectKind::Feature, method)),
        };
        Ok(value)
    }

    fn invoke_srs(&self, srs: *mut c_void, method: &str) -> Result<NativeValue> {
        match method {
            "toWKT" => {
                let mut c_wkt: *mut c_char = std::ptr::null_mut();
                let rv = unsafe { gdal_sys::OSRExportToWkt(srs, &mut c_wkt) };
                let wkt = _string(c_wkt);
                unsafe { gdal_sys::VSIFree(c_wkt as *mut c_void) };
                check_ogr(rv, "OSRExportToWkt")?;
                Ok(wkt.map_or(NativeValue::Null, NativeValue::Str))
            }
            _ => Err(unsupported_method(ObjectKind::SpatialRef, method)),
        }
    }
}

impl NativeLibrary for GdalLibrary {
    fn release(&self, release: Release) -> Result<()> {
        unsafe { gdal_sys::CPLErrorReset() };
        match release {
            Release::DestroyGeometry(h) => unsafe { gdal_sys::OGR_G_DestroyGeometry(h.as_ptr()) },
            Release::DestroyFeature(h) => unsafe { gdal_sys::OGR_F_Destroy(h.as_ptr()) },
            Release::ReleaseDefn(h) => unsafe { gdal_sys::OGR_FD_Release(h.as_ptr()) },
            Release::ReleaseSpatialRef(h) => unsafe { gdal_sys::OSRRelease(h.as_ptr()) },
            Release::CloseDataset(h) => {
                unsafe {
                    gdal_sys::GDALClose(h.as_ptr());
                }
            }
            Release::ReleaseResultSet { dataset, layer } => unsafe {
                gdal_sys::GDALDatasetReleaseResultSet(dataset.as_ptr(), layer.as_ptr())
            },
        }
        check_cpl()
    }

    fn dependents(&self, kind: ObjectKind, handle: NativeHandle) -> Vec<NativeHandle> {
        let ptr = unsafe { handle.as_ptr() };
        let mut found = Vec::new();
        match kind {
            ObjectKind::RasterBand => {
                let count = unsafe { gdal_sys::GDALGetOverviewCount(ptr) };
                for i in 0..count {
                    found.push(unsafe { gdal_sys::GDALGetOverview(ptr, i) });
                }
                found.push(unsafe { gdal_sys::GDALGetMaskBand(ptr) });
            }
            ObjectKind::Dataset => {
                let bands = unsafe { gdal_sys::GDALGetRasterCount(ptr) };
                for i in 1..=bands {
                    found.push(unsafe { gdal_sys::GDALGetRasterBand(ptr, i) });
                }
                let layers = unsafe { gdal_sys::GDALDatasetGetLayerCount(ptr) };
                for i in 0..layers {
                    found.push(unsafe { gdal_sys::GDALDatasetGetLayer(ptr, i) });
                }
            }
            _ => {}
        }
        found.into_iter().filter_map(NativeHandle::from_ptr).collect()
    }

    fn geometry_discriminant(&self, handle: NativeHandle) -> Result<(u32, String)> {
        let ptr = unsafe { handle.as_ptr() };
        let code = unsafe { gdal_sys::OGR_G_GetGeometryType(ptr) } as u32;
        let name = _string(unsafe { gdal_sys::OGR_G_GetGeometryName(ptr) }).unwrap_or_default();
        Ok((code, name))
    }

    fn reference_defn(&self, handle: NativeHandle) -> Result<()> {
        let count = unsafe { gdal_sys::OGR_FD_Reference(handle.as_ptr()) };
        debug!("FeatureDefn {:?} reference count {}", handle, count);
        Ok(())
    }

    fn clone_defn(&self, handle: NativeHandle) -> Result<*mut c_void> {
        let src = unsafe { handle.as_ptr() };
        let name = _string(unsafe { gdal_sys::OGR_FD_GetName(src) }).unwrap_or_default();
        let c_name = CString::new(name)?;
        let copy = unsafe { gdal_sys::OGR_FD_Create(c_name.as_ptr()) };
        if copy.is_null() {
            return Err(_last_null_pointer_err("OGR_FD_Create"));
        }
        unsafe {
            let fields = gdal_sys::OGR_FD_GetFieldCount(src);
            for i in 0..fields {
                gdal_sys::OGR_FD_AddFieldDefn(copy, gdal_sys::OGR_FD_GetFieldDefn(src, i));
            }
            gdal_sys::OGR_FD_SetGeomType(copy, gdal_sys::OGR_FD_GetGeomType(src));
        }
        Ok(copy)
    }

    fn invoke(
        &self,
        kind: ObjectKind,
        handle: NativeHandle,
        method: &str,
        args: &[NativeArg],
    ) -> Result<NativeValue> {
        let ptr = unsafe { handle.as_ptr() };
        match kind {
            ObjectKind::Layer => self.invoke_layer(ptr, method, args),
            ObjectKind::RasterBand => self.invoke_band(ptr, method),
            ObjectKind::Geometry(_) => self.invoke_geometry(kind, ptr, method),
            ObjectKind::FeatureDefn => self.invoke_defn(ptr, method),
            ObjectKind::Dataset => self.invoke_dataset(ptr, method, args),
            ObjectKind::Feature => self.invoke_feature(ptr, method),
            ObjectKind::SpatialRef => self.invoke_srs(ptr, method),
        }
    }

    fn describe(&self, kind: ObjectKind, handle: NativeHandle) -> Option<String> {
        let ptr = unsafe { handle.as_ptr() };
        match kind {
            ObjectKind::Layer => _string(unsafe { gdal_sys::OGR_L_GetName(ptr) }),
            ObjectKind::FeatureDefn => _string(unsafe { gdal_sys::OGR_FD_GetName(ptr) }),
            ObjectKind::Dataset => _string(unsafe { gdal_sys::GDALGetDescription(ptr) }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Session;

    #[test]
    fn test_geometry_round_trip_through_session() {
        let session = Session::new(GdalLibrary::new());
        let wkt = CString::new("LINESTRING (0 0, 1 1)").unwrap();
        let mut c_wkt = wkt.as_ptr() as *mut c_char;
        let mut c_geom: *mut c_void = std::ptr::null_mut();
        let rv = unsafe {
            gdal_sys::OGR_G_CreateFromWkt(&mut c_wkt, std::ptr::null_mut(), &mut c_geom)
        };
        assert_eq!(rv as c_int, OGRErr::OGRERR_NONE as c_int);

        let geom = session
            .wrap_geometry(c_geom, crate::WrapOptions::owned())
            .unwrap()
            .unwrap();
        assert_eq!(geom.type_name(), "LineString");
        assert_eq!(
            geom.invoke("toWKT", &[]).unwrap(),
            NativeValue::Str("LINESTRING (0 0,1 1)".to_string())
        );
        let copy = geom.call("clone", &[], &[]).unwrap();
        let copy = copy.as_wrapper().unwrap();
        assert!(copy.is_owned());
        assert_ne!(copy, &geom);
        copy.dispose();
        geom.dispose();
    }

    #[test]
    fn test_open_missing_dataset() {
        let err = GdalLibrary::open("fixtures/does-not-exist.tif", false).unwrap_err();
        assert!(matches!(
            err,
            GdalWrapError::NullPointer {
                method_name: "GDALOpenEx",
                ..
            }
        ));
    }
}
