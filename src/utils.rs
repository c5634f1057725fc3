use std::ffi::{CStr, CString};
use std::path::Path;

use gdal_sys::CPLErr;
use libc::c_char;

use crate::errors::{CplErrType, GdalWrapError, Result};

pub(crate) fn _string(raw_ptr: *const c_char) -> Option<String> {
    if raw_ptr.is_null() {
        return None;
    }
    let c_str = unsafe { CStr::from_ptr(raw_ptr) };
    Some(c_str.to_string_lossy().into_owned())
}

pub(crate) fn _last_cpl_err(cpl_err_class: CPLErr::Type) -> GdalWrapError {
    let last_err_no = unsafe { gdal_sys::CPLGetLastErrorNo() };
    let last_err_msg = _last_err_msg();
    unsafe { gdal_sys::CPLErrorReset() };
    GdalWrapError::CplError {
        class: CplErrType::from(cpl_err_class as u32),
        number: last_err_no,
        msg: last_err_msg,
    }
}

pub(crate) fn _last_null_pointer_err(method_name: &'static str) -> GdalWrapError {
    let last_err_msg = _last_err_msg();
    unsafe { gdal_sys::CPLErrorReset() };
    GdalWrapError::NullPointer {
        method_name,
        msg: last_err_msg,
    }
}

pub(crate) fn _last_err_msg() -> String {
    _string(unsafe { gdal_sys::CPLGetLastErrorMsg() }).unwrap_or_default()
}

pub(crate) fn _path_to_c_string(path: &Path) -> Result<CString> {
    let path_str = path.to_string_lossy();
    CString::new(path_str.as_ref()).map_err(Into::into)
}
