use std::ffi::NulError;
use std::str::Utf8Error;

use libc::c_int;
use thiserror::Error;

use crate::handle::NativeHandle;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GdalWrapError>;

#[derive(Clone, PartialEq, Debug, Error)]
pub enum GdalWrapError {
    #[error("{type_name} object has already been destroyed")]
    DestroyedObject { type_name: &'static str },
    #[error("argument {position} ({name}): {message}")]
    InvalidArgument {
        position: usize,
        name: String,
        message: String,
    },
    #[error("CPL error class: '{class:?}', error number: '{number}', error msg: '{msg}'")]
    CplError {
        class: CplErrType,
        number: c_int,
        msg: String,
    },
    #[error("OGR method '{method_name}' returned error {err}: '{msg}'")]
    OgrError {
        err: c_int,
        method_name: &'static str,
        msg: String,
    },
    #[error("GDAL method '{method_name}' returned a NULL pointer. Error msg: '{msg}'")]
    NullPointer {
        method_name: &'static str,
        msg: String,
    },
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    #[error("{child}'s parent object disappeared from cache (parent = {parent:?})")]
    ParentEvicted {
        child: &'static str,
        parent: NativeHandle,
    },
    #[error("Native object {0:?} is already wrapped")]
    DuplicateHandle(NativeHandle),
    #[error("Invalid value '{value}' for option '{key}'")]
    BadOption { key: String, value: String },
    #[error("FfiNulError")]
    FfiNulError(#[from] NulError),
    #[error("StrUtf8Error")]
    StrUtf8Error(#[from] Utf8Error),
}

impl GdalWrapError {
    pub(crate) fn invalid_argument(
        position: usize,
        name: &str,
        message: impl Into<String>,
    ) -> Self {
        GdalWrapError::InvalidArgument {
            position,
            name: name.to_string(),
            message: message.into(),
        }
    }

    /// Build an [`GdalWrapError::OgrError`] from an `OGRErr` code.
    ///
    /// `last_msg` is the native library's last error text; it replaces the
    /// generic "Failure" message when the code is `OGRERR_FAILURE`.
    pub fn from_ogr_err(err: c_int, method_name: &'static str, last_msg: Option<&str>) -> Self {
        let msg = match (err, last_msg) {
            (OGRERR_FAILURE, Some(last)) if !last.is_empty() => last.to_string(),
            _ => ogr_err_message(err).to_string(),
        };
        GdalWrapError::OgrError {
            err,
            method_name,
            msg,
        }
    }

    /// Whether this error reports a failure inside the native library.
    pub fn is_native(&self) -> bool {
        matches!(
            self,
            GdalWrapError::CplError { .. }
                | GdalWrapError::OgrError { .. }
                | GdalWrapError::NullPointer { .. }
        )
    }
}

const OGRERR_FAILURE: c_int = 6;

/// Static message table for the `OGRErr` code domain.
pub fn ogr_err_message(err: c_int) -> &'static str {
    match err {
        0 => "No error",
        1 => "Not enough data",
        2 => "Not enough memory",
        3 => "Unsupported geometry type",
        4 => "Unsupported operation",
        5 => "Corrupt Data",
        6 => "Failure",
        7 => "Unsupported SRS",
        _ => "Invalid Error",
    }
}

/// Type of error returned by the CPL error domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CplErrType {
    None = 0,
    Debug,
    Warning,
    Failure,
    Fatal,
}

impl From<u32> for CplErrType {
    fn from(error_type: u32) -> Self {
        if error_type > 4 {
            return Self::None; // fallback type, should not happen
        }

        match error_type {
            1 => Self::Debug,
            2 => Self::Warning,
            3 => Self::Failure,
            4 => Self::Fatal,
            _ => Self::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ogr_err_table() {
        assert_eq!(ogr_err_message(0), "No error");
        assert_eq!(ogr_err_message(3), "Unsupported geometry type");
        assert_eq!(ogr_err_message(7), "Unsupported SRS");
        assert_eq!(ogr_err_message(42), "Invalid Error");
    }

    #[test]
    fn test_failure_prefers_last_error_text() {
        let err = GdalWrapError::from_ogr_err(6, "OGR_L_SyncToDisk", Some("disk full"));
        assert_eq!(
            err.to_string(),
            "OGR method 'OGR_L_SyncToDisk' returned error 6: 'disk full'"
        );

        let err = GdalWrapError::from_ogr_err(6, "OGR_L_SyncToDisk", Some(""));
        assert!(err.to_string().ends_with("'Failure'"));

        let err = GdalWrapError::from_ogr_err(5, "OGR_G_ImportFromWkb", Some("ignored"));
        assert!(err.to_string().ends_with("'Corrupt Data'"));
        assert!(err.is_native());
    }

    #[test]
    fn test_destroyed_message() {
        let err = GdalWrapError::DestroyedObject {
            type_name: "RasterBand",
        };
        assert_eq!(err.to_string(), "RasterBand object has already been destroyed");
        assert!(!err.is_native());
    }

    #[test]
    fn test_cpl_err_type() {
        assert_eq!(CplErrType::from(3), CplErrType::Failure);
        assert_eq!(CplErrType::from(4), CplErrType::Fatal);
        assert_eq!(CplErrType::from(99), CplErrType::None);
    }
}
