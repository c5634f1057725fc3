//! Conversion of caller arguments to native arguments.
//!
//! Each operation declares its parameters as a list of [`Param`]s. Arguments
//! are checked in order; the first mismatch is reported as
//! [`GdalWrapError::InvalidArgument`] with the argument's position and name,
//! and the native operation is not called.

use std::ffi::CString;

use crate::errors::{GdalWrapError, Result};
use crate::handle::KindFamily;
use crate::native::NativeArg;
use crate::wrapper::Wrapper;

/// A caller-side value: an argument to, or result of, a wrapped operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Wrapper),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_wrapper(&self) -> Option<&Wrapper> {
        match self {
            Value::Object(w) => Some(w),
            _ => None,
        }
    }

    pub fn into_wrapper(self) -> Option<Wrapper> {
        match self {
            Value::Object(w) => Some(w),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i.into())
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Wrapper> for Value {
    fn from(w: Wrapper) -> Self {
        Value::Object(w)
    }
}

impl From<Option<Wrapper>> for Value {
    fn from(w: Option<Wrapper>) -> Self {
        w.map_or(Value::Null, Value::Object)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

/// What a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Expected {
    String,
    Integer,
    /// Any number; integers are widened.
    Double,
    Boolean,
    Array,
    /// A live wrapper of the given kind.
    Wrapped(KindFamily),
    /// An integer from a fixed set of codes.
    Enum {
        type_name: &'static str,
        allowed: &'static [i64],
    },
    /// An integer in `min..=max`.
    Range { min: i64, max: i64 },
}

/// One declared parameter of a wrapped operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Param {
    pub name: &'static str,
    pub expected: Expected,
    pub optional: bool,
}

impl Param {
    pub const fn required(name: &'static str, expected: Expected) -> Param {
        Param {
            name,
            expected,
            optional: false,
        }
    }

    pub const fn optional(name: &'static str, expected: Expected) -> Param {
        Param {
            name,
            expected,
            optional: true,
        }
    }
}

/// Convert `args` according to `params`.
///
/// Missing trailing optional arguments become [`NativeArg::Null`]. Arguments
/// beyond the declared parameters are ignored.
pub fn marshal_args(params: &[Param], args: &[Value]) -> Result<Vec<NativeArg>> {
    params
        .iter()
        .enumerate()
        .map(|(position, param)| marshal_arg(position, param, args.get(position)))
        .collect()
}

pub fn marshal_arg(position: usize, param: &Param, arg: Option<&Value>) -> Result<NativeArg> {
    let name = param.name;
    let invalid = |message: String| GdalWrapError::invalid_argument(position, name, message);

    let arg = match arg {
        None | Some(Value::Null) if param.optional => return Ok(NativeArg::Null),
        None | Some(Value::Null) => return Err(invalid(format!("{name} must be given"))),
        Some(arg) => arg,
    };

    match (param.expected, arg) {
        (Expected::String, Value::Str(s)) => Ok(NativeArg::Str(CString::new(s.as_str())?)),
        (Expected::String, _) => Err(invalid(format!("{name} must be a string"))),

        (Expected::Integer, Value::Int(i)) => Ok(NativeArg::Int(*i)),
        (Expected::Integer, _) => Err(invalid(format!("{name} must be an integer"))),

        (Expected::Double, Value::Double(d)) => Ok(NativeArg::Double(*d)),
        (Expected::Double, Value::Int(i)) => Ok(NativeArg::Double(*i as f64)),
        (Expected::Double, _) => Err(invalid(format!("{name} must be a number"))),

        (Expected::Boolean, Value::Bool(b)) => Ok(NativeArg::Bool(*b)),
        (Expected::Boolean, _) => Err(invalid(format!("{name} must be a boolean"))),

        (Expected::Array, Value::Array(items)) => items
            .iter()
            .map(scalar_to_native)
            .collect::<Option<Vec<_>>>()
            .map(NativeArg::Array)
            .ok_or_else(|| invalid(format!("{name} must contain only scalar values"))),
        (Expected::Array, _) => Err(invalid(format!("{name} must be an array"))),

        (Expected::Wrapped(family), Value::Object(w)) if w.kind().is_a(family) => {
            w.handle().map(NativeArg::Handle)
        }
        (Expected::Wrapped(family), _) => Err(invalid(format!(
            "{name} must be an instance of {}",
            family.type_name()
        ))),

        (Expected::Enum { type_name, allowed }, Value::Int(i)) => {
            if allowed.contains(i) {
                Ok(NativeArg::Int(*i))
            } else {
                Err(invalid(format!("unrecognized {type_name} value {i}")))
            }
        }
        (Expected::Enum { type_name, .. }, _) => {
            Err(invalid(format!("{name} must be of type {type_name}")))
        }

        (Expected::Range { min, max }, Value::Int(i)) => {
            if (min..=max).contains(i) {
                Ok(NativeArg::Int(*i))
            } else {
                Err(invalid(format!("{name} must be between {min} and {max}")))
            }
        }
        (Expected::Range { .. }, _) => Err(invalid(format!("{name} must be an integer"))),
    }
}

fn scalar_to_native(value: &Value) -> Option<NativeArg> {
    match value {
        Value::Bool(b) => Some(NativeArg::Bool(*b)),
        Value::Int(i) => Some(NativeArg::Int(*i)),
        Value::Double(d) => Some(NativeArg::Double(*d)),
        Value::Str(s) => CString::new(s.as_str()).ok().map(NativeArg::Str),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::{GeometryType, ObjectKind};
    use crate::test_utils::SpyLibrary;
    use crate::{Session, WrapOptions};

    const GEOMETRY: Expected = Expected::Wrapped(KindFamily::Geometry);
    const LAYER: Expected = Expected::Wrapped(KindFamily::Exact(ObjectKind::Layer));

    fn message(err: GdalWrapError) -> String {
        match err {
            GdalWrapError::InvalidArgument { message, .. } => message,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_scalars() {
        let params = [
            Param::required("name", Expected::String),
            Param::required("count", Expected::Integer),
            Param::required("ratio", Expected::Double),
            Param::optional("force", Expected::Boolean),
        ];
        let args = marshal_args(&params, &["roads".into(), 3.into(), 2.into()]).unwrap();
        assert_eq!(args[0].as_c_str().unwrap().to_str().unwrap(), "roads");
        assert_eq!(args[1], NativeArg::Int(3));
        assert_eq!(args[2], NativeArg::Double(2.0));
        assert_eq!(args[3], NativeArg::Null);
    }

    #[test]
    fn test_missing_required() {
        let params = [
            Param::required("x", Expected::Double),
            Param::required("y", Expected::Double),
        ];
        let err = marshal_args(&params, &[1.5.into()]).unwrap_err();
        assert_eq!(
            err,
            GdalWrapError::InvalidArgument {
                position: 1,
                name: "y".to_string(),
                message: "y must be given".to_string(),
            }
        );
        let err = marshal_args(&params, &[Value::Null, 1.5.into()]).unwrap_err();
        assert_eq!(err.to_string(), "argument 0 (x): x must be given");
    }

    #[test]
    fn test_type_mismatch_messages() {
        let cases = [
            (Expected::String, Value::Int(1), "p must be a string"),
            (Expected::Integer, Value::Double(1.5), "p must be an integer"),
            (Expected::Double, Value::Str("1".into()), "p must be a number"),
            (Expected::Boolean, Value::Int(1), "p must be a boolean"),
            (Expected::Array, Value::Int(1), "p must be an array"),
            (GEOMETRY, Value::Int(1), "p must be an instance of Geometry"),
        ];
        for (expected, arg, want) in cases {
            let err = marshal_arg(0, &Param::required("p", expected), Some(&arg)).unwrap_err();
            assert_eq!(message(err), want);
        }
    }

    #[test]
    fn test_enum_and_range() {
        const ACCESS: Expected = Expected::Enum {
            type_name: "GDALAccess",
            allowed: &[0, 1],
        };
        let param = Param::required("access", ACCESS);
        assert_eq!(marshal_arg(0, &param, Some(&1.into())).unwrap(), NativeArg::Int(1));
        let err = marshal_arg(0, &param, Some(&7.into())).unwrap_err();
        assert_eq!(message(err), "unrecognized GDALAccess value 7");

        let param = Param::required("band", Expected::Range { min: 1, max: 3 });
        assert_eq!(marshal_arg(0, &param, Some(&3.into())).unwrap(), NativeArg::Int(3));
        let err = marshal_arg(0, &param, Some(&4.into())).unwrap_err();
        assert_eq!(message(err), "band must be between 1 and 3");
    }

    #[test]
    fn test_array() {
        let param = Param::required("bands", Expected::Array);
        let arg: Value = vec![1i64, 2].into();
        assert_eq!(
            marshal_arg(0, &param, Some(&arg)).unwrap(),
            NativeArg::Array(vec![NativeArg::Int(1), NativeArg::Int(2)])
        );
        let nested = Value::Array(vec![Value::Array(vec![])]);
        assert!(marshal_arg(0, &param, Some(&nested)).is_err());
    }

    #[test]
    fn test_wrapped_arguments() {
        let native = SpyLibrary::new();
        let session = Session::new(native.clone());
        let ring = native.alloc_geometry(101, "LINEARRING");
        let ring = session
            .wrap_geometry(ring, WrapOptions::owned())
            .unwrap()
            .unwrap();
        assert_eq!(ring.kind(), ObjectKind::Geometry(GeometryType::LinearRing));

        let arg = Value::from(ring.clone());
        let param = Param::required("geom", GEOMETRY);
        assert_eq!(
            marshal_arg(0, &param, Some(&arg)).unwrap(),
            NativeArg::Handle(ring.handle().unwrap())
        );

        let err = marshal_arg(2, &Param::required("layer", LAYER), Some(&arg)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "argument 2 (layer): layer must be an instance of Layer"
        );

        ring.dispose();
        assert_eq!(
            marshal_arg(0, &param, Some(&arg)),
            Err(GdalWrapError::DestroyedObject {
                type_name: "LinearRing"
            })
        );
    }
}
