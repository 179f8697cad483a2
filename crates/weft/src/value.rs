//! The runtime value model.
//!
//! Templates are dynamically typed over a statically typed host, so every
//! runtime quantity is one arm of the [`Value`] sum. All operations here are
//! total: truthiness, equality, and string coercion are defined for every
//! variant, and anything partial (ordering, iteration, arithmetic) reports
//! through the error channel instead of panicking.

use std::{
    cmp::Ordering,
    fmt::{self, Write},
    sync::Arc,
};

use indexmap::IndexMap;
use serde::ser::{Serialize, Serializer};

use crate::{
    exception::TemplateError,
    namespace::{MacroValue, TemplateNamespace},
    undefined::{UndefinedPolicy, undefined_policy},
};

/// Host attribute access for opaque values.
///
/// Host entities exposed to templates implement this trait; the evaluator
/// consults it after the built-in attribute paths. `attr` receives the
/// literal name first; if that misses, the evaluator retries with the first
/// letter capitalized, matching host conventions that export capitalized
/// identifiers.
pub trait AttrAccess: fmt::Debug + Send + Sync {
    /// Looks up an attribute by exact name.
    fn attr(self: Arc<Self>, name: &str) -> Option<Value>;

    /// Looks up an item by key. Defaults to no item support.
    fn item(self: Arc<Self>, key: &Value) -> Option<Value> {
        let _ = key;
        None
    }

    /// Short type name used in error messages and rendered output.
    fn type_name(&self) -> &'static str;

    /// String form used when the object lands in output position.
    fn render(&self) -> String {
        format!("<{}>", self.type_name())
    }
}

/// The callable shape behind [`HostFunction`] and the `Callable` arm.
type HostFn = dyn Fn(&[Value], &IndexMap<String, Value>) -> Result<Value, TemplateError> + Send + Sync;

/// A host function callable from templates.
///
/// Receives positional arguments and named arguments; returns a value or a
/// template error. Cloning is cheap (shared pointer).
#[derive(Clone)]
pub struct HostFunction(Arc<HostFn>);

impl HostFunction {
    pub fn new(
        f: impl Fn(&[Value], &IndexMap<String, Value>) -> Result<Value, TemplateError> + Send + Sync + 'static,
    ) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, positional: &[Value], named: &IndexMap<String, Value>) -> Result<Value, TemplateError> {
        (self.0)(positional, named)
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for HostFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostFunction(..)")
    }
}

/// Primary runtime value type.
///
/// `Dict` preserves insertion order; that ordering is part of the data model
/// (iteration, `items()`, and rendering all follow it).
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// A string marked as already escaped; the autoescaper passes it through.
    Safe(String),
    List(Vec<Value>),
    Dict(IndexMap<String, Value>),
    /// A host function.
    Callable(HostFunction),
    /// A template macro closing over its definition context.
    Macro(Arc<MacroValue>),
    /// The exported view of an imported template.
    Namespace(Arc<TemplateNamespace>),
    /// An opaque host entity with attribute/item access shims.
    Object(Arc<dyn AttrAccess>),
    /// Placeholder for a missing binding under a non-strict policy.
    /// Carries the originating name for diagnostics.
    Undefined { name: String },
}

impl Value {
    /// Builds the undefined placeholder for `name`.
    #[must_use]
    pub fn undefined(name: impl Into<String>) -> Self {
        Self::Undefined { name: name.into() }
    }

    /// Short type name used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) | Self::Safe(_) => "string",
            Self::List(_) => "list",
            Self::Dict(_) => "dict",
            Self::Callable(_) => "function",
            Self::Macro(_) => "macro",
            Self::Namespace(_) => "namespace",
            Self::Object(obj) => obj.type_name(),
            Self::Undefined { .. } => "undefined",
        }
    }

    /// Truthiness, total over all variants.
    ///
    /// `None`, `false`, numeric zero, empty string/list/dict, and `Undefined`
    /// are falsy; everything else is truthy.
    #[must_use]
    pub fn truthy(&self) -> bool {
        match self {
            Self::None | Self::Undefined { .. } => false,
            Self::Bool(b) => *b,
            Self::Int(v) => *v != 0,
            Self::Float(v) => *v != 0.0,
            Self::String(s) | Self::Safe(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Dict(map) => !map.is_empty(),
            Self::Callable(_) | Self::Macro(_) | Self::Namespace(_) | Self::Object(_) => true,
        }
    }

    /// The string content when this value is string-shaped.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Safe(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view for arithmetic coercion. Bools are intentionally not
    /// numeric here.
    #[must_use]
    pub(crate) fn as_number(&self) -> Option<Num> {
        match self {
            Self::Int(v) => Some(Num::Int(*v)),
            Self::Float(v) => Some(Num::Float(*v)),
            _ => None,
        }
    }

    /// Integer view for indexing and slice bounds.
    #[must_use]
    pub(crate) fn as_index(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// String form for output position: `None` and `Undefined` (silent
    /// policy) render as nothing, `Undefined` under the debug policy renders
    /// as a diagnostic marker, everything else uses the display coercion.
    #[must_use]
    pub fn output_string(&self) -> String {
        match self {
            Self::None => String::new(),
            Self::Undefined { name } => match undefined_policy() {
                UndefinedPolicy::Debug => format!("[Undefined: {name}]"),
                _ => String::new(),
            },
            other => other.to_string(),
        }
    }

    /// Writes the value the way it appears inside a rendered container:
    /// strings are quoted, nested containers recurse.
    fn write_repr(&self, out: &mut String) {
        match self {
            Self::String(s) | Self::Safe(s) => {
                let _ = write!(out, "{s:?}");
            }
            Self::List(items) => {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    item.write_repr(out);
                }
                out.push(']');
            }
            Self::Dict(map) => {
                out.push('{');
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    let _ = write!(out, "{key:?}: ");
                    value.write_repr(out);
                }
                out.push('}');
            }
            other => {
                let _ = write!(out, "{other}");
            }
        }
    }

    /// Total ordering attempt for `<`, `<=`, `>`, `>=`.
    ///
    /// Comparable pairs: numbers with numbers, strings with strings, bools
    /// with bools, lists elementwise. Everything else is incomparable and
    /// the caller raises `TypeError`.
    #[must_use]
    pub(crate) fn try_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::String(a) | Self::Safe(a), Self::String(b) | Self::Safe(b)) => Some(a.cmp(b)),
            (Self::List(a), Self::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.try_cmp(y)? {
                        Ordering::Equal => {}
                        other => return Some(other),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            _ => {
                let (a, b) = (self.as_number()?, other.as_number()?);
                a.as_f64().partial_cmp(&b.as_f64())
            }
        }
    }

    /// Projects the value into a sequence for iteration.
    ///
    /// `None` and `Undefined` are empty, lists iterate as-is, dicts iterate
    /// their keys in insertion order, strings iterate per character, and a
    /// callable taking no arguments is invoked with its result projected
    /// recursively. Anything else is not iterable.
    pub(crate) fn make_iterable(&self) -> Result<Vec<Self>, TemplateError> {
        match self {
            Self::None | Self::Undefined { .. } => Ok(Vec::new()),
            Self::List(items) => Ok(items.clone()),
            Self::Dict(map) => Ok(map.keys().map(|k| Self::String(k.clone())).collect()),
            Self::String(s) | Self::Safe(s) => Ok(s.chars().map(|c| Self::String(c.to_string())).collect()),
            Self::Callable(f) => f.call(&[], &IndexMap::new())?.make_iterable(),
            other => Err(TemplateError::type_error(format!(
                "value of type {} is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Iteration projection for unpacking targets.
    ///
    /// Identical to [`make_iterable`](Self::make_iterable), except a dict
    /// iterated with two targets yields `[key, value]` pairs so
    /// `{% for k, v in mapping %}` works.
    pub(crate) fn make_iterable_for_unpack(&self, arity: usize) -> Result<Vec<Self>, TemplateError> {
        if arity == 2
            && let Self::Dict(map) = self
        {
            return Ok(map
                .iter()
                .map(|(k, v)| Self::List(vec![Self::String(k.clone()), v.clone()]))
                .collect());
        }
        self.make_iterable()
    }

    /// Converts a JSON document into a runtime value.
    ///
    /// Objects become `Dict` (insertion order preserved), arrays become
    /// `List`, numbers map to `Int` when they fit and `Float` otherwise.
    #[must_use]
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::None,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            serde_json::Value::Object(map) => {
                Self::Dict(map.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }

    /// Converts the value into a JSON document.
    ///
    /// Callables, macros, namespaces, and host objects have no JSON shape
    /// and serialize as diagnostic placeholder strings; `Undefined` becomes
    /// `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::None | Self::Undefined { .. } => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Float(v) => serde_json::Value::from(*v),
            Self::String(s) | Self::Safe(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Dict(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::Callable(_) => serde_json::Value::String("<function>".to_owned()),
            Self::Macro(m) => serde_json::Value::String(format!("<macro {}>", m.name)),
            Self::Namespace(ns) => serde_json::Value::String(format!("<namespace {}>", ns.template_name)),
            Self::Object(obj) => serde_json::Value::String(obj.render()),
        }
    }
}

/// Numeric coercion pair: int op int stays int, any float makes it float.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            // 1 == 1.0, matching the numeric coercion rule
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            // Safe is a marking wrapper; it compares by content
            (Self::String(a) | Self::Safe(a), Self::String(b) | Self::Safe(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            (Self::Callable(a), Self::Callable(b)) => a.ptr_eq(b),
            (Self::Macro(a), Self::Macro(b)) => Arc::ptr_eq(a, b),
            (Self::Namespace(a), Self::Namespace(b)) => Arc::ptr_eq(a, b),
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Undefined { .. }, Self::Undefined { .. }) => true,
            _ => false,
        }
    }
}

/// Explicit string coercion (the `string` filter, `~` concatenation, dict
/// keys). Output position uses [`Value::output_string`] instead, which
/// renders `None` and `Undefined` as nothing.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => {
                // keep a trailing ".0" so floats stay visually distinct from ints
                if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Self::String(s) | Self::Safe(s) => f.write_str(s),
            Self::List(_) | Self::Dict(_) => {
                let mut out = String::new();
                self.write_repr(&mut out);
                f.write_str(&out)
            }
            Self::Callable(_) => f.write_str("<function>"),
            Self::Macro(m) => write!(f, "<macro {}>", m.name),
            Self::Namespace(ns) => write!(f, "<namespace {}>", ns.template_name),
            Self::Object(obj) => f.write_str(&obj.render()),
            Self::Undefined { .. } => Ok(()),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_ladder() {
        assert!(!Value::None.truthy());
        assert!(!Value::Bool(false).truthy());
        assert!(!Value::Int(0).truthy());
        assert!(!Value::Float(0.0).truthy());
        assert!(!Value::String(String::new()).truthy());
        assert!(!Value::List(vec![]).truthy());
        assert!(!Value::Dict(IndexMap::new()).truthy());
        assert!(!Value::undefined("x").truthy());

        assert!(Value::Bool(true).truthy());
        assert!(Value::Int(-1).truthy());
        assert!(Value::from("a").truthy());
        assert!(Value::from(vec![0i64]).truthy());
    }

    #[test]
    fn numeric_cross_equality() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Int(1), Value::Float(1.5));
        assert_ne!(Value::Bool(true), Value::Int(1), "bool is not silently numeric");
    }

    #[test]
    fn safe_compares_by_content() {
        assert_eq!(Value::Safe("x".into()), Value::String("x".into()));
    }

    #[test]
    fn dict_iterates_keys_in_insertion_order() {
        let mut map = IndexMap::new();
        map.insert("b".to_owned(), Value::Int(1));
        map.insert("a".to_owned(), Value::Int(2));
        let keys = Value::Dict(map).make_iterable().unwrap();
        assert_eq!(keys, vec![Value::from("b"), Value::from("a")]);
    }

    #[test]
    fn dict_unpack_projection_yields_pairs() {
        let mut map = IndexMap::new();
        map.insert("a".to_owned(), Value::Int(1));
        let pairs = Value::Dict(map).make_iterable_for_unpack(2).unwrap();
        assert_eq!(pairs, vec![Value::List(vec![Value::from("a"), Value::Int(1)])]);
    }

    #[test]
    fn none_and_undefined_iterate_empty() {
        assert!(Value::None.make_iterable().unwrap().is_empty());
        assert!(Value::undefined("v").make_iterable().unwrap().is_empty());
    }

    #[test]
    fn int_is_not_iterable() {
        let err = Value::Int(3).make_iterable().unwrap_err();
        assert!(err.message().contains("not iterable"), "got: {}", err.message());
    }

    #[test]
    fn float_display_keeps_fraction_marker() {
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
        assert_eq!(Value::Float(1.5).to_string(), "1.5");
    }

    #[test]
    fn output_position_hides_none() {
        assert_eq!(Value::None.output_string(), "");
        assert_eq!(Value::None.to_string(), "None");
    }
}
