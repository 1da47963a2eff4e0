use serde::Serializer;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// Prop keys that belong to the rendering layer and never reach the wire.
pub const INTERNAL_PROPS: [&str; 3] = ["children", "key", "ref"];

/// Callback-valued props that register an entry in the root's handler registry.
pub const EVENT_PROPS: [&str; 2] = ["onPress", "onChange"];

pub type Props = BTreeMap<String, PropValue>;

type HandlerFn = dyn Fn(Option<&Value>) -> anyhow::Result<()>;

/// A callable prop. Equality is identity, so re-creating a closure on every
/// render counts as a prop change.
#[derive(Clone)]
pub struct EventHandler(Rc<HandlerFn>);

impl EventHandler {
    pub fn new(handler: impl Fn(Option<&Value>) -> anyhow::Result<()> + 'static) -> Self {
        Self(Rc::new(handler))
    }

    pub fn call(&self, payload: Option<&Value>) -> anyhow::Result<()> {
        (self.0)(payload)
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventHandler(..)")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PropValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Nested structured data (style objects, panel header/footer, action lists).
    Json(Value),
    Handler(EventHandler),
    /// Renderer-private marker; dropped during serialization.
    Symbol(String),
}

impl PropValue {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            Value::String(s) => Self::String(s),
            other => Self::Json(other),
        }
    }

    /// True for the primitive values a renderer treats as inline text content.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::String(_) | Self::Number(_))
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Number(n) => Some(format_number(*n)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&EventHandler> {
        match self {
            Self::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    /// JSON projection. Handlers and symbols have none.
    pub fn to_json(&self) -> Option<Value> {
        match self {
            Self::Null => Some(Value::Null),
            Self::Bool(b) => Some(Value::Bool(*b)),
            Self::Number(n) => Some(number_to_json(*n)),
            Self::String(s) => Some(Value::String(s.clone())),
            Self::Json(v) => Some(v.clone()),
            Self::Handler(_) | Self::Symbol(_) => None,
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<u32> for PropValue {
    fn from(value: u32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<Value> for PropValue {
    fn from(value: Value) -> Self {
        Self::from_json(value)
    }
}

impl From<EventHandler> for PropValue {
    fn from(value: EventHandler) -> Self {
        Self::Handler(value)
    }
}

/// Formats a number the way text content is shown: integral values carry no
/// fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

pub fn number_to_json(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

pub(crate) fn serialize_opt_number<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(n) => serializer.serialize_some(&number_to_json(*n)),
        None => serializer.serialize_none(),
    }
}
