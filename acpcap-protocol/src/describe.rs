//! Field description capability.
//!
//! Every message and composite type lists its public fields as
//! `(name, value)` pairs. A renderer can walk any decoded value through
//! this trait without knowing its concrete type.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

use crate::types::WireEnum;

/// Stable identity of a value that can be reached through more than one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

impl NodeId {
    /// Hand out a process-unique identifier.
    pub fn next() -> Self {
        NodeId(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Where a type comes from.
///
/// Only `Protocol` types have their fields listed by renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Namespace {
    /// Message or composite defined by the protocol.
    #[default]
    Protocol,
    /// Platform type (timestamps, addresses and the like).
    Platform,
}

/// A primitive or text value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar<'a> {
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(&'a str),
}

impl fmt::Display for Scalar<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{}", v),
            Scalar::Unsigned(v) => write!(f, "{}", v),
            Scalar::Signed(v) => write!(f, "{}", v),
            Scalar::Float(v) => write!(f, "{}", v),
            Scalar::Text(v) => f.write_str(v),
        }
    }
}

/// Value of one described field.
pub enum FieldValue<'a> {
    /// Absent value.
    Null,
    /// Enumerated value with its symbolic name.
    Enum { name: &'static str, value: u32 },
    /// Primitive or text value.
    Scalar(Scalar<'a>),
    /// Ordered container.
    Sequence(Vec<FieldValue<'a>>),
    /// Keyed container, in iteration order.
    Map(Vec<(FieldValue<'a>, FieldValue<'a>)>),
    /// Nested composite value.
    Composite(&'a dyn Describe),
}

impl<'a> FieldValue<'a> {
    /// Describe an enumerated value.
    pub fn from_enum<E: WireEnum>(value: E) -> Self {
        FieldValue::Enum {
            name: value.name(),
            value: value.value(),
        }
    }

    /// Describe a text value.
    pub fn text(value: &'a str) -> Self {
        FieldValue::Scalar(Scalar::Text(value))
    }

    /// Describe a nested composite.
    pub fn composite(value: &'a dyn Describe) -> Self {
        FieldValue::Composite(value)
    }

    /// Describe a slice of composites.
    pub fn sequence_of<T: Describe>(items: &'a [T]) -> Self {
        FieldValue::Sequence(items.iter().map(|item| FieldValue::Composite(item)).collect())
    }
}

impl fmt::Debug for FieldValue<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("Null"),
            FieldValue::Enum { name, value } => write!(f, "Enum({}, 0x{:X})", name, value),
            FieldValue::Scalar(s) => write!(f, "Scalar({:?})", s),
            FieldValue::Sequence(items) => f.debug_list().entries(items).finish(),
            FieldValue::Map(entries) => f
                .debug_map()
                .entries(entries.iter().map(|(k, v)| (k, v)))
                .finish(),
            FieldValue::Composite(_) => f.write_str("Composite(..)"),
        }
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident as $target:ty),+ $(,)?) => {
        $(
            impl From<$ty> for FieldValue<'_> {
                fn from(value: $ty) -> Self {
                    FieldValue::Scalar(Scalar::$variant(value as $target))
                }
            }
        )+
    };
}

scalar_from! {
    u8 => Unsigned as u64,
    u16 => Unsigned as u64,
    u32 => Unsigned as u64,
    u64 => Unsigned as u64,
    i8 => Signed as i64,
    i16 => Signed as i64,
    i32 => Signed as i64,
    i64 => Signed as i64,
    f32 => Float as f64,
    f64 => Float as f64,
}

impl From<bool> for FieldValue<'_> {
    fn from(value: bool) -> Self {
        FieldValue::Scalar(Scalar::Bool(value))
    }
}

impl<'a> From<&'a str> for FieldValue<'a> {
    fn from(value: &'a str) -> Self {
        FieldValue::text(value)
    }
}

impl<'a> From<&'a String> for FieldValue<'a> {
    fn from(value: &'a String) -> Self {
        FieldValue::text(value.as_str())
    }
}

/// Reason a field value could not be produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct FieldError(pub String);

/// One named field.
#[derive(Debug)]
pub struct Field<'a> {
    pub name: &'static str,
    pub value: Result<FieldValue<'a>, FieldError>,
}

impl<'a> Field<'a> {
    /// A field whose value is available.
    pub fn new(name: &'static str, value: impl Into<FieldValue<'a>>) -> Self {
        Self {
            name,
            value: Ok(value.into()),
        }
    }

}

/// Capability to list public fields.
pub trait Describe {
    /// Public fields, in declaration order.
    fn fields(&self) -> Vec<Field<'_>>;

    /// Origin of the type.
    fn namespace(&self) -> Namespace {
        Namespace::Protocol
    }

    /// Identity for values that may be shared or cyclic.
    ///
    /// Plain owned values return `None`; ownership already rules out revisiting them.
    fn node_id(&self) -> Option<NodeId> {
        None
    }
}
