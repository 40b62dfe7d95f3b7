use std::collections::HashMap;

use crate::error::GraphError;

/// Scalar attribute attached to a node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttrValue {
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Bool(bool),
}

impl AttrValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Int32(_) => "int32",
            AttrValue::Int64(_) => "int64",
            AttrValue::Float(_) => "float",
            AttrValue::Double(_) => "double",
            AttrValue::Bool(_) => "bool",
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            AttrValue::Int32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            AttrValue::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            AttrValue::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            AttrValue::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            AttrValue::Bool(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int32(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int64(value)
    }
}

impl From<f32> for AttrValue {
    fn from(value: f32) -> Self {
        AttrValue::Float(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Double(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

/// Flat map of absolute attribute paths (`"<node>/<attr>"`) to values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap {
    values: HashMap<String, AttrValue>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.values.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&AttrValue> {
        self.values.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttrValue)> {
        self.values.iter().map(|(path, value)| (path.as_str(), value))
    }

    pub(crate) fn insert(&mut self, path: String, value: AttrValue) {
        self.values.insert(path, value);
    }

    pub(crate) fn clear(&mut self) {
        self.values.clear();
    }

    pub fn get_int32(&self, path: &str) -> Result<i32, GraphError> {
        self.typed(path, "int32", AttrValue::as_i32)
    }

    pub fn get_int64(&self, path: &str) -> Result<i64, GraphError> {
        self.typed(path, "int64", AttrValue::as_i64)
    }

    pub fn get_float(&self, path: &str) -> Result<f32, GraphError> {
        self.typed(path, "float", AttrValue::as_f32)
    }

    pub fn get_double(&self, path: &str) -> Result<f64, GraphError> {
        self.typed(path, "double", AttrValue::as_f64)
    }

    pub fn get_bool(&self, path: &str) -> Result<bool, GraphError> {
        self.typed(path, "bool", AttrValue::as_bool)
    }

    fn typed<T>(
        &self,
        path: &str,
        expected: &'static str,
        extract: impl Fn(&AttrValue) -> Option<T>,
    ) -> Result<T, GraphError> {
        let value = self
            .values
            .get(path)
            .ok_or_else(|| GraphError::AttributeNotFound {
                path: path.to_string(),
            })?;
        extract(value).ok_or_else(|| GraphError::AttributeTypeMismatch {
            path: path.to_string(),
            expected,
            actual: value.type_name(),
        })
    }
}

/// Attribute names may not contain the path separator, so that every
/// `"<node>/<attr>"` path splits back into exactly one node and attribute.
pub(crate) fn check_attribute_name(attribute: &str) -> Result<(), GraphError> {
    if attribute.contains('/') {
        return Err(GraphError::InvalidAttributeName {
            attribute: attribute.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn attribute_path(node: &str, attribute: &str) -> String {
    format!("{}/{}", node, attribute)
}
