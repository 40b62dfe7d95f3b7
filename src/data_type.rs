use std::fmt;
use std::mem::size_of;

use serde::{Deserialize, Serialize};

/// Scalar element type of a tensor or kernel slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Float,
    Double,
    Int8,
    Int16,
    Int32,
    Int64,
}

/// Byte size per element, indexed by the variant ordinal.
const DATA_TYPE_SIZE: [usize; 6] = [
    size_of::<f32>(),
    size_of::<f64>(),
    size_of::<i8>(),
    size_of::<i16>(),
    size_of::<i32>(),
    size_of::<i64>(),
];

impl DataType {
    pub const ALL: [DataType; 6] = [
        DataType::Float,
        DataType::Double,
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
    ];

    pub fn size(self) -> usize {
        DATA_TYPE_SIZE[self as usize]
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Float => "float",
            DataType::Double => "double",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rust scalar that can be viewed inside a tensor buffer.
pub trait Element: Copy + Send + Sync + 'static {
    const DTYPE: DataType;
}

impl Element for f32 {
    const DTYPE: DataType = DataType::Float;
}

impl Element for f64 {
    const DTYPE: DataType = DataType::Double;
}

impl Element for i8 {
    const DTYPE: DataType = DataType::Int8;
}

impl Element for i16 {
    const DTYPE: DataType = DataType::Int16;
}

impl Element for i32 {
    const DTYPE: DataType = DataType::Int32;
}

impl Element for i64 {
    const DTYPE: DataType = DataType::Int64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_match_native_scalars() {
        assert_eq!(DataType::Float.size(), size_of::<f32>());
        assert_eq!(DataType::Double.size(), size_of::<f64>());
        assert_eq!(DataType::Int8.size(), size_of::<i8>());
        assert_eq!(DataType::Int16.size(), size_of::<i16>());
        assert_eq!(DataType::Int32.size(), size_of::<i32>());
        assert_eq!(DataType::Int64.size(), size_of::<i64>());

        for (ordinal, dtype) in DataType::ALL.iter().enumerate() {
            assert_eq!(*dtype as usize, ordinal);
            assert_eq!(dtype.size(), DATA_TYPE_SIZE[ordinal]);
        }
        let mut names: Vec<_> = DataType::ALL.iter().map(|dtype| dtype.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), DataType::ALL.len());
    }

    #[test]
    fn element_dtypes_agree_with_sizes() {
        fn check<T: Element>() {
            assert_eq!(T::DTYPE.size(), size_of::<T>());
        }
        check::<f32>();
        check::<f64>();
        check::<i8>();
        check::<i16>();
        check::<i32>();
        check::<i64>();
    }

    #[test]
    fn display_uses_snake_case_names() {
        assert_eq!(DataType::Float.to_string(), "float");
        assert_eq!(DataType::Int64.to_string(), "int64");
        assert_eq!(
            serde_json::to_string(&DataType::Int16).unwrap(),
            "\"int16\""
        );
    }
}
