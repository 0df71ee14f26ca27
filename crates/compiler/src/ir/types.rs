//! Static types carried by every IR node
//!
//! The IR handed to the compiler is already type-checked, so these are plain
//! values: nothing in this crate infers or unifies them.

use std::fmt;

/// Element type of a tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElemType {
    Uint8,
    Int8,
    Int16,
    Int32,
    Float16,
    Float32,
}

impl ElemType {
    pub fn name(self) -> &'static str {
        match self {
            ElemType::Uint8 => "uint8",
            ElemType::Int8 => "int8",
            ElemType::Int16 => "int16",
            ElemType::Int32 => "int32",
            ElemType::Float16 => "float16",
            ElemType::Float32 => "float32",
        }
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Static shape and element type of a tensor value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    pub shape: Vec<i64>,
    pub dtype: ElemType,
}

impl TensorType {
    pub fn new(shape: impl Into<Vec<i64>>, dtype: ElemType) -> Self {
        Self {
            shape: shape.into(),
            dtype,
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

/// Resolved static type of an IR node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Tensor(TensorType),
    Tuple(Vec<Type>),
    /// Type of a nested function; never lowered
    Func,
}

impl Type {
    pub fn tensor(shape: impl Into<Vec<i64>>, dtype: ElemType) -> Self {
        Type::Tensor(TensorType::new(shape, dtype))
    }

    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            Type::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&[Type]> {
        match self {
            Type::Tuple(fields) => Some(fields),
            _ => None,
        }
    }

    /// Number of values a node of this type produces
    ///
    /// Tuples produce one value per field, everything else produces one.
    pub fn arity(&self) -> usize {
        match self {
            Type::Tuple(fields) => fields.len(),
            _ => 1,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Tensor(t) => write!(f, "Tensor[{:?}, {}]", t.shape, t.dtype),
            Type::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, ")")
            }
            Type::Func => write!(f, "fn"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arity() {
        let t = Type::tensor([1, 4, 4, 8], ElemType::Uint8);
        assert_eq!(t.arity(), 1);

        let tuple = Type::Tuple(vec![t.clone(), t.clone(), t]);
        assert_eq!(tuple.arity(), 3);
        assert!(tuple.as_tensor().is_none());
        assert_eq!(tuple.as_tuple().map(|f| f.len()), Some(3));
    }

    #[test]
    fn test_display() {
        let tuple = Type::Tuple(vec![
            Type::tensor([1, 2], ElemType::Int8),
            Type::tensor([3], ElemType::Int32),
        ]);
        assert_eq!(
            tuple.to_string(),
            "(Tensor[[1, 2], int8], Tensor[[3], int32])"
        );
    }
}
