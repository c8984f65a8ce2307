//! Shared value types used across the library.
//!
//! Decoded data moves through the crate in two shapes: [`Value`], a single
//! decoded sample, and [`Samples`], a column of samples for one channel.
//! [`Signal`] pairs a sample column with its timestamps and is both the
//! output of [`Mdf::get`](crate::Mdf::get) and the input of
//! [`Mdf::append`](crate::Mdf::append).

/// A single decoded channel sample.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unsigned integer (up to 64 bits)
    UnsignedInteger(u64),
    /// Signed integer (up to 64 bits)
    SignedInteger(i64),
    /// Floating point value (32 or 64 bit)
    Float(f64),
    /// Text string (Latin-1 on disk)
    String(String),
    /// Raw byte array
    ByteArray(Vec<u8>),
}

impl Value {
    /// Returns true if this is an integer value (signed or unsigned).
    #[inline]
    pub fn is_integer(&self) -> bool {
        matches!(self, Value::UnsignedInteger(_) | Value::SignedInteger(_))
    }

    /// Attempts to convert to f64, useful for numeric operations.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::UnsignedInteger(v) => Some(*v as f64),
            Value::SignedInteger(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }
}

/// A column of decoded samples for one channel, one entry per record.
///
/// Array and structure channels decode to [`Samples::Composite`]: one
/// column per referenced component channel, with the declared dimension
/// sizes. A composite holds one structured sample per record, spread
/// across its columns.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    UnsignedInteger(Vec<u64>),
    SignedInteger(Vec<i64>),
    Float(Vec<f64>),
    String(Vec<String>),
    ByteArray(Vec<Vec<u8>>),
    Composite {
        /// Dimension sizes; `[n]` for a vector of n components.
        dims: Vec<usize>,
        /// One column per component, all of equal length.
        columns: Vec<Samples>,
    },
}

impl Samples {
    /// Number of records in this column.
    pub fn len(&self) -> usize {
        match self {
            Samples::UnsignedInteger(v) => v.len(),
            Samples::SignedInteger(v) => v.len(),
            Samples::Float(v) => v.len(),
            Samples::String(v) => v.len(),
            Samples::ByteArray(v) => v.len(),
            Samples::Composite { columns, .. } => {
                columns.first().map(|c| c.len()).unwrap_or(0)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Single sample at `index`, if in range.
    pub fn value(&self, index: usize) -> Option<Value> {
        match self {
            Samples::UnsignedInteger(v) => v.get(index).map(|x| Value::UnsignedInteger(*x)),
            Samples::SignedInteger(v) => v.get(index).map(|x| Value::SignedInteger(*x)),
            Samples::Float(v) => v.get(index).map(|x| Value::Float(*x)),
            Samples::String(v) => v.get(index).map(|x| Value::String(x.clone())),
            Samples::ByteArray(v) => v.get(index).map(|x| Value::ByteArray(x.clone())),
            Samples::Composite { .. } => None,
        }
    }

    /// All samples as f64, when the column is numeric.
    pub fn as_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Samples::UnsignedInteger(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Samples::SignedInteger(v) => Some(v.iter().map(|&x| x as f64).collect()),
            Samples::Float(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Appends `other` to this column. Both sides must carry the same
    /// variant; fragments of one channel always do.
    pub(crate) fn append(&mut self, other: Samples) {
        match (self, other) {
            (Samples::UnsignedInteger(a), Samples::UnsignedInteger(b)) => a.extend(b),
            (Samples::SignedInteger(a), Samples::SignedInteger(b)) => a.extend(b),
            (Samples::Float(a), Samples::Float(b)) => a.extend(b),
            (Samples::String(a), Samples::String(b)) => a.extend(b),
            (Samples::ByteArray(a), Samples::ByteArray(b)) => a.extend(b),
            (
                Samples::Composite { columns: a, .. },
                Samples::Composite { columns: b, .. },
            ) => {
                for (col, other_col) in a.iter_mut().zip(b) {
                    col.append(other_col);
                }
            }
            _ => {}
        }
    }
}

/// A named channel with its decoded samples and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Channel name.
    pub name: String,
    /// Physical unit, empty if none.
    pub unit: String,
    /// Channel comment, empty if none.
    pub comment: String,
    /// One sample per record.
    pub samples: Samples,
    /// Master (time) value per record, same length as `samples`.
    pub timestamps: Vec<f64>,
}

impl Signal {
    /// Convenience constructor for an unnamed-unit signal.
    pub fn new(name: impl Into<String>, samples: Samples, timestamps: Vec<f64>) -> Self {
        Signal {
            name: name.into(),
            unit: String::new(),
            comment: String::new(),
            samples,
            timestamps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_as_f64() {
        assert_eq!(Value::UnsignedInteger(3).as_f64(), Some(3.0));
        assert_eq!(Value::SignedInteger(-2).as_f64(), Some(-2.0));
        assert_eq!(Value::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::String("x".into()).as_f64(), None);
    }

    #[test]
    fn samples_append_concatenates() {
        let mut a = Samples::UnsignedInteger(vec![1, 2]);
        a.append(Samples::UnsignedInteger(vec![3]));
        assert_eq!(a, Samples::UnsignedInteger(vec![1, 2, 3]));
        assert_eq!(a.len(), 3);
        assert_eq!(a.value(2), Some(Value::UnsignedInteger(3)));
    }

    #[test]
    fn composite_len_tracks_columns() {
        let c = Samples::Composite {
            dims: vec![2],
            columns: vec![
                Samples::Float(vec![0.0, 1.0]),
                Samples::Float(vec![2.0, 3.0]),
            ],
        };
        assert_eq!(c.len(), 2);
    }
}
