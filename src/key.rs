//! Primary-key values used by `find`.

use crate::error::OrmError;
use sea_query::Value;

/// Key of a single row
///
/// A single value for one-column keys, or the full set of column values
/// for composite keys, either positionally or by column name.
///
/// ```rust
/// use rowbound::Key;
///
/// let by_id = Key::from(42);
/// let positional = Key::tuple([1, 2]);
/// let named = Key::named([("key1", 1), ("key2", 2)]);
/// # let _ = (by_id, positional, named);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Single(Value),
    Tuple(Vec<Value>),
    Named(Vec<(String, Value)>),
}

impl Key {
    pub fn tuple<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Key::Tuple(values.into_iter().map(Into::into).collect())
    }

    pub fn named<I, K, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Key::Named(parts.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    /// Order the key values to match `columns`
    ///
    /// # Errors
    ///
    /// Returns `OrmError::InvalidKey` when the key does not supply exactly
    /// one value per primary-key column.
    pub(crate) fn resolve(&self, columns: &[String]) -> Result<Vec<Value>, OrmError> {
        match self {
            Key::Single(value) => {
                if columns.len() == 1 {
                    Ok(vec![value.clone()])
                } else {
                    Err(OrmError::InvalidKey(format!(
                        "primary key has {} columns ({}), got a single value",
                        columns.len(),
                        columns.join(", ")
                    )))
                }
            }
            Key::Tuple(values) => {
                if values.len() == columns.len() {
                    Ok(values.clone())
                } else {
                    Err(OrmError::InvalidKey(format!(
                        "primary key has {} columns ({}), got {} values",
                        columns.len(),
                        columns.join(", "),
                        values.len()
                    )))
                }
            }
            Key::Named(parts) => {
                if let Some((extra, _)) = parts.iter().find(|(name, _)| !columns.contains(name)) {
                    return Err(OrmError::InvalidKey(format!(
                        "{extra} is not a primary key column"
                    )));
                }
                columns
                    .iter()
                    .map(|column| {
                        parts
                            .iter()
                            .find(|(name, _)| name == column)
                            .map(|(_, value)| value.clone())
                            .ok_or_else(|| {
                                OrmError::InvalidKey(format!("missing value for key column {column}"))
                            })
                    })
                    .collect()
            }
        }
    }
}

impl From<Value> for Key {
    fn from(value: Value) -> Self {
        Key::Single(value)
    }
}

macro_rules! impl_key_from {
    ($($type:ty),*) => {
        $(
            impl From<$type> for Key {
                fn from(value: $type) -> Self {
                    Key::Single(value.into())
                }
            }
        )*
    };
}

impl_key_from!(i32, i64, u32, u64, bool, String, &str);

impl From<Vec<Value>> for Key {
    fn from(values: Vec<Value>) -> Self {
        Key::Tuple(values)
    }
}

impl<V: Into<Value>, const N: usize> From<[(&str, V); N]> for Key {
    fn from(parts: [(&str, V); N]) -> Self {
        Key::named(parts)
    }
}
