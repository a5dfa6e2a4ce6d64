//! Single or composite column lists used by relation keys.

/// Represents a column identifier that can be single or composite
///
/// ```rust
/// use rowbound::relation::Identity;
///
/// let single = Identity::from("user_id");
/// let composite = Identity::from(["ck_record_key1", "ck_record_key2"]);
/// assert_eq!(single.arity(), 1);
/// assert_eq!(composite.arity(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    /// Single column identifier
    Unary(String),
    /// Two or more column identifiers (composite key)
    Many(Vec<String>),
}

impl Identity {
    /// Number of columns
    #[must_use]
    pub fn arity(&self) -> usize {
        self.columns().len()
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        match self {
            Self::Unary(column) => std::slice::from_ref(column),
            Self::Many(columns) => columns,
        }
    }

    /// `<prefix>_<column>` for every column, the default foreign-key shape
    #[must_use]
    pub fn prefixed(columns: &[String], prefix: &str) -> Self {
        Self::from(
            columns
                .iter()
                .map(|column| format!("{prefix}_{column}"))
                .collect::<Vec<_>>(),
        )
    }
}

impl From<&str> for Identity {
    fn from(column: &str) -> Self {
        Self::Unary(column.to_string())
    }
}

impl From<String> for Identity {
    fn from(column: String) -> Self {
        Self::Unary(column)
    }
}

impl From<Vec<String>> for Identity {
    fn from(mut columns: Vec<String>) -> Self {
        if columns.len() == 1 {
            if let Some(column) = columns.pop() {
                return Self::Unary(column);
            }
        }
        Self::Many(columns)
    }
}

impl<const N: usize> From<[&str; N]> for Identity {
    fn from(columns: [&str; N]) -> Self {
        Self::from(columns.iter().map(|c| (*c).to_string()).collect::<Vec<_>>())
    }
}

impl From<&[&str]> for Identity {
    fn from(columns: &[&str]) -> Self {
        Self::from(columns.iter().map(|c| (*c).to_string()).collect::<Vec<_>>())
    }
}
