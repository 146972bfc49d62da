use std::fmt;

/// To avoid naming conflict hell, the OPC UA String type is typed `UAString`
/// so it does not collide with the Rust `String`.
///
/// A string contains UTF-8 encoded characters or a null value. A null value
/// is distinct from being an empty string, so this holds the value as an
/// `Option<String>`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Hash)]
pub struct UAString {
    value: Option<String>,
}

impl UAString {
    /// A null (missing) string.
    pub fn null() -> Self {
        Self { value: None }
    }

    /// True if this is the null string.
    pub fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// True if this is null or empty.
    pub fn is_empty(&self) -> bool {
        match &self.value {
            None => true,
            Some(v) => v.is_empty(),
        }
    }

    /// Borrow the contents as a `&str`, or `""` if null.
    pub fn as_ref(&self) -> &str {
        self.value.as_deref().unwrap_or("")
    }
}

impl fmt::Display for UAString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_ref())
    }
}

impl From<&str> for UAString {
    fn from(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
        }
    }
}

impl From<String> for UAString {
    fn from(value: String) -> Self {
        Self { value: Some(value) }
    }
}
