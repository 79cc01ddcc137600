//! Store open options.

/// Options used to open a store.
///
/// # Example
///
/// ```rust
/// use damson_storage::StoreOptions;
///
/// let options = StoreOptions::new().error_if_exists(true);
/// assert!(options.is_create_if_missing());
/// ```
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Create the data file if it doesn't exist.
    pub(crate) create_if_missing: bool,
    /// Fail if the data file already exists.
    pub(crate) error_if_exists: bool,
}

impl StoreOptions {
    /// Creates the default options: create missing stores, accept existing
    /// ones.
    #[must_use]
    pub fn new() -> Self {
        Self {
            create_if_missing: true,
            error_if_exists: false,
        }
    }

    /// Sets whether a missing data file is created.
    #[must_use]
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    /// Sets whether an existing data file is an error.
    #[must_use]
    pub fn error_if_exists(mut self, error: bool) -> Self {
        self.error_if_exists = error;
        self
    }

    /// Returns true if a missing data file will be created.
    #[inline]
    pub fn is_create_if_missing(&self) -> bool {
        self.create_if_missing
    }

    /// Returns true if an existing data file is an error.
    #[inline]
    pub fn is_error_if_exists(&self) -> bool {
        self.error_if_exists
    }
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = StoreOptions::default();
        assert!(options.is_create_if_missing());
        assert!(!options.is_error_if_exists());
    }

    #[test]
    fn test_builder() {
        let options = StoreOptions::new()
            .create_if_missing(false)
            .error_if_exists(true);
        assert!(!options.is_create_if_missing());
        assert!(options.is_error_if_exists());
    }
}
