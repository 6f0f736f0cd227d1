//! Memoisation keyed on an owner's version counter.

/// Caches a derived value until the owning store's version changes.
#[derive(Debug, Clone, Default)]
pub struct VersionedMemo<T> {
    cached: Option<(u64, T)>,
}

impl<T> VersionedMemo<T> {
    /// Creates an empty memo.
    #[must_use]
    pub const fn new() -> Self {
        Self { cached: None }
    }

    /// Returns the value computed for `version`, computing it if the cached
    /// one belongs to another version.
    pub fn get_or_compute(&mut self, version: u64, compute: impl FnOnce() -> T) -> &T {
        let stale = self
            .cached
            .as_ref()
            .is_none_or(|(cached_version, _)| *cached_version != version);
        if stale {
            self.cached = None;
        }
        let (_, value) = self.cached.get_or_insert_with(|| (version, compute()));
        value
    }

    /// Drops the cached value.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    /// Version of the cached value, if any.
    #[must_use]
    pub fn cached_version(&self) -> Option<u64> {
        self.cached.as_ref().map(|(version, _)| *version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recomputes_only_on_version_change() {
        let mut memo = VersionedMemo::new();
        let mut calls = 0;

        let value = *memo.get_or_compute(1, || {
            calls += 1;
            10
        });
        assert_eq!(value, 10);

        let value = *memo.get_or_compute(1, || {
            calls += 1;
            20
        });
        assert_eq!(value, 10);

        let value = *memo.get_or_compute(2, || {
            calls += 1;
            30
        });
        assert_eq!(value, 30);
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_invalidate_forces_recompute() {
        let mut memo = VersionedMemo::new();
        memo.get_or_compute(1, || "a");
        memo.invalidate();
        assert_eq!(memo.cached_version(), None);
        assert_eq!(*memo.get_or_compute(1, || "b"), "b");
    }
}
