//! Configuration access port trait.

/// Raw string access to a sectioned configuration source. Typed parsing and
/// validation live in `domain::config_validation`.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// Every section name, sorted.
    fn sections(&self) -> Vec<String>;
}
