/// Types that carry tunable parameters for a pipeline stage.
pub trait ConfigType {
    /// Creates the default configuration.
    fn default() -> Self;
}
