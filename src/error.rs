/// Errors reported at cache construction time.
///
/// Per-insert failures (cost larger than total capacity) are not reported
/// here: they are silently dropped at the `Set` call site, since callers
/// treat `Set` as best-effort (see [`crate::sync::Cache::insert`]).
#[derive(::thiserror::Error, Debug)]
pub enum CacheError {
    #[error("capacity must be at least 1, got {0}")]
    ConfigInvalid(u64),
    #[error("window_fraction and protected_fraction must be in (0.0, 1.0), got window={0}, protected={1}")]
    FractionInvalid(f64, f64),
}
