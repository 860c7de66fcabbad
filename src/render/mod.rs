/// Headless PNG figures.
///
/// Each figure owns its bitmap backend for the duration of one call:
/// created, drawn, presented to disk, then dropped before the next sample.
pub mod ridge;
pub mod scatter;
