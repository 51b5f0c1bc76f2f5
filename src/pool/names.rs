//! Engine name generation
//!
//! Generators are plain functions from the pool's monotonic counter to a
//! name. They are pluggable so suites can pin deterministic names or add
//! entropy for shared service accounts.

/// Pluggable engine name generator, fed the pool's monotonic counter.
pub type NameGenerator = Box<dyn Fn(u64) -> String + Send + Sync>;

/// `base-1`, `base-2`, ... Deterministic, collides across harness runs
/// that share an account; use for isolated environments and tests.
pub fn sequential(base: impl Into<String>) -> NameGenerator {
    let base = base.into();
    Box::new(move |i| format!("{base}-{i}"))
}

/// `base-1-8f3a`, `base-2-02c1`, ... Counter keeps names unique within
/// the pool, the random suffix keeps concurrent harness runs apart.
pub fn random_suffix(base: impl Into<String>) -> NameGenerator {
    let base = base.into();
    Box::new(move |i| {
        let suffix: u16 = rand::random();
        format!("{base}-{i}-{suffix:04x}")
    })
}
