/// Row id of an alignment in its category table (opaque to the engine).
pub type RowId = i64;
/// Row id of a reference chunk.
pub type ChunkId = i64;

// AHash-backed map used for chunk indexes and per-reference stores.
// `HashMapExt` brings `new()` / `with_capacity()` into scope.
pub(crate) type HashMap<K, V> = ahash::HashMap<K, V>;
pub(crate) use ahash::HashMapExt;
