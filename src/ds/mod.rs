//! Intrusive-style building blocks shared by the memfs and blkfs backends:
//! the reference-counted slot arena behind every inode/file table, an
//! order-statistic map, a bucketed hash map, and an index-based doubly
//! linked list. Grounded in the teacher's `arena.rs`/`list.rs`, reworked
//! per the index-over-raw-pointer decision recorded in SPEC_FULL.md
//! section 9.

pub mod arena;
pub mod hash_map;
pub mod list;
pub mod ordered_map;

pub use arena::{Arena, ArenaObject, Rc};
pub use hash_map::BucketMap;
pub use list::IndexList;
pub use ordered_map::OrderedMap;
