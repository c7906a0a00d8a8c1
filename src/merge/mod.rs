//! Sequential-eager merging of reactive sources:
//!   * [SequentialMerge] holds the ordered set of sources -- each one driven, from registration
//!     time, by its own relay task (this is what makes the subscription *eager*);
//!   * [SourceRelay] is the per-source plumbing: a `reactive-mutiny` channel buffering the
//!     source's items + the retrying logic applied when that buffer fills up;
//!   * the `new_*_sequential_merge!()` macros resolve the generic types out of a
//!     [crate::prelude::ConstConfig], for each of the available channel flavors.

pub mod source_relay;
pub mod sequential_merge;

pub use source_relay::SourceRelay;
pub use sequential_merge::SequentialMerge;
