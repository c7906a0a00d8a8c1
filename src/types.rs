//! Common types used across this crate

use reactive_mutiny::prelude::advanced::{
    ChannelUniMoveAtomic,
    ChannelUniMoveCrossbeam,
    ChannelUniMoveFullSync,
    MutinyStream,
};


/// The fastest channel for buffering a merged source's items -- see `benches/merge_buffers.rs`
pub type AtomicMergeChannel<ItemType, const BUFFER_SIZE: usize> = ChannelUniMoveAtomic::<ItemType, BUFFER_SIZE, 1>;

/// Fully-synchronized alternative to [AtomicMergeChannel] -- shines on CPUs with a slow XCHG
pub type FullSyncMergeChannel<ItemType, const BUFFER_SIZE: usize> = ChannelUniMoveFullSync::<ItemType, BUFFER_SIZE, 1>;

/// Crossbeam-backed alternative to [AtomicMergeChannel]
pub type CrossbeamMergeChannel<ItemType, const BUFFER_SIZE: usize> = ChannelUniMoveCrossbeam::<ItemType, BUFFER_SIZE, 1>;

/// The `Stream` each merged source's buffer yields -- and which, chained in registration
/// order, makes up the whole merged output
pub type MergedMutinyStream<ItemType, MergeChannel> = MutinyStream<'static, ItemType, MergeChannel, ItemType>;
