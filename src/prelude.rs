//! Re-exports of types useful for users of this crate

pub use crate::{
    config::{
        Channels,
        ConstConfig,
        RetryingStrategies,
    },
    types::{
        AtomicMergeChannel,
        CrossbeamMergeChannel,
        FullSyncMergeChannel,
        MergedMutinyStream,
    },
    merge::{
        SequentialMerge,
        SourceRelay,
    },
    gate::{
        GateSubscription,
        GatedTaskService,
        ReleaseGate,
        TaskId,
        TaskProcessor,
    },
    verifier::StreamVerifier,
    new_sequential_merge,
    new_atomic_sequential_merge,
    new_fullsync_sequential_merge,
    new_crossbeam_sequential_merge,
};
