//! Provides [SequentialMerge] and the `new_*_sequential_merge!()` instantiation macros -- the
//! entry point for merging reactive sources with the two guarantees this crate exists for:
//!   * **Eager subscription**: every source starts being driven (by its own relay task, into its
//!     own buffer) the moment [SequentialMerge::subscribe()] registers it -- regardless of its
//!     position in the merge and of whether the merged output is being consumed;
//!   * **Sequential emission**: the `Stream` returned by [SequentialMerge::merged()] yields all
//!     items of source 0, then all items of source 1, and so on, in registration order --
//!     buffering whatever arrives "out of turn".
//!
//! These two, combined, make arrangements in which a *later* source is responsible for
//! unblocking the work behind an *earlier* one complete correctly -- arrangements that
//! deadlock under merge operators deferring their inner subscriptions.
//!
//! Instead of using the mentioned macros, you might want to take a look at [SequentialMerge]
//! to access the inner implementation directly -- both ways have the same flexibility, but the
//! macro version takes in all parameters in the conveniently packed and documented
//! [ConstConfig] struct, instead of requiring several generic parameters.

use crate::{
    config::ConstConfig,
    merge::source_relay::SourceRelay,
    types::MergedMutinyStream,
};
use std::{
    fmt::{Debug, Formatter},
    future::Future,
};
use futures::{Stream, StreamExt, stream};
use log::trace;
use reactive_mutiny::prelude::FullDuplexUniChannel;


/// Instantiates & allocates resources for a [SequentialMerge]
/// -- using the default "Atomic" channels for the sources' buffers (see
/// [new_fullsync_sequential_merge!()] & [new_crossbeam_sequential_merge!()] for alternatives).\
/// Params:
///   - `const_config`: [ConstConfig] -- the configurations for the merge, enforcing const/compile time optimizations;
///   - `merge_name: IntoString` -- a name for the merge, to show up in logs;
///   - `item_type` -- the type of the items produced by every source (and yielded by the merged output).
#[macro_export]
macro_rules! new_sequential_merge {
    ($const_config: expr,
     $merge_name:   expr,
     $item_type:    ty) => {
        $crate::new_atomic_sequential_merge!($const_config, $merge_name, $item_type)
    }
}
pub use new_sequential_merge;


/// Similar to [new_sequential_merge!()], but with the sources' buffers backed by
/// `reactive-mutiny`'s "Atomic" channels -- the default, as measured in `benches/merge_buffers.rs`
#[macro_export]
macro_rules! new_atomic_sequential_merge {
    ($const_config: expr,
     $merge_name:   expr,
     $item_type:    ty) => {{
        const _CONFIG:        u64   = $const_config.into();
        const _SOURCE_BUFFER: usize = $crate::prelude::ConstConfig::extract_source_buffer(_CONFIG) as usize;
        type MergeChannelType = $crate::prelude::AtomicMergeChannel<$item_type, _SOURCE_BUFFER>;
        $crate::prelude::SequentialMerge::<_CONFIG, $item_type, MergeChannelType>::new($merge_name)
    }}
}
pub use new_atomic_sequential_merge;


/// Similar to [new_sequential_merge!()], but with the sources' buffers backed by
/// `reactive-mutiny`'s "FullSync" channels
#[macro_export]
macro_rules! new_fullsync_sequential_merge {
    ($const_config: expr,
     $merge_name:   expr,
     $item_type:    ty) => {{
        const _CONFIG:        u64   = $const_config.into();
        const _SOURCE_BUFFER: usize = $crate::prelude::ConstConfig::extract_source_buffer(_CONFIG) as usize;
        type MergeChannelType = $crate::prelude::FullSyncMergeChannel<$item_type, _SOURCE_BUFFER>;
        $crate::prelude::SequentialMerge::<_CONFIG, $item_type, MergeChannelType>::new($merge_name)
    }}
}
pub use new_fullsync_sequential_merge;


/// Similar to [new_sequential_merge!()], but with the sources' buffers backed by
/// `reactive-mutiny`'s "Crossbeam" channels
#[macro_export]
macro_rules! new_crossbeam_sequential_merge {
    ($const_config: expr,
     $merge_name:   expr,
     $item_type:    ty) => {{
        const _CONFIG:        u64   = $const_config.into();
        const _SOURCE_BUFFER: usize = $crate::prelude::ConstConfig::extract_source_buffer(_CONFIG) as usize;
        type MergeChannelType = $crate::prelude::CrossbeamMergeChannel<$item_type, _SOURCE_BUFFER>;
        $crate::prelude::SequentialMerge::<_CONFIG, $item_type, MergeChannelType>::new($merge_name)
    }}
}
pub use new_crossbeam_sequential_merge;


/// A source registered in a [SequentialMerge]: its yet-to-be-consumed ordered buffer
/// and the relay task eagerly draining the original source into it
struct SubscribedSource<ItemType:     Send + Sync + Debug + 'static,
                        MergeChannel: FullDuplexUniChannel<ItemType=ItemType, DerivedItemType=ItemType> + Send + Sync + 'static> {
    name:          String,
    output_stream: MergedMutinyStream<ItemType, MergeChannel>,
    relay_task:    tokio::task::JoinHandle<()>,
}


/// An ordered collection of eagerly-subscribed reactive sources, whose items are to be
/// consumed -- in registration order -- through the `Stream` returned by [Self::merged()].\
/// Instantiate it through one of the `new_*_sequential_merge!()` macros (which resolve
/// `MergeChannel` from a [ConstConfig]) or directly, if you want to spell the generic types out.
pub struct SequentialMerge<const CONFIG:  u64,
                           ItemType:      Send + Sync + Debug + 'static,
                           MergeChannel:  FullDuplexUniChannel<ItemType=ItemType, DerivedItemType=ItemType> + Send + Sync + 'static> {
    merge_name: String,
    sources:    Vec<SubscribedSource<ItemType, MergeChannel>>,
}

impl<const CONFIG: u64,
     ItemType:     Send + Sync + Debug + 'static,
     MergeChannel: FullDuplexUniChannel<ItemType=ItemType, DerivedItemType=ItemType> + Send + Sync + 'static>
SequentialMerge<CONFIG, ItemType, MergeChannel> {

    /// The instance config this generic implementation adheres to
    pub const CONST_CONFIG: ConstConfig = ConstConfig::from(CONFIG);

    pub fn new<IntoString: Into<String>>(merge_name: IntoString) -> Self {
        Self {
            merge_name: merge_name.into(),
            sources:    Vec::new(),
        }
    }

    /// Registers `source` as the next (and, from now on, *actively driven*) participant of this
    /// merge: its relay task is spawned immediately, so the source gets polled from this moment
    /// on -- its items accumulating in its own buffer until its turn in the merged output comes.\
    /// Registration order defines emission order.
    pub fn subscribe<IntoString:   Into<String>,
                     SourceStream: Stream<Item=ItemType> + Send + 'static>
                    (&mut self,
                     source_name: IntoString,
                     source:      SourceStream)
                    -> &mut Self {
        let source_name = source_name.into();
        let relay = SourceRelay::<CONFIG, ItemType, MergeChannel>::new(format!("{}, source #{} '{}'", self.merge_name, self.sources.len(), source_name));
        let (output_stream, _stream_id) = relay.create_stream();
        let relay_task = relay.spawn_relay_task(source_name.clone(), source);
        trace!("`reactive-merging::SequentialMerge`: '{}': source #{} '{source_name}' is now subscribed (and being driven)", self.merge_name, self.sources.len());
        self.sources.push(SubscribedSource {
            name: source_name,
            output_stream,
            relay_task,
        });
        self
    }

    /// Convenience for single-valued sources: registers `source_future` as a one-item source.\
    /// See [Self::subscribe()].
    pub fn subscribe_future<IntoString:   Into<String>,
                            SourceFuture: Future<Output=ItemType> + Send + 'static>
                           (&mut self,
                            source_name:   IntoString,
                            source_future: SourceFuture)
                           -> &mut Self {
        self.subscribe(source_name, stream::once(source_future))
    }

    pub fn subscribed_sources_count(&self) -> usize {
        self.sources.len()
    }

    /// Consumes this merge, returning the ordered output `Stream`: all items of source 0 (up to
    /// its end), then all items of source 1, and so on.\
    /// The returned `Stream` ends when -- and only when -- every source ended and had its buffer
    /// drained. Remember subscriptions are eager: sources have been running since
    /// [Self::subscribe()], so items produced before this call (or before the consumption
    /// reaches their source) are simply waiting in their buffers.
    pub fn merged(self) -> impl Stream<Item=ItemType> {
        trace!("`reactive-merging::SequentialMerge`: '{}': the merged output for {} sources is now being handed over", self.merge_name, self.sources.len());
        stream::iter(self.sources.into_iter().map(|source| source.output_stream))
            .flatten()
    }

    /// Gives up on this merge: aborts every source's relay task and drops the buffers, along
    /// with any unconsumed items. For when the merged output is no longer wanted.
    pub fn cancel_and_close(self) {
        for source in &self.sources {
            source.relay_task.abort();
        }
        trace!("`reactive-merging::SequentialMerge`: '{}': canceled -- {} sources had their relay tasks aborted", self.merge_name, self.sources.len());
    }
}

impl<const CONFIG: u64,
     ItemType:     Send + Sync + Debug + 'static,
     MergeChannel: FullDuplexUniChannel<ItemType=ItemType, DerivedItemType=ItemType> + Send + Sync + 'static>
Debug for
SequentialMerge<CONFIG, ItemType, MergeChannel> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SequentialMerge {{merge_name: '{}', sources: {:?}}}",
               self.merge_name, self.sources.iter().map(|source| &source.name).collect::<Vec<_>>())
    }
}


/// Unit tests & enforces the requisites of the [sequential_merge](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;
    use crate::config::RetryingStrategies;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering::Relaxed;
    use std::time::Duration;
    use futures::pin_mut;


    /// Test that our instantiation macros are able to produce merges backed by all possible channel types
    #[cfg_attr(not(doc),test)]
    fn merge_instantiation() {
        let atomic_merge = new_atomic_sequential_merge!(
            ConstConfig {
                ..ConstConfig::default()
            },
            "merge_instantiation (atomic)", String);
        assert_eq!(atomic_merge.subscribed_sources_count(), 0, "A just-instantiated merge should have no sources");

        let fullsync_merge = new_fullsync_sequential_merge!(
            ConstConfig {
                ..ConstConfig::default()
            },
            "merge_instantiation (fullsync)", String);
        assert_eq!(fullsync_merge.subscribed_sources_count(), 0, "A just-instantiated merge should have no sources");

        let crossbeam_merge = new_crossbeam_sequential_merge!(
            ConstConfig {
                ..ConstConfig::default()
            },
            "merge_instantiation (crossbeam)", String);
        assert_eq!(crossbeam_merge.subscribed_sources_count(), 0, "A just-instantiated merge should have no sources");
    }

    /// The property this crate exists for: sources are driven from subscription time,
    /// with no regard to the merged output being consumed (which, here, never happens)
    #[cfg_attr(not(doc),tokio::test(flavor = "multi_thread"))]
    async fn subscription_is_eager() {
        let polled = Arc::new(AtomicBool::new(false));
        let polled_ref = Arc::clone(&polled);
        let mut merge = new_sequential_merge!(ConstConfig::default(), "subscription_is_eager", u32);
        merge.subscribe_future("sole source", async move {
            polled_ref.store(true, Relaxed);
            1
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(polled.load(Relaxed), "The source wasn't driven after subscription -- subscriptions are expected to be eager, not to wait for the merged output to be consumed");
        merge.cancel_and_close();
    }

    /// Ordered emission: even if later sources complete first, their items wait for their turn
    #[cfg_attr(not(doc),tokio::test(flavor = "multi_thread"))]
    async fn emission_follows_registration_order() {
        let (first_sender,  first_receiver)  = tokio::sync::oneshot::channel();
        let (second_sender, second_receiver) = tokio::sync::oneshot::channel();
        let (third_sender,  third_receiver)  = tokio::sync::oneshot::channel();
        let mut merge = new_sequential_merge!(ConstConfig::default(), "emission_follows_registration_order", u32);
        merge.subscribe_future("first",  async move { first_receiver.await.expect("first source canceled") })
             .subscribe_future("second", async move { second_receiver.await.expect("second source canceled") })
             .subscribe_future("third",  async move { third_receiver.await.expect("third source canceled") });
        // completes the sources in reverse registration order
        third_sender.send(3).expect("couldn't complete the third source");
        second_sender.send(2).expect("couldn't complete the second source");
        first_sender.send(1).expect("couldn't complete the first source");
        let observed: Vec<u32> = merge.merged().collect().await;
        assert_eq!(observed, vec![1, 2, 3], "Emission didn't follow the registration order");
    }

    /// A merge with no sources is a `Stream` that ends immediately
    #[cfg_attr(not(doc),tokio::test)]
    async fn empty_merge_completes_immediately() {
        let merge = new_sequential_merge!(ConstConfig::default(), "empty_merge_completes_immediately", u32);
        let merged = merge.merged();
        pin_mut!(merged);
        assert_eq!(merged.next().await, None, "An empty merge should complete immediately");
    }

    /// With a retrying strategy in place, a buffer much smaller than the source's item count
    /// loses nothing -- the relay backs off until the consumer opens up space
    #[cfg_attr(not(doc),tokio::test(flavor = "multi_thread"))]
    async fn small_buffers_with_retrying_lose_no_items() {
        const CONFIG: ConstConfig = ConstConfig {
            source_buffer:     4,
            retrying_strategy: RetryingStrategies::RetryYieldingForUpToMillis(200),
            ..ConstConfig::default()
        };
        const ITEMS: u32 = 256;
        let mut merge = new_sequential_merge!(CONFIG, "small_buffers_with_retrying_lose_no_items", u32);
        merge.subscribe("flood", stream::iter(0..ITEMS));
        let observed: Vec<u32> = merge.merged().collect().await;
        assert_eq!(observed, (0..ITEMS).collect::<Vec<u32>>(), "Items were lost or reordered despite the retrying strategy");
    }

}
