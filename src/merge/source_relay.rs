//! Resting place for [SourceRelay], the per-source plumbing of a [crate::merge::SequentialMerge]

use crate::{
    config::{
        ConstConfig,
        RetryingStrategies,
    },
    types::MergedMutinyStream,
};
use std::{
    fmt::Debug,
    future,
    sync::Arc,
    time::{Duration, SystemTime},
};
use futures::{Stream, StreamExt, pin_mut};
use keen_retry::ExponentialJitter;
use log::{error, trace, warn};
use reactive_mutiny::prelude::FullDuplexUniChannel;


/// Our special sender over a `reactive-mutiny` channel, adding
/// retrying logic & source control return values
/// -- used to relay a subscribed source's items into its ordered buffer,
/// from which the merged output will consume them when that source's turn comes.\
/// The [Self::send()] method honors whatever retrying config is specified in `CONFIG`.
pub struct SourceRelay<const CONFIG:  u64,
                       ItemType:      Send + Sync + Debug + 'static,
                       MergeChannel:  FullDuplexUniChannel<ItemType=ItemType, DerivedItemType=ItemType> + Send + Sync> {
    channel: Arc<MergeChannel>,
}

impl<const CONFIG: u64,
     ItemType:     Send + Sync + Debug + 'static,
     MergeChannel: FullDuplexUniChannel<ItemType=ItemType, DerivedItemType=ItemType> + Send + Sync + 'static>
SourceRelay<CONFIG, ItemType, MergeChannel> {

    /// The instance config this generic implementation adheres to
    pub const CONST_CONFIG: ConstConfig = ConstConfig::from(CONFIG);

    /// Instantiates a new buffering `channel` (from `reactive-mutiny`, with type `MergeChannel`),
    /// wrapped in a way to allow our special [Self::send()] to operate on it
    pub fn new<IntoString: Into<String>>(channel_name: IntoString) -> Self {
        Self {
            channel: MergeChannel::new(channel_name.into()),
        }
    }

    /// Returns the `Stream` that will yield this source's relayed items -- ending only after
    /// [Self::flush_and_close()] or [Self::cancel_and_close()] is called and the buffer is exhausted
    pub fn create_stream(&self) -> (MergedMutinyStream<ItemType, MergeChannel>, u32) {
        self.channel.create_stream()
    }

    /// mapper for eventual first-time-being retrying attempts -- or for fatal errors that might happen during retrying
    fn retry_error_mapper(end_source: bool, error_msg: String) -> ((), (bool, String) ) {
        ( (), (end_source, error_msg) )
    }
    /// mapper for any fatal errors that happens on the first attempt (which should not happen in the current `reactive-mutiny` channel API)
    fn first_attempt_error_mapper<T>(_: T, _: ()) -> ((), (bool, String) ) {
        panic!("reactive-merging: SourceRelay::send(): BUG! `reactive-mutiny` channels are expected never to fail fatably. Please, fix!")
    }

    /// Routes `item` (coming from the subscribed source) to the source's ordered buffer,
    /// honoring the configured retrying options.\
    /// Returns `Ok` if sent, `Err(details)` if sending was not possible, where `details` contain:
    ///   - `(end_source?, error_message)`
    #[inline(always)]
    pub async fn send(&self,
                      item: ItemType)
                     -> Result<(), (/*end_source?*/bool, /*error_message: */String)> {

        let retryable = self.channel.send(item);
        match Self::CONST_CONFIG.retrying_strategy {
            RetryingStrategies::DoNotRetry => {
                retryable
                    .map_input_and_errors(
                        Self::first_attempt_error_mapper,
                        |item, _err|
                            Self::retry_error_mapper(false, format!("Relaying item '{:?}' to its source's buffer failed. The item will be dropped (without ending the source) due to retrying config {:?}",
                                                                                    item, Self::CONST_CONFIG.retrying_strategy)) )
                    .into_result()
            },
            RetryingStrategies::EndSource => {
                retryable
                    .map_input_and_errors(
                        Self::first_attempt_error_mapper,
                        |item, _err|
                            Self::retry_error_mapper(true, format!("Relaying item '{:?}' to its source's buffer failed. The source will be ended due to retrying config {:?}",
                                                                                  item, Self::CONST_CONFIG.retrying_strategy)) )
                    .into_result()
            },
            RetryingStrategies::RetryWithBackoffUpTo(attempts) => {
                retryable
                    .map_input(|item| ( item, SystemTime::now()) )
                    .retry_with_async(|(item, retry_start)| future::ready(
                        self.channel.send(item)
                            .map_input(|item| (item, retry_start) )
                    ))
                    .with_exponential_jitter(|| ExponentialJitter::FromBackoffRange {
                        backoff_range_millis: 0..=(1.468935_f32.powi(attempts as i32 - 1) as u32),
                        re_attempts: attempts,
                        jitter_ratio: 0.2,
                    })
                    .await
                    .map_input_and_errors(
                        |(item, retry_start), _fatal_err|
                            Self::retry_error_mapper(true, format!("Relaying item '{:?}' to its source's buffer failed. The source will be ended (after exhausting all retries in {:?}) due to retrying config {:?}",
                                                                                   item, retry_start.elapsed(), Self::CONST_CONFIG.retrying_strategy)),
                        |_| (false, String::new()) )
                    .into()
            },
            RetryingStrategies::RetryYieldingForUpToMillis(millis) => {
                retryable
                    .map_input(|item| ( item, SystemTime::now()) )
                    .retry_with_async(|(item, retry_start)| future::ready(
                        self.channel.send(item)
                            .map_input(|item| (item, retry_start) )
                    ))
                    .yielding_until_timeout(Duration::from_millis(millis as u64), || ())
                    .await
                    .map_input_and_errors(
                        |(item, retry_start), _fatal_err|
                            Self::retry_error_mapper(true, format!("Relaying item '{:?}' to its source's buffer failed. The source will be ended (after yielding on retries for {:?}) due to retrying config {:?}",
                                                                                   item, retry_start.elapsed(), Self::CONST_CONFIG.retrying_strategy)),
                        |_| (false, String::new()) )
                    .into()
            },
        }
    }

    /// See [FullDuplexUniChannel::pending_items_count()]
    #[inline(always)]
    pub fn pending_items_count(&self) -> u32 {
        self.channel.pending_items_count()
    }

    /// See [FullDuplexUniChannel::buffer_size()]
    #[inline(always)]
    pub fn buffer_size(&self) -> u32 {
        self.channel.buffer_size()
    }

    /// Flags the buffer that no more items will come, then waits (up to `timeout`) for the
    /// already relayed ones to be consumed -- after which the `Stream` returned by
    /// [Self::create_stream()] will end.\
    /// Returns the number of streams that reached their graceful end within `timeout`.
    pub async fn flush_and_close(&self, timeout: Duration) -> u32 {
        self.channel.gracefully_end_all_streams(timeout).await
    }

    /// Immediately ends the `Stream` returned by [Self::create_stream()], dropping any
    /// buffered items still unconsumed
    pub fn cancel_and_close(&self) {
        self.channel.cancel_all_streams();
    }

    /// Spawns the task that eagerly drains `source`, relaying each item into this relay's
    /// buffer -- returning immediately. This is what makes a [crate::merge::SequentialMerge]
    /// subscription *eager*: the source is polled from this moment on, regardless of when (or
    /// whether) the merged output gets to consume it.\
    /// The task ends by itself when `source` ends (gracefully flushing & closing the buffer)
    /// or when a relaying failure demands the source to be ended, as dictated by the
    /// retrying config.
    pub fn spawn_relay_task<SourceStream: Stream<Item=ItemType> + Send + 'static>
                           (self,
                            source_name: String,
                            source:      SourceStream)
                           -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let relay_start = minstant::Instant::now();
            let mut relayed_count = 0u64;
            pin_mut!(source);
            while let Some(item) = source.next().await {
                match self.send(item).await {
                    Ok(()) => relayed_count += 1,
                    Err((end_source, error_message)) => {
                        if end_source {
                            error!("`reactive-merging::SourceRelay`: source '{source_name}' is being ended prematurely: {error_message}");
                            break
                        } else {
                            warn!("`reactive-merging::SourceRelay`: {error_message}");
                        }
                    },
                }
            }
            self.flush_and_close(ConstConfig::extract_flush_timeout(CONFIG)).await;
            trace!("`reactive-merging::SourceRelay`: source '{source_name}' ended after relaying {relayed_count} items in {:?}", relay_start.elapsed());
        })
    }
}


/// Unit tests & enforces the requisites of the [source_relay](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;
    use crate::types::AtomicMergeChannel;


    const CONFIG: ConstConfig = ConstConfig {
        source_buffer: 16,
        ..ConstConfig::default()
    };
    const CONFIG_U64: u64 = CONFIG.into();
    type TestRelay = SourceRelay::<CONFIG_U64, u32, AtomicMergeChannel<u32, {CONFIG.source_buffer as usize}>>;

    /// The channel -> stream -> graceful close contract our merged output depends on:
    /// items come out in relaying order and the stream only ends after a close + full drainage
    #[cfg_attr(not(doc),tokio::test)]
    async fn relaying_preserves_order_and_closing_ends_the_stream() {
        let relay = TestRelay::new("relaying_preserves_order_and_closing_ends_the_stream");
        let (mut stream, _stream_id) = relay.create_stream();
        for item in 0..10 {
            relay.send(item).await
                .unwrap_or_else(|(_end_source, error_message)| panic!("couldn't relay item {item}: {error_message}"));
        }
        relay.flush_and_close(Duration::from_millis(100)).await;
        for expected in 0..10 {
            assert_eq!(stream.next().await, Some(expected), "Wrong item relayed");
        }
        assert_eq!(stream.next().await, None, "The source's `Stream` didn't end after the close + drainage");
    }

    /// Spawned relay tasks must drive the source on their own -- consuming happens later, at will
    #[cfg_attr(not(doc),tokio::test(flavor = "multi_thread"))]
    async fn relay_task_drives_the_source() {
        let relay = TestRelay::new("relay_task_drives_the_source");
        let (stream, _stream_id) = relay.create_stream();
        let handle = relay.spawn_relay_task(String::from("0..10"), futures::stream::iter(0..10));
        handle.await.expect("the relay task panicked");
        let observed: Vec<u32> = stream.collect().await;
        assert_eq!(observed, (0..10).collect::<Vec<u32>>(), "Wrong items relayed");
    }

}
