//! Resting place for [StreamVerifier] -- declarative, deadline-bound `Stream` assertions
//! for tests: state what the stream must yield (and whether it must complete), then
//! [StreamVerifier::verify()] drives it and reports the first violation

use std::{
    error::Error,
    fmt::Debug,
    time::Duration,
};
use futures::{Stream, StreamExt, pin_mut};


/// One step of what a [StreamVerifier] demands from the verified stream
enum Expectation<ItemType> {
    /// The stream must yield exactly this item next
    Next(ItemType),
    /// The stream must yield this many items next, whatever they are
    NextCount(usize),
    /// The stream must end here
    Completion,
}

/// Collects `expect_*()` demands, then [Self::verify()] drives the stream under a single
/// deadline, erring out -- with a description of the violation -- on the first mismatched
/// item, premature end, item-where-the-end-was-expected or on blowing the deadline.\
/// Expectations are checked strictly in the order they were declared.
/// ```nocompile
///     StreamVerifier::new()
///         .expect_next("FIRST")
///         .expect_next("SECOND")
///         .expect_complete()
///         .verify(merge.merged(), Duration::from_secs(6)).await?;
pub struct StreamVerifier<ItemType: PartialEq + Debug> {
    expectations: Vec<Expectation<ItemType>>,
}

impl<ItemType: PartialEq + Debug>
StreamVerifier<ItemType> {

    pub fn new() -> Self {
        Self {
            expectations: Vec::new(),
        }
    }

    /// Demands that the next item yielded by the stream equals `expected`
    pub fn expect_next(mut self, expected: ItemType) -> Self {
        self.expectations.push(Expectation::Next(expected));
        self
    }

    /// Demands that the stream yields `count` more items -- whatever their values
    pub fn expect_next_count(mut self, count: usize) -> Self {
        self.expectations.push(Expectation::NextCount(count));
        self
    }

    /// Demands that the stream ends at this point
    pub fn expect_complete(mut self) -> Self {
        self.expectations.push(Expectation::Completion);
        self
    }

    /// Drives `stream`, checking every declared expectation in order -- all under the single
    /// given `deadline` (covering the whole verification, not each step)
    pub async fn verify(self,
                        stream:   impl Stream<Item=ItemType>,
                        deadline: Duration)
                       -> Result<(), Box<dyn Error + Send + Sync>> {
        match tokio::time::timeout(deadline, Self::drive(self.expectations, stream)).await {
            Ok(verification_result) => verification_result,
            Err(_elapsed) => Err(Box::from(format!("The {deadline:?} deadline elapsed before all expectations could be verified"))),
        }
    }

    async fn drive(expectations: Vec<Expectation<ItemType>>,
                   stream:       impl Stream<Item=ItemType>)
                  -> Result<(), Box<dyn Error + Send + Sync>> {
        pin_mut!(stream);
        for (expectation_index, expectation) in expectations.into_iter().enumerate() {
            match expectation {
                Expectation::Next(expected) => match stream.next().await {
                    Some(observed) if observed == expected => (),
                    Some(observed) => return Err(Box::from(format!("Expectation #{expectation_index}: expected the item {expected:?}, but the stream yielded {observed:?}"))),
                    None                    => return Err(Box::from(format!("Expectation #{expectation_index}: expected the item {expected:?}, but the stream ended"))),
                },
                Expectation::NextCount(count) => for n in 0..count {
                    if stream.next().await.is_none() {
                        return Err(Box::from(format!("Expectation #{expectation_index}: expected {count} items, but the stream ended after {n} of them")));
                    }
                },
                Expectation::Completion => if let Some(unexpected) = stream.next().await {
                    return Err(Box::from(format!("Expectation #{expectation_index}: expected the stream to end, but it yielded {unexpected:?}")));
                },
            }
        }
        Ok(())
    }
}

impl<ItemType: PartialEq + Debug>
Default for
StreamVerifier<ItemType> {
    fn default() -> Self {
        Self::new()
    }
}


/// Unit tests & enforces the requisites of the [verifier](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;
    use futures::stream;


    #[cfg_attr(not(doc),tokio::test)]
    async fn honored_expectations() {
        StreamVerifier::new()
            .expect_next(1)
            .expect_next_count(2)
            .expect_next(4)
            .expect_complete()
            .verify(stream::iter(vec![1, 2, 3, 4]), Duration::from_secs(1)).await
            .expect("All expectations were honored, so the verification should have succeeded");
    }

    #[cfg_attr(not(doc),tokio::test)]
    async fn mismatched_item() {
        let verification_result = StreamVerifier::new()
            .expect_next(1)
            .expect_next(99)
            .verify(stream::iter(vec![1, 2]), Duration::from_secs(1)).await;
        let error_message = verification_result.expect_err("A mismatched item should fail the verification").to_string();
        assert_eq!(error_message, "Expectation #1: expected the item 99, but the stream yielded 2", "Wrong error message");
    }

    #[cfg_attr(not(doc),tokio::test)]
    async fn premature_end() {
        let verification_result = StreamVerifier::new()
            .expect_next(1)
            .expect_next(2)
            .verify(stream::iter(vec![1]), Duration::from_secs(1)).await;
        let error_message = verification_result.expect_err("A premature end should fail the verification").to_string();
        assert_eq!(error_message, "Expectation #1: expected the item 2, but the stream ended", "Wrong error message");
    }

    #[cfg_attr(not(doc),tokio::test)]
    async fn unexpected_extra_item() {
        let verification_result = StreamVerifier::new()
            .expect_next(1)
            .expect_complete()
            .verify(stream::iter(vec![1, 2]), Duration::from_secs(1)).await;
        let error_message = verification_result.expect_err("An item where the end was expected should fail the verification").to_string();
        assert_eq!(error_message, "Expectation #1: expected the stream to end, but it yielded 2", "Wrong error message");
    }

    /// A stream that never completes must fail by deadline, not hang the verification
    #[cfg_attr(not(doc),tokio::test)]
    async fn blown_deadline() {
        let verification_result = StreamVerifier::new()
            .expect_next(1)
            .expect_complete()
            .verify(stream::iter(vec![1]).chain(stream::pending()), Duration::from_millis(100)).await;
        verification_result.expect_err("A never-ending stream should blow the deadline");
    }

}
