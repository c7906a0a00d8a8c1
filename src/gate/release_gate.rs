//! Resting place for [ReleaseGate], the resettable "proceed" latch

use std::error::Error;
use log::{debug, trace};
use tokio::sync::watch;


/// A resettable latch parking asynchronous work until signaled to proceed.\
/// Starts "held"; any number of parties may [Self::subscribe()] and await the release --
/// releasing before anyone waits is fine (late waiters return immediately), and the gate may
/// be re-armed with [Self::set_released()] to hold parties that subscribe afterwards.
pub struct ReleaseGate {
    released_sender: watch::Sender<bool>,
}

impl ReleaseGate {

    /// Creates a new gate, in the "held" state
    pub fn new() -> Self {
        let (released_sender, _released_receiver) = watch::channel(false);
        Self {
            released_sender,
        }
    }

    pub fn is_released(&self) -> bool {
        *self.released_sender.borrow()
    }

    /// Moves the gate to the given state, waking any waiters if `released` is `true`.\
    /// Re-arming (passing `false`) only affects parties that subscribe afterwards:
    /// already-woken waiters won't be parked again.
    pub fn set_released(&self, released: bool) {
        let previous = self.released_sender.send_replace(released);
        if released && !previous {
            debug!("`reactive-merging::ReleaseGate`: released -- any parked work may now proceed");
        } else if !released && previous {
            debug!("`reactive-merging::ReleaseGate`: re-armed -- work subscribing from now on will be parked");
        }
    }

    /// Signals any parked (and future) subscribers to proceed.\
    /// Shortcut for `set_released(true)`.
    pub fn release(&self) {
        self.set_released(true);
    }

    /// Returns a handle with which a party may await this gate's release --
    /// valid even after the gate is dropped (in which case waiting on it errors out
    /// rather than hanging)
    pub fn subscribe(&self) -> GateSubscription {
        GateSubscription {
            released_receiver: self.released_sender.subscribe(),
        }
    }

    /// Parks the caller until this gate releases -- returning immediately if it already did.\
    /// See [GateSubscription::wait_for_release()] for the handle-based variant.
    pub async fn wait_for_release(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.subscribe().wait_for_release().await
    }
}


/// A party's handle on a [ReleaseGate], able to await its release
pub struct GateSubscription {
    released_receiver: watch::Receiver<bool>,
}

impl GateSubscription {

    /// Parks the caller until the gate releases -- returning immediately if it already did.\
    /// Errs (rather than hanging) if the gate was dropped while still held.
    pub async fn wait_for_release(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        trace!("`reactive-merging::ReleaseGate`: a party is now waiting for the release signal");
        self.released_receiver.wait_for(|released| *released).await
            .map(|_released_ref| ())
            .map_err(|err| Box::from(format!("The gate was dropped while still held, so the release signal will never come: {err}")))
    }
}


/// Unit tests & enforces the requisites of the [release_gate](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering::Relaxed;
    use std::time::Duration;


    /// Gates start held and a release must wake parties parked beforehand
    #[cfg_attr(not(doc),tokio::test(flavor = "multi_thread"))]
    async fn release_wakes_parked_waiters() {
        let gate = Arc::new(ReleaseGate::new());
        assert!(!gate.is_released(), "Gates must start in the 'held' state");
        let proceeded = Arc::new(AtomicBool::new(false));
        let proceeded_ref = Arc::clone(&proceeded);
        let gate_ref = Arc::clone(&gate);
        let waiter = tokio::spawn(async move {
            gate_ref.wait_for_release().await.expect("waiting failed");
            proceeded_ref.store(true, Relaxed);
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!proceeded.load(Relaxed), "The waiter proceeded before the gate was released");
        gate.release();
        waiter.await.expect("the waiter task panicked");
        assert!(proceeded.load(Relaxed), "The waiter wasn't woken up by the release");
    }

    /// Releasing before anyone waits must not block late waiters
    #[cfg_attr(not(doc),tokio::test)]
    async fn late_waiters_pass_through_released_gates() {
        let gate = ReleaseGate::new();
        gate.release();
        tokio::time::timeout(Duration::from_millis(100), gate.wait_for_release()).await
            .expect("A waiter subscribing after the release should return immediately")
            .expect("waiting failed");
    }

    /// Re-arming holds only parties subscribing afterwards
    #[cfg_attr(not(doc),tokio::test)]
    async fn re_arming_holds_new_subscribers() {
        let gate = ReleaseGate::new();
        gate.release();
        gate.set_released(false);
        assert!(!gate.is_released(), "The gate should be held again after re-arming");
        let wait_result = tokio::time::timeout(Duration::from_millis(50), gate.wait_for_release()).await;
        assert!(wait_result.is_err(), "A party subscribing after the re-arming should be parked");
    }

    /// Dropping a held gate errors the waiters out instead of hanging them
    #[cfg_attr(not(doc),tokio::test)]
    async fn dropped_gates_dont_hang_waiters() {
        let gate = ReleaseGate::new();
        let mut subscription = gate.subscribe();
        drop(gate);
        let wait_result = tokio::time::timeout(Duration::from_millis(100), subscription.wait_for_release()).await
            .expect("Waiting on a dropped gate should resolve immediately");
        assert!(wait_result.is_err(), "Waiting on a dropped (still held) gate should err, as the release signal will never come");
    }

}
