//! Resting place for [GatedTaskService] & the [TaskProcessor] trait it executes

use crate::gate::release_gate::ReleaseGate;
use std::{
    error::Error,
    fmt::{Debug, Formatter},
    future::Future,
    sync::Arc,
    sync::atomic::{AtomicU32, Ordering::Relaxed},
};
use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, trace, warn};
use tokio::sync::oneshot;


static TASK_COUNTER: AtomicU32 = AtomicU32::new(0);
pub type TaskId = u32;


/// The computation a [GatedTaskService] applies to each submitted task, once released.\
/// Implementors are shared (behind an `Arc`) among all of the service's in-flight tasks.
#[async_trait]
pub trait TaskProcessor {
    type Input:  Send        + 'static;
    type Output: Send + Sync + 'static;
    async fn process(&self, input: Self::Input) -> Self::Output;
}


/// A service accepting task submissions at any time, but only *executing* them once its
/// [ReleaseGate] releases: each submission gets a future that completes with the processor's
/// output -- eventually, provided the gate ever releases.\
/// Submissions are independent: they run (and complete) in no particular order among
/// themselves -- pair this with a [crate::merge::SequentialMerge] when ordering matters.
pub struct GatedTaskService<Processor: TaskProcessor + Send + Sync + 'static> {
    service_name:        String,
    gate:                ReleaseGate,
    processor:           Arc<Processor>,
    /// in-flight tasks' completion channels, by task id -- entries are removed
    /// when the task completes (or will never complete)
    pending_completions: Arc<DashMap<TaskId, oneshot::Sender<Processor::Output>>>,
}

impl<Processor: TaskProcessor + Send + Sync + 'static>
GatedTaskService<Processor> {

    /// Creates a new service -- with its gate starting "held" -- around the given `processor`
    pub fn new<IntoString: Into<String>>(service_name: IntoString, processor: Processor) -> Self {
        Self {
            service_name:        service_name.into(),
            gate:                ReleaseGate::new(),
            processor:           Arc::new(processor),
            pending_completions: Arc::new(DashMap::new()),
        }
    }

    /// Registers a task to process `input` as soon as this service's gate releases, returning
    /// immediately with the future of its output.\
    /// The returned future errs (rather than hanging) if the task is canceled before
    /// completing -- for instance, if the service is dropped while its gate is still held.
    pub fn submit(&self,
                  input: Processor::Input)
                 -> impl Future<Output=Result<Processor::Output, Box<dyn Error + Send + Sync>>> + Send {
        let task_id = TASK_COUNTER.fetch_add(1, Relaxed);
        let (completion_sender, completion_receiver) = oneshot::channel();
        self.pending_completions.insert(task_id, completion_sender);
        let mut gate_subscription = self.gate.subscribe();
        let processor = Arc::clone(&self.processor);
        let pending_completions = Arc::clone(&self.pending_completions);
        let service_name = self.service_name.clone();
        tokio::spawn(async move {
            trace!("`reactive-merging::GatedTaskService`: '{service_name}': task #{task_id} is parked, waiting for the release signal");
            if let Err(err) = gate_subscription.wait_for_release().await {
                warn!("`reactive-merging::GatedTaskService`: '{service_name}': task #{task_id} will never run: {err}");
                pending_completions.remove(&task_id);
                return;
            }
            let output = processor.process(input).await;
            match pending_completions.remove(&task_id) {
                Some((_task_id, completion_sender)) => if completion_sender.send(output).is_err() {
                    debug!("`reactive-merging::GatedTaskService`: '{service_name}': the submitter gave up waiting for task #{task_id}'s output");
                },
                None => warn!("`reactive-merging::GatedTaskService`: '{service_name}': BUG! the completion entry for task #{task_id} vanished. Please, fix!"),
            }
        });
        let service_name = self.service_name.clone();
        async move {
            completion_receiver.await
                .map_err(|_canceled| Box::from(format!("`reactive-merging::GatedTaskService`: '{service_name}': task #{task_id} was canceled before producing its output")))
        }
    }

    /// Signals all parked (and future) tasks to run.\
    /// Shortcut for `gate().release()`.
    pub fn release(&self) {
        self.gate.release();
    }

    /// Access to this service's gate, for finer control ([ReleaseGate::set_released()],
    /// [ReleaseGate::subscribe()], ...)
    pub fn gate(&self) -> &ReleaseGate {
        &self.gate
    }

    /// How many submitted tasks didn't complete yet -- parked and currently-executing alike
    pub fn pending_tasks_count(&self) -> usize {
        self.pending_completions.len()
    }
}

impl<Processor: TaskProcessor + Send + Sync + 'static>
Debug for
GatedTaskService<Processor> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "GatedTaskService {{service_name: '{}', released: {}, pending tasks: {}}}",
               self.service_name, self.gate.is_released(), self.pending_completions.len())
    }
}


/// Unit tests & enforces the requisites of the [gated_service](self) module
#[cfg(any(test,doc))]
mod tests {
    use super::*;
    use std::time::Duration;


    /// Doubles numbers, once allowed to
    struct DoublingProcessor;
    #[async_trait]
    impl TaskProcessor for DoublingProcessor {
        type Input  = u32;
        type Output = u32;
        async fn process(&self, input: u32) -> u32 {
            input * 2
        }
    }

    /// Submissions must be parked -- not run, not completed -- until the gate releases
    #[cfg_attr(not(doc),tokio::test(flavor = "multi_thread"))]
    async fn tasks_are_parked_until_released() {
        let service = GatedTaskService::new("tasks_are_parked_until_released", DoublingProcessor);
        let completion = service.submit(21);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.pending_tasks_count(), 1, "A submitted task should remain pending while the gate is held");
        service.release();
        let output = completion.await.expect("the task was canceled");
        assert_eq!(output, 42, "Wrong processor output");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.pending_tasks_count(), 0, "Completed tasks should no longer be pending");
    }

    /// "Proceed by default": with the gate released up-front, submissions run immediately
    #[cfg_attr(not(doc),tokio::test(flavor = "multi_thread"))]
    async fn released_gates_let_tasks_run_immediately() {
        let service = GatedTaskService::new("released_gates_let_tasks_run_immediately", DoublingProcessor);
        service.release();
        let output = tokio::time::timeout(Duration::from_millis(500), service.submit(5)).await
            .expect("An up-front released gate should let the task complete right away")
            .expect("the task was canceled");
        assert_eq!(output, 10, "Wrong processor output");
    }

    /// A release completes every parked task, each exactly once, independently
    #[cfg_attr(not(doc),tokio::test(flavor = "multi_thread"))]
    async fn release_completes_all_parked_tasks() {
        let service = GatedTaskService::new("release_completes_all_parked_tasks", DoublingProcessor);
        let completions: Vec<_> = (0..10).map(|input| service.submit(input)).collect();
        assert_eq!(service.pending_tasks_count(), 10, "All submissions should be pending while the gate is held");
        service.release();
        for (input, completion) in completions.into_iter().enumerate() {
            let output = completion.await.expect("a task was canceled");
            assert_eq!(output, 2 * input as u32, "Wrong processor output");
        }
    }

    /// Dropping the service while tasks are parked must err their futures out, not hang them
    #[cfg_attr(not(doc),tokio::test(flavor = "multi_thread"))]
    async fn dropped_services_dont_hang_submitters() {
        let service = GatedTaskService::new("dropped_services_dont_hang_submitters", DoublingProcessor);
        let completion = service.submit(1);
        drop(service);
        let completion_result = tokio::time::timeout(Duration::from_secs(1), completion).await
            .expect("A task whose service was dropped should resolve (to an error) promptly");
        assert!(completion_result.is_err(), "A task whose service was dropped (gate still held) should err, as it will never run");
    }

}
