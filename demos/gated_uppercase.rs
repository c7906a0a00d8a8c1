//! The simplest possible demonstration of the `reactive-merging` library -- and of the trap
//! it defuses.
//!
//! # The arrangement:
//!
//! A [GatedTaskService] receives a batch of words to uppercase, but holds them all behind its
//! gate. A [SequentialMerge] combines the batch's completions with a "releaser" source --
//! registered *last* -- which is the only party ever releasing the gate (after holding it for
//! a while, so we can see the early sources provenly parked).
//!
//! Because subscriptions are eager, the releaser runs concurrently with the (parked) early
//! sources and the merge completes, printing every output in registration order. A merge
//! operator deferring its inner subscriptions would hang here forever.
//!
//! Usage:
//! ```nocompile
//! cargo run --example gated_uppercase -- --tasks 8 --hold-millis 500
//! cargo run --example gated_uppercase -- --config demos/gated_uppercase.ron
//! ```

use reactive_merging::prelude::*;
use std::{
    error::Error,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use async_trait::async_trait;
use futures::StreamExt;
use log::{info, warn};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use structopt::StructOpt;


const CONFIG: ConstConfig = ConstConfig {
    retrying_strategy: RetryingStrategies::RetryWithBackoffUpTo(10),
    ..ConstConfig::default()
};

/// Words the demo picks from, lowercased on purpose
const WORDS: &[&str] = &["first", "second", "alpha", "bravo", "charlie", "delta", "echo", "foxtrot", "golf", "hotel"];


/// Command-line options
#[derive(Debug,StructOpt)]
#[structopt(name = "gated_uppercase", about = "Uppercases a batch of gated words through an eagerly-subscribing sequential merge")]
struct CommandLineOptions {
    /// How many words to submit to the gated service
    #[structopt(long, default_value = "8")]
    tasks: u32,
    /// For how long the releaser source holds the gate, in milliseconds
    #[structopt(long, default_value = "500")]
    hold_millis: u64,
    /// Optional .ron file overriding the options above
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,
}

/// The demo's file-loadable configuration -- see [CommandLineOptions::config]
#[derive(Debug,Serialize,Deserialize)]
struct DemoConfig {
    tasks:       u32,
    hold_millis: u64,
}

/// The payload submitted to (and returned by) the gated service
#[derive(Debug,PartialEq)]
struct Data {
    id:    u32,
    value: String,
}

/// Uppercases [Data] values -- whenever the service's gate allows it to
struct DelayedToUppercaseProcessor;
#[async_trait]
impl TaskProcessor for DelayedToUppercaseProcessor {
    type Input  = Data;
    type Output = Data;
    async fn process(&self, input: Data) -> Data {
        Data { id: input.id, value: input.value.to_uppercase() }
    }
}


#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    simple_logger::SimpleLogger::new().with_utc_timestamps().init().unwrap_or_else(|_| eprintln!("--> LOGGER WAS ALREADY STARTED"));

    let command_line_options = CommandLineOptions::from_args();
    let demo_config = match &command_line_options.config {
        Some(config_path) => {
            let ron_contents = std::fs::read_to_string(config_path)
                .map_err(|err| format!("Couldn't read the config file '{}': {err}", config_path.display()))?;
            ron::from_str(&ron_contents)
                .map_err(|err| format!("Couldn't parse the config file '{}': {err}", config_path.display()))?
        },
        None => DemoConfig {
            tasks:       command_line_options.tasks,
            hold_millis: command_line_options.hold_millis,
        },
    };
    info!("Welcome to the `reactive-merging` gated uppercase demo -- running with {demo_config:?}");

    let demo_start = minstant::Instant::now();
    let service = Arc::new(GatedTaskService::new("delayed-to-uppercase", DelayedToUppercaseProcessor));

    // submit the batch (all to be parked) & register its completions, in order
    let mut merge = new_sequential_merge!(CONFIG, "gated_uppercase", String);
    let mut word_picker = rand::thread_rng();
    for task_id in 0..demo_config.tasks {
        let word = *WORDS.choose(&mut word_picker).unwrap_or(&WORDS[0]);
        let completion = service.submit(Data { id: task_id, value: word.to_string() });
        merge.subscribe_future(format!("word #{task_id} '{word}'"), async move {
            completion.await.unwrap_or_else(|err| { warn!("task #{task_id} was canceled: {err}"); Data { id: task_id, value: String::from("<CANCELED>") } }).value
        });
    }

    // the releaser goes last -- were subscriptions lazy, nothing would ever complete
    let releaser_service = Arc::clone(&service);
    let hold_duration = Duration::from_millis(demo_config.hold_millis);
    merge.subscribe_future("releaser", async move {
        info!("Holding the gate for {hold_duration:?}... ({} tasks are parked)", releaser_service.pending_tasks_count());
        tokio::time::sleep(hold_duration).await;
        releaser_service.release();
        info!("Gate released");
        String::from("PROCEEDED")
    });

    // consume the merged output -- in registration order, provenly complete
    let merged = merge.merged();
    futures::pin_mut!(merged);
    let mut outputs_count = 0;
    while let Some(output) = merged.next().await {
        outputs_count += 1;
        println!("{outputs_count:>4}: {output}");
    }
    info!("Done: {outputs_count} outputs ({} words + the releaser's sentinel), in registration order, in {:?}", demo_config.tasks, demo_start.elapsed());

    Ok(())
}
