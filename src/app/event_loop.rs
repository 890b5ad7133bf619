use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use super::Agent;
use crate::controller::SamplingModule;
use crate::surface::MetricSink;

const TRIGGER_CAPACITY: usize = 16;
const QUIT_POLL: Duration = Duration::from_millis(100);

impl Agent {
    /// Fires the trigger every interval. Each module runs in its own task and
    /// refreshes once per trigger; a failing module only logs.
    pub(super) async fn event_loop(&mut self, should_quit: Arc<AtomicBool>, print_json: bool) {
        let (trigger, _) = broadcast::channel::<u64>(TRIGGER_CAPACITY);
        let sink: Arc<dyn MetricSink> = self.store.clone();

        let workers: Vec<_> = self
            .modules
            .drain(..)
            .map(|module| {
                module.publish_static(sink.as_ref());
                tokio::spawn(worker(module, trigger.subscribe(), Arc::clone(&sink)))
            })
            .collect();

        let mut interval = tokio::time::interval(self.config.trigger_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tick: u64 = 0;

        while !should_quit.load(Ordering::Relaxed) {
            tokio::select! {
                _ = interval.tick() => {
                    if print_json {
                        match self.store.to_json() {
                            Ok(json) => println!("{json}"),
                            Err(e) => error!(error = %e, "failed to serialize metrics"),
                        }
                    }
                    tick += 1;
                    if trigger.send(tick).is_err() {
                        debug!(tick, "no sampling workers listening");
                    }
                    self.publish_process_state();
                }
                _ = tokio::time::sleep(QUIT_POLL) => {}
            }
        }

        drop(trigger);
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "sampling worker panicked");
            }
        }
    }
}

async fn worker(
    mut module: Box<dyn SamplingModule>,
    mut trigger: broadcast::Receiver<u64>,
    sink: Arc<dyn MetricSink>,
) {
    loop {
        match trigger.recv().await {
            Ok(tick) => {
                if let Err(e) = module.refresh(sink.as_ref()) {
                    warn!(module = module.name(), tick, error = %e, "refresh skipped");
                }
            }
            Err(RecvError::Lagged(missed)) => {
                warn!(module = module.name(), missed, "worker fell behind the trigger");
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!(module = module.name(), "worker finished");
}
