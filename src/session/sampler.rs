use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use super::session::Shared;
use crate::audio::FrequencyTap;

/// Frequency sampling loop
///
/// One step per frame while the session is `Recording`: read the tap into
/// the shared buffer in place, then drain whatever the recorder has ready.
/// Late frames are skipped rather than replayed. The loop exits within one
/// step of the session leaving `Recording`.
pub(super) async fn run(shared: Arc<Shared>, mut tap: Box<dyn FrequencyTap>, frame: Duration) {
    let bins = tap.bin_count();
    let mut state_rx = shared.subscribe_state();
    let mut ticker = interval(frame);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut steps: u64 = 0;
    let mut chunks: usize = 0;

    info!("Sampling loop running ({} bins every {:?})", bins, frame);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }

        if !shared.state().is_recording() {
            break;
        }

        shared.frequency_tx.send_modify(|buffer| {
            let buffer = buffer.get_or_insert_with(|| vec![0; bins]);
            buffer.resize(bins, 0);
            tap.read_byte_frequency_data(buffer);
        });
        steps += 1;

        let mut inner = shared.inner.lock().await;
        if !shared.state().is_recording() {
            break;
        }
        let Some(live) = inner.live.as_mut() else {
            break;
        };

        let polled = live.recorder.poll_chunks();
        match polled {
            Ok(ready) => {
                chunks += ready.len();
                inner.accumulated.extend(ready);
            }
            Err(fault) => {
                shared.fail_recording(&mut inner, fault);
                break;
            }
        }
    }

    debug!("Sampling loop exited after {} steps, {} chunks", steps, chunks);
}
