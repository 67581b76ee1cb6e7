/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The indexer agent.
//!
//! A single consumer tails the sent-message stream and dispatches each
//! fragment to an ordered list of [`Index`] instances (the replay index is
//! the primary; others may piggyback). At construction each index is caught
//! up from its last durably-indexed position to the recording's current
//! position by a bounded archive replay, making the indexes crash-consistent
//! with the log without rebuilding from zero.

use ferrofix_core::agent::{Agent, BackoffIdleStrategy};
use ferrofix_core::error::SharedErrorSink;
use ferrofix_log::completion::CompletionPosition;
use ferrofix_log::frame::{FragmentHandler, FrameHeader};
use ferrofix_log::traits::{LogArchive, LogSubscription, ReplaySubscription};
use std::sync::Arc;

/// Fragments polled per duty cycle.
const FRAGMENT_LIMIT: usize = 20;

/// Bound of the final quiesce drain.
const QUIESCE_FRAGMENT_LIMIT: usize = 1 << 20;

/// An index fed by the indexer.
pub trait Index: FragmentHandler + Send {
    /// Housekeeping work; counted into the indexer's duty cycle.
    fn do_work(&mut self) -> usize {
        0
    }

    /// Yields the last durably-indexed `(log_session_id, recording_id,
    /// position)` triples for catch-up.
    fn read_last_positions(&self, consumer: &mut dyn FnMut(i32, u64, u64));

    /// Releases the index's resources.
    fn close(&mut self);

    /// Name of the index for diagnostics.
    fn name(&self) -> &'static str;
}

/// Incrementally builds indexes by polling a subscription.
pub struct Indexer<S: LogSubscription + Send> {
    indices: Vec<Box<dyn Index>>,
    subscription: S,
    completion_position: Arc<CompletionPosition>,
    role_name: String,
}

impl<S: LogSubscription + Send> Indexer<S> {
    /// Creates the indexer, catching every index up with the archive before
    /// live polling begins.
    ///
    /// Archive errors during catch-up are reported through `error_sink` and
    /// that catch-up is skipped; the index then simply re-learns the gap the
    /// slow way as fragments arrive.
    pub fn new<A: LogArchive>(
        mut indices: Vec<Box<dyn Index>>,
        subscription: S,
        agent_name_prefix: &str,
        completion_position: Arc<CompletionPosition>,
        archive: &A,
        error_sink: &SharedErrorSink,
    ) -> Self {
        catch_up(&mut indices, archive, error_sink);
        Self {
            indices,
            subscription,
            completion_position,
            role_name: format!("{agent_name_prefix}indexer"),
        }
    }

    fn quiesce(&mut self) {
        let mut idle = BackoffIdleStrategy::default();
        while !self.completion_position.has_completed() {
            idle.idle_once();
        }

        if self.completion_position.was_startup_complete() {
            return;
        }

        // Any remaining data to quiesce is in the subscription; drain it up
        // to each publisher's completed position.
        let completion_position = Arc::clone(&self.completion_position);
        let mut handler = QuiescingFanOut {
            indices: &mut self.indices,
            completion_position: completion_position.as_ref(),
        };
        self.subscription.poll(&mut handler, QUIESCE_FRAGMENT_LIMIT);
    }
}

impl<S: LogSubscription + Send> Agent for Indexer<S> {
    fn do_work(&mut self) -> usize {
        let mut fan_out = FanOut {
            indices: &mut self.indices,
        };
        let polled = self.subscription.poll(&mut fan_out, FRAGMENT_LIMIT);
        polled
            + self
                .indices
                .iter_mut()
                .map(|index| index.do_work())
                .sum::<usize>()
    }

    fn on_close(&mut self) {
        self.quiesce();
        for index in &mut self.indices {
            index.close();
        }
    }

    fn role_name(&self) -> &str {
        &self.role_name
    }
}

fn catch_up<A: LogArchive>(
    indices: &mut [Box<dyn Index>],
    archive: &A,
    error_sink: &SharedErrorSink,
) {
    let mut idle = BackoffIdleStrategy::default();

    for index in indices {
        let mut targets = Vec::new();
        index.read_last_positions(&mut |log_session_id, recording_id, position| {
            targets.push((log_session_id, recording_id, position));
        });

        for (_log_session_id, recording_id, indexed_position) in targets {
            let stop_position = match archive.recording_position(recording_id) {
                Ok(position) => position,
                Err(error) => {
                    error_sink.on_error(&error.into());
                    continue;
                }
            };
            if stop_position <= indexed_position {
                continue;
            }

            tracing::debug!(
                index = index.name(),
                recording_id,
                stop_position,
                indexed_position,
                "catching index up with recording"
            );

            let length = stop_position - indexed_position;
            let mut replay = match archive.replay(recording_id, indexed_position, Some(length)) {
                Ok(replay) => replay,
                Err(error) => {
                    error_sink.on_error(&error.into());
                    continue;
                }
            };

            // Only one replay image at a time.
            while !replay.image_attached() {
                idle.idle_once();
            }
            idle.reset();

            while replay.position() < stop_position {
                let handler: &mut dyn FragmentHandler = &mut **index;
                let work_count = replay.poll(handler, FRAGMENT_LIMIT);
                idle.idle(work_count);
            }
            idle.reset();
        }
    }
}

struct FanOut<'a> {
    indices: &'a mut Vec<Box<dyn Index>>,
}

impl FragmentHandler for FanOut<'_> {
    fn on_fragment(&mut self, payload: &[u8], header: &FrameHeader) {
        for index in self.indices.iter_mut() {
            index.on_fragment(payload, header);
        }
    }
}

struct QuiescingFanOut<'a> {
    indices: &'a mut Vec<Box<dyn Index>>,
    completion_position: &'a CompletionPosition,
}

impl FragmentHandler for QuiescingFanOut<'_> {
    fn on_fragment(&mut self, payload: &[u8], header: &FrameHeader) {
        // Fragments beyond the publisher's completed position are
        // post-termination and dropped.
        let Some(completed) = self
            .completion_position
            .completed_position(header.log_session_id)
        else {
            return;
        };
        if header.position <= completed {
            for index in self.indices.iter_mut() {
                index.on_fragment(payload, header);
            }
        }
    }
}
