/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! The replayer agent.
//!
//! Polls the inbound stream for `ResendRequest` (35=2). For each request it
//! looks the sequence range up in the replay index, reads the exact
//! historical bytes back from the archive, rewrites them as possible
//! duplicates, and re-publishes them on the outbound stream in ascending
//! `(sequence_index, sequence_number)` order.
//!
//! Publication back-pressure is absorbed by retrying the claim under the
//! idle strategy; a claim is never left partially written, commit is the
//! final action. Replayed frames carry [`MessageStatus::CatchupReplay`] so
//! the indexer never re-indexes them.

use crate::possdup::RewritePlan;
use ferrofix_core::agent::{Agent, BackoffIdleStrategy};
use ferrofix_core::error::{PublishError, ReplayError, SharedErrorSink};
use ferrofix_core::frame::{FixMessageFrame, MessageStatus, FIX_MESSAGE_BODY_OFFSET};
use ferrofix_core::scanner::scan;
use ferrofix_index::query::ReplayQuery;
use ferrofix_index::replay_index::ReplayIndexRecord;
use ferrofix_log::frame::{AssemblingHandler, FragmentAssembler, FragmentHandler, FrameHeader};
use ferrofix_log::traits::{LogArchive, LogPublication, LogSubscription};

/// Fragments polled per duty cycle.
const FRAGMENT_LIMIT: usize = 10;

/// Services resend requests by replaying recorded messages.
pub struct Replayer<S, A, P>
where
    S: LogSubscription + Send,
    A: LogArchive + Send,
    P: LogPublication + Send,
{
    subscription: S,
    query: ReplayQuery,
    archive: A,
    publication: P,
    assembler: FragmentAssembler,
    idle: BackoffIdleStrategy,
    error_sink: SharedErrorSink,
    role_name: String,
}

impl<S, A, P> Replayer<S, A, P>
where
    S: LogSubscription + Send,
    A: LogArchive + Send,
    P: LogPublication + Send,
{
    /// Creates the replayer over an inbound subscription, the stream's
    /// replay query, the archive, and the outbound publication.
    pub fn new(
        subscription: S,
        query: ReplayQuery,
        archive: A,
        publication: P,
        agent_name_prefix: &str,
        error_sink: SharedErrorSink,
    ) -> Self {
        Self {
            subscription,
            query,
            archive,
            publication,
            assembler: FragmentAssembler::new(),
            idle: BackoffIdleStrategy::default(),
            error_sink,
            role_name: format!("{agent_name_prefix}replayer"),
        }
    }
}

impl<S, A, P> Agent for Replayer<S, A, P>
where
    S: LogSubscription + Send,
    A: LogArchive + Send,
    P: LogPublication + Send,
{
    fn do_work(&mut self) -> usize {
        let handler = ResendRequestHandler {
            query: &self.query,
            archive: &self.archive,
            publication: &mut self.publication,
            idle: &mut self.idle,
            error_sink: &self.error_sink,
        };
        let mut assembling = AssemblingHandler::new(&mut self.assembler, handler);
        self.subscription.poll(&mut assembling, FRAGMENT_LIMIT)
    }

    fn role_name(&self) -> &str {
        &self.role_name
    }
}

struct ResendRequestHandler<'a, A: LogArchive, P: LogPublication> {
    query: &'a ReplayQuery,
    archive: &'a A,
    publication: &'a mut P,
    idle: &'a mut BackoffIdleStrategy,
    error_sink: &'a SharedErrorSink,
}

impl<A: LogArchive, P: LogPublication> FragmentHandler for ResendRequestHandler<'_, A, P> {
    fn on_fragment(&mut self, payload: &[u8], _header: &FrameHeader) {
        let Ok(frame) = FixMessageFrame::decode(payload) else {
            return;
        };
        if frame.status != MessageStatus::Ok {
            return;
        }
        let scanned = scan(frame.body);
        if !scanned.is_resend_request(frame.body) {
            return;
        }
        self.on_resend_request(frame.session_id, &scanned);
    }
}

impl<A: LogArchive, P: LogPublication> ResendRequestHandler<'_, A, P> {
    fn on_resend_request(&mut self, fix_session_id: u64, scanned: &ferrofix_core::HeaderScan) {
        let (Some(begin), Some(end)) = (scanned.begin_seq_no, scanned.end_seq_no) else {
            self.error_sink.on_error(
                &ReplayError::MalformedRequest {
                    reason: "missing BeginSeqNo or EndSeqNo".to_string(),
                }
                .into(),
            );
            return;
        };

        // EndSeqNo of zero means "through the latest sent message".
        let end = if end == 0 { i32::MAX } else { end as i32 };
        let begin = begin as i32;
        if end < begin {
            return;
        }

        let records = match self.query.query(fix_session_id, begin, end) {
            Ok(records) => records,
            Err(error) => {
                self.error_sink.on_error(&error.into());
                return;
            }
        };

        tracing::debug!(
            fix_session_id,
            begin,
            end,
            matches = records.len(),
            "servicing resend request"
        );
        for record in records {
            self.replay_one(&record);
        }
    }

    fn replay_one(&mut self, record: &ReplayIndexRecord) {
        // Reassemble the recorded frame from its fragments.
        let mut recorded = Vec::with_capacity(record.length as usize);
        let read = self.archive.read(
            record.recording_id as u64,
            record.position as u64,
            record.length as u64,
            &mut |payload: &[u8], _header: &FrameHeader| recorded.extend_from_slice(payload),
        );
        if let Err(error) = read {
            self.error_sink.on_error(&error.into());
            return;
        }

        let frame = match FixMessageFrame::decode(&recorded) {
            Ok(frame) => frame,
            Err(error) => {
                self.error_sink.on_error(&error.into());
                return;
            }
        };

        let plan = match RewritePlan::plan(frame.body) {
            Ok(plan) => plan,
            Err(error) => {
                self.error_sink.on_error(&error.into());
                return;
            }
        };

        let encoded_len = FixMessageFrame::encoded_len(plan.target_len());
        loop {
            match self.publication.try_claim(encoded_len) {
                Ok(claim) => {
                    FixMessageFrame::encode_prefix(
                        claim,
                        frame.session_id,
                        frame.sequence_index,
                        MessageStatus::CatchupReplay,
                        plan.target_len(),
                    );
                    plan.render(&mut claim[FIX_MESSAGE_BODY_OFFSET..]);
                    break;
                }
                Err(PublishError::Backpressure) => self.idle.idle_once(),
                Err(error) => {
                    self.error_sink.on_error(&error.into());
                    return;
                }
            }
        }
        self.idle.reset();

        if let Err(error) = self.publication.commit() {
            self.error_sink.on_error(&error.into());
        }
    }
}
