/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Engine wiring.
//!
//! Assembles the persistence core over a log: the session contexts store
//! (owned by the caller's framer thread), the indexer agent on its own
//! thread, and the replayer agent on its own thread. The framer and the
//! transport itself stay outside this crate; the engine only owns what makes
//! the gateway recoverable.

use crate::config::EngineConfig;
use ferrofix_core::agent::{AgentRunner, BackoffIdleStrategy};
use ferrofix_core::error::{GatewayError, SharedErrorSink};
use ferrofix_index::indexer::{Index, Indexer};
use ferrofix_index::query::ReplayQuery;
use ferrofix_index::replay_index::ReplayIndex;
use ferrofix_log::completion::CompletionPosition;
use ferrofix_log::traits::{LogArchive, LogPublication, LogSubscription};
use ferrofix_replay::replayer::Replayer;
use ferrofix_store::contexts::SessionContexts;
use ferrofix_store::mapped_file::MappedFile;
use std::collections::HashMap;
use std::sync::Arc;

/// The running persistence core: contexts store plus indexer and replayer
/// agents.
pub struct PersistenceEngine {
    session_contexts: SessionContexts,
    completion_position: Arc<CompletionPosition>,
    indexer_runner: AgentRunner,
    replayer_runner: AgentRunner,
}

impl PersistenceEngine {
    /// Launches the engine.
    ///
    /// `index_subscription` tails the sent-message stream,
    /// `resend_subscription` tails the received-message stream, and
    /// `replay_publication` is the exclusive outbound publication replayed
    /// messages are committed to.
    ///
    /// # Errors
    /// Returns [`GatewayError`] if any mapped file cannot be opened or
    /// validates against a foreign schema.
    pub fn launch<SI, SR, A, P>(
        config: &EngineConfig,
        index_subscription: SI,
        resend_subscription: SR,
        archive: A,
        replay_publication: P,
        error_sink: SharedErrorSink,
    ) -> Result<Self, GatewayError>
    where
        SI: LogSubscription + Send + 'static,
        SR: LogSubscription + Send + 'static,
        A: LogArchive + Clone + Send + 'static,
        P: LogPublication + Send + 'static,
    {
        std::fs::create_dir_all(&config.log_dir)?;

        let contexts_file = MappedFile::create_or_map(
            config.session_contexts_path(),
            config.session_contexts_file_size,
        )?;
        let session_contexts = SessionContexts::open(contexts_file, error_sink.clone())?;

        let replay_index = ReplayIndex::new(
            &config.log_dir,
            config.outbound_stream_id,
            config.index_file_size,
            config.position_file_size,
            config.cache_num_sets,
            config.cache_set_size,
            archive.clone(),
            error_sink.clone(),
        )?;

        let completion_position = Arc::new(CompletionPosition::new());
        let indexer = Indexer::new(
            vec![Box::new(replay_index) as Box<dyn Index>],
            index_subscription,
            &config.agent_name_prefix,
            Arc::clone(&completion_position),
            &archive,
            &error_sink,
        );

        let replayer = Replayer::new(
            resend_subscription,
            ReplayQuery::new(&config.log_dir, config.outbound_stream_id),
            archive,
            replay_publication,
            &config.agent_name_prefix,
            error_sink,
        );

        tracing::info!(
            log_dir = %config.log_dir.display(),
            outbound_stream_id = config.outbound_stream_id,
            inbound_stream_id = config.inbound_stream_id,
            "launching persistence engine"
        );
        Ok(Self {
            session_contexts,
            completion_position,
            indexer_runner: AgentRunner::start(indexer, BackoffIdleStrategy::default()),
            replayer_runner: AgentRunner::start(replayer, BackoffIdleStrategy::default()),
        })
    }

    /// The durable session identity store. Single-writer: call only from the
    /// framer's thread.
    pub fn session_contexts(&mut self) -> &mut SessionContexts {
        &mut self.session_contexts
    }

    /// Shuts the engine down.
    ///
    /// `completed_positions` carries, per publisher, the final position the
    /// framer committed; the indexer drains its subscription up to exactly
    /// those positions before releasing its files.
    pub fn close(mut self, completed_positions: HashMap<i32, u64>) {
        tracing::info!("closing persistence engine");
        self.completion_position.complete(completed_positions);
        self.indexer_runner.close();
        self.replayer_runner.close();
    }
}
