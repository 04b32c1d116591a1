pub use crate::collaborators::{
    Authorization, OutgoingEvent, OutgoingKind, ProfileDirectory, Transport, TransportError,
};
pub use crate::error::{Action, ActionFailed, FailureCause, ReasonCode, Result, TimelineError};
pub use crate::timeline::classifier::ClassifierConfig;
pub use crate::timeline::deletion::{DeletionConfig, DeletionOutcome, DeletionPath, DeletionState};
pub use crate::timeline::reactions::{GroupedReactions, ReactionConfig};
pub use crate::timeline::streaming::{TimelineUpdate, UpdateTrigger};
pub use crate::timeline::view::{DisplayRecord, TimelineEntry};
pub use crate::timeline::{
    ChatTimeline, Collaborators, SendOutcome, TimelineHandle, TimelineSnapshot,
};
pub use crate::types::{
    Category, ChatEvent, IncomingEvent, Profile, ReactionRecord, ScopeId, deletion_target_ids,
};

use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

mod collaborators;
mod error;
pub mod timeline;
mod types;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

static TRACING_GUARDS: OnceLock<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceLock::new();

/// Installs the global subscriber: stdout plus a daily-rotated file in `logs_dir`.
/// Only the first call has any effect.
pub fn init_tracing(logs_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(logs_dir)?;

    let mut guards = TRACING_GUARDS
        .get_or_init(|| Mutex::new(None))
        .lock()
        .map_err(|e| TimelineError::LoggingSetup(e.to_string()))?;
    if guards.is_some() {
        return Ok(());
    }

    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("relaychat")
        .filename_suffix("log")
        .build(logs_dir)
        .map_err(|e| TimelineError::LoggingSetup(e.to_string()))?;

    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
    let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let stdout_layer = Layer::new()
        .with_writer(non_blocking_stdout)
        .with_ansi(true)
        .with_target(true);

    let file_layer = Layer::new()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_target(true);

    Registry::default()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| TimelineError::LoggingSetup(e.to_string()))?;

    *guards = Some((file_guard, stdout_guard));

    tracing::debug!(
        target: "relaychat::init_tracing",
        "Logging initialized in directory: {:?}",
        logs_dir
    );
    Ok(())
}

#[derive(Clone, Debug)]
pub struct TimelineConfig {
    /// Directory for log files. Logging is left to the host when unset.
    pub logs_dir: Option<PathBuf>,

    pub classifier: ClassifierConfig,

    pub reactions: ReactionConfig,

    pub deletion: DeletionConfig,

    /// Capacity of the command and completion channels
    pub channel_capacity: usize,

    /// Buffer of each update broadcast stream
    pub stream_buffer: usize,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            logs_dir: None,
            classifier: ClassifierConfig::default(),
            reactions: ReactionConfig::default(),
            deletion: DeletionConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            stream_buffer: timeline::streaming::DEFAULT_STREAM_BUFFER,
        }
    }
}

impl TimelineConfig {
    pub fn new(logs_dir: &Path) -> Self {
        Self {
            logs_dir: Some(logs_dir.to_path_buf()),
            ..Self::default()
        }
    }

    pub fn with_classifier_config(mut self, classifier: ClassifierConfig) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_reaction_config(mut self, reactions: ReactionConfig) -> Self {
        self.reactions = reactions;
        self
    }

    pub fn with_deletion_config(mut self, deletion: DeletionConfig) -> Self {
        self.deletion = deletion;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_stream_buffer(mut self, buffer: usize) -> Self {
        self.stream_buffer = buffer;
        self
    }
}
