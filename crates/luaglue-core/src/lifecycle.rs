//! Process-wide setup and teardown.
//!
//! [`init`] turns on teardown recording: every class registered afterwards
//! queues its cached bindings for release. [`quit`] writes the binding doc
//! (when configured), releases the queued classes in registration order and
//! turns recording off again.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tracing::debug;

use crate::binding_doc::write_binding_doc;
use crate::class::{BoundType, lock};
use crate::error::BindError;

/// File name used by [`GlueConfig::with_default_binding_doc`].
pub const DEFAULT_BINDING_DOC_FILE: &str = "luaglue_binding_doc.txt";

/// Options for [`init_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlueConfig {
    /// Queue each newly registered class for release by [`quit`].
    pub record_teardown: bool,
    /// Where [`quit`] writes the binding doc; `None` disables it.
    pub binding_doc_path: Option<PathBuf>,
}

impl Default for GlueConfig {
    fn default() -> Self {
        Self {
            record_teardown: true,
            binding_doc_path: None,
        }
    }
}

impl GlueConfig {
    pub fn with_binding_doc(mut self, path: impl Into<PathBuf>) -> Self {
        self.binding_doc_path = Some(path.into());
        self
    }

    pub fn with_default_binding_doc(self) -> Self {
        self.with_binding_doc(DEFAULT_BINDING_DOC_FILE)
    }

    pub fn record_teardown(mut self, record: bool) -> Self {
        self.record_teardown = record;
        self
    }
}

#[derive(Default)]
struct Lifecycle {
    config: Option<GlueConfig>,
    teardowns: Vec<Arc<BoundType>>,
}

impl Lifecycle {
    fn recording(&self) -> bool {
        self.config.as_ref().is_some_and(|c| c.record_teardown)
    }
}

static LIFECYCLE: OnceLock<Mutex<Lifecycle>> = OnceLock::new();

fn state() -> MutexGuard<'static, Lifecycle> {
    lock(LIFECYCLE.get_or_init(|| Mutex::new(Lifecycle::default())))
}

/// Enable teardown recording with the default configuration.
pub fn init() {
    init_with(GlueConfig::default());
}

pub fn init_with(config: GlueConfig) {
    debug!(?config, "luaglue initialized");
    state().config = Some(config);
}

/// Whether classes registered now are queued for [`quit`].
pub fn is_recording() -> bool {
    state().recording()
}

pub(crate) fn record_teardown(class: &Arc<BoundType>) {
    let mut state = state();
    if state.recording() && class.mark_teardown_recorded() {
        state.teardowns.push(Arc::clone(class));
    }
}

/// Release every recorded class and stop recording.
///
/// The binding doc is written before anything is released. Classes are
/// released even if writing it fails; the write error is returned.
pub fn quit() -> Result<(), BindError> {
    let (config, teardowns) = {
        let mut state = state();
        (state.config.take(), std::mem::take(&mut state.teardowns))
    };

    let written = match config.and_then(|c| c.binding_doc_path) {
        Some(path) => write_binding_doc(&path),
        None => Ok(()),
    };

    let released = teardowns.len();
    for class in teardowns {
        class.deallocate();
    }
    debug!(released, "luaglue shut down");
    written
}
