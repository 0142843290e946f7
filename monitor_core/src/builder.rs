//! Type-state builder for `FsmWorker`.
//!
//! The builder enforces at compile time that a sample source, a state sink,
//! and a config are all provided before `build()` is available. `try_build()`
//! is always available for callers that want a dynamic check instead (the
//! CLI, which only knows at runtime whether every piece was supplied).

use std::marker::PhantomData;
use std::sync::Arc;

use monitor_traits::clock::{Clock, MonotonicClock};
use monitor_traits::{SampleSource, StateSink};

use crate::config::MonitorConfig;
use crate::error::BuildError;
use crate::worker::FsmWorker;

pub struct Missing;
pub struct Set;

/// Builder for `FsmWorker`. Fields are validated together in `try_build()`.
pub struct WorkerBuilder<So, Si, Cf> {
    source: Option<Box<dyn SampleSource>>,
    sink: Option<Box<dyn StateSink>>,
    config: Option<MonitorConfig>,
    clock: Option<Arc<dyn Clock>>,
    _so: PhantomData<So>,
    _si: PhantomData<Si>,
    _cf: PhantomData<Cf>,
}

impl Default for WorkerBuilder<Missing, Missing, Missing> {
    fn default() -> Self {
        Self {
            source: None,
            sink: None,
            config: None,
            clock: None,
            _so: PhantomData,
            _si: PhantomData,
            _cf: PhantomData,
        }
    }
}

impl WorkerBuilder<Missing, Missing, Missing> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<So, Si, Cf> WorkerBuilder<So, Si, Cf> {
    /// Provide a clock other than the default `MonotonicClock` (tests use
    /// this to supply a `TestClock`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Fallible build available in any type-state; returns a typed error
    /// naming whichever required piece is missing or invalid.
    pub fn try_build(self) -> Result<FsmWorker, BuildError> {
        let source = self.source.ok_or(BuildError::MissingSource)?;
        let sink = self.sink.ok_or(BuildError::MissingSink)?;
        let config = self
            .config
            .ok_or_else(|| BuildError::InvalidConfig("no MonitorConfig provided".to_string()))?;

        let errs = config.validate();
        if !errs.is_empty() {
            return Err(BuildError::InvalidConfig(errs.join("; ")));
        }

        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        Ok(FsmWorker::spawn(source, sink, config, clock))
    }
}

impl<Si, Cf> WorkerBuilder<Missing, Si, Cf> {
    pub fn with_source(self, source: impl SampleSource + 'static) -> WorkerBuilder<Set, Si, Cf> {
        WorkerBuilder {
            source: Some(Box::new(source)),
            sink: self.sink,
            config: self.config,
            clock: self.clock,
            _so: PhantomData,
            _si: PhantomData,
            _cf: PhantomData,
        }
    }
}

impl<So, Cf> WorkerBuilder<So, Missing, Cf> {
    pub fn with_sink(self, sink: impl StateSink + 'static) -> WorkerBuilder<So, Set, Cf> {
        WorkerBuilder {
            source: self.source,
            sink: Some(Box::new(sink)),
            config: self.config,
            clock: self.clock,
            _so: PhantomData,
            _si: PhantomData,
            _cf: PhantomData,
        }
    }
}

impl<So, Si> WorkerBuilder<So, Si, Missing> {
    pub fn with_config(self, config: MonitorConfig) -> WorkerBuilder<So, Si, Set> {
        WorkerBuilder {
            source: self.source,
            sink: self.sink,
            config: Some(config),
            clock: self.clock,
            _so: PhantomData,
            _si: PhantomData,
            _cf: PhantomData,
        }
    }
}

impl WorkerBuilder<Set, Set, Set> {
    /// Validate and spawn the worker. Only available once source, sink, and
    /// config have all been provided.
    pub fn build(self) -> Result<FsmWorker, BuildError> {
        self.try_build()
    }
}
