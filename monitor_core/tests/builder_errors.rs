use monitor_core::builder::WorkerBuilder;
use monitor_core::error::BuildError;
use monitor_core::mocks::{MockSampleSource, NullSink};
use rstest::rstest;

#[rstest]
fn builder_missing_source_yields_typed_build_error() {
    let err = WorkerBuilder::new()
        .with_sink(NullSink::default())
        .try_build()
        .expect_err("should fail with MissingSource");

    assert!(matches!(err, BuildError::MissingSource));
}

#[rstest]
fn builder_missing_sink_yields_typed_build_error() {
    let err = WorkerBuilder::new()
        .with_source(MockSampleSource::new())
        .try_build()
        .expect_err("should fail with MissingSink");

    assert!(matches!(err, BuildError::MissingSink));
}
