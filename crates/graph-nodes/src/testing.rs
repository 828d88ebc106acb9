//! Shared harness for node unit tests

use std::sync::Arc;

use graph_engine::{
    CancellationToken, ExecutionService, Graph, GraphBuilder, NodeRegistry, RunOptions, RunReport,
    VecEventSink,
};

pub(crate) fn registry() -> Arc<NodeRegistry> {
    let _ = env_logger::builder().is_test(true).try_init();
    Arc::new(crate::standard_registry().unwrap())
}

pub(crate) fn graph(registry: &NodeRegistry) -> GraphBuilder<'_> {
    GraphBuilder::new(registry, "test", "Test")
}

/// Run a graph with default options, returning the report and feedback messages
pub(crate) async fn run(registry: Arc<NodeRegistry>, graph: &Graph) -> (RunReport, Vec<String>) {
    run_with(registry, graph, RunOptions::default()).await
}

pub(crate) async fn run_with(
    registry: Arc<NodeRegistry>,
    graph: &Graph,
    options: RunOptions,
) -> (RunReport, Vec<String>) {
    let sink = Arc::new(VecEventSink::new());
    let report = ExecutionService::new(registry)
        .with_event_sink(sink.clone())
        .run(graph, options, CancellationToken::new())
        .await;
    (report, sink.feedback_messages())
}
