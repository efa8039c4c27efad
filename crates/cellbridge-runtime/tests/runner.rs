use cellbridge_parse::SourceDialect;
use cellbridge_runtime::{
    BridgeConfig, CapabilityDetector, CellAccess, EngineWorker, EnvFlags, HostValue, MemoryGrid,
    QueryOutput, RunnerContext, TypedCellValue, WorkerInit,
};

fn engine() -> EngineWorker {
    let mut grid = MemoryGrid::new();
    grid.set_value(1, 5, TypedCellValue::text("bottom"));
    EngineWorker::spawn(grid).unwrap()
}

#[tokio::test]
async fn sync_and_async_contexts_coexist() {
    let engine = engine();

    let main = CapabilityDetector::with_flags(true, EnvFlags::default());
    let (handle, responses) = engine.connect().unwrap();
    let sync = RunnerContext::start(BridgeConfig::testing(), &main, handle, responses).unwrap();
    assert!(matches!(sync.access(), CellAccess::Sync(_)));

    let embedded = CapabilityDetector::new(true);
    let init: WorkerInit =
        serde_json::from_str(r#"{"flags": {"isEmbedMode": true}}"#).unwrap();
    embedded.configure(init.flags).unwrap();
    let (handle, responses) = engine.connect().unwrap();
    let fallback =
        RunnerContext::start(BridgeConfig::testing(), &embedded, handle, responses).unwrap();
    assert!(matches!(fallback.access(), CellAccess::Async(_)));

    let expected = QueryOutput::Vector(vec![
        None,
        None,
        None,
        None,
        Some(HostValue::Text("bottom".into())),
    ]);
    assert_eq!(sync.query_cells("A1:A5").await.unwrap(), expected);
    assert_eq!(fallback.query_cells("A1:A5").await.unwrap(), expected);
}

#[test]
fn source_preparation_matches_transport() {
    let engine = engine();
    let source = "const x = q.cells('A1:B5'); return x;";

    let (handle, responses) = engine.connect().unwrap();
    let sync = RunnerContext::start(
        BridgeConfig::testing(),
        &CapabilityDetector::with_flags(true, EnvFlags::default()),
        handle,
        responses,
    )
    .unwrap();
    assert_eq!(sync.prepare_source(source, SourceDialect::JavaScript), source);

    let (handle, responses) = engine.connect().unwrap();
    let no_shared_memory = CapabilityDetector::new(false);
    let rewriting =
        RunnerContext::start(BridgeConfig::testing(), &no_shared_memory, handle, responses).unwrap();
    assert_eq!(
        rewriting.prepare_source(source, SourceDialect::JavaScript),
        "const x = (await q.cells('A1:B5')); return x;"
    );
}
