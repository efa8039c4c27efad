use std::thread;
use std::time::Duration;

use cellbridge_runtime::engine::EngineCommand;
use cellbridge_runtime::protocol::{
    EngineRequest, ID_SLOT, LENGTH_SLOT, STATUS_READY, STATUS_SLOT,
};
use cellbridge_runtime::{
    BridgeError, EngineHandle, EngineWorker, HostValue, MemoryGrid, Phase, QueryOutput, SyncBridge,
    TypedCellValue,
};

fn bridge_over(grid: MemoryGrid) -> (EngineWorker, SyncBridge) {
    let engine = EngineWorker::spawn(grid).unwrap();
    let (handle, _responses) = engine.connect().unwrap();
    (engine, SyncBridge::new(handle, Duration::from_secs(5)))
}

fn num(n: f64) -> Option<HostValue> {
    Some(HostValue::Number(n))
}

#[test]
fn blank_cell_is_absent() {
    let mut grid = MemoryGrid::new();
    grid.set_value(1, 1, TypedCellValue::number(0.0));
    let (_engine, bridge) = bridge_over(grid);
    assert_eq!(bridge.query_cells("C7").unwrap(), QueryOutput::Scalar(None));
    // zero is a value, not a blank
    assert_eq!(bridge.query_cells("A1").unwrap(), QueryOutput::Scalar(num(0.0)));
}

#[test]
fn shape_follows_range_not_storage() {
    let mut grid = MemoryGrid::new();
    for row in 1..=3 {
        for col in 1..=3 {
            grid.set_value(col, row, TypedCellValue::number((row * 10 + col) as f64));
        }
    }
    let (_engine, bridge) = bridge_over(grid);

    assert_eq!(
        bridge.query_cells("A1:C1").unwrap(),
        QueryOutput::Vector(vec![num(11.0), num(12.0), num(13.0)])
    );
    assert_eq!(
        bridge.query_cells("B1:B3").unwrap(),
        QueryOutput::Vector(vec![num(12.0), num(22.0), num(32.0)])
    );
    assert_eq!(
        bridge.query_cells("C:C").unwrap(),
        QueryOutput::Vector(vec![num(13.0), num(23.0), num(33.0)])
    );
    assert_eq!(
        bridge.query_cells("B2:C3").unwrap(),
        QueryOutput::Matrix(vec![vec![num(22.0), num(23.0)], vec![num(32.0), num(33.0)]])
    );
    // open end: always a matrix, even when it resolves to one row
    assert_eq!(
        bridge.query_cells("A3:").unwrap(),
        QueryOutput::Matrix(vec![vec![num(31.0), num(32.0), num(33.0)]])
    );
}

#[test]
fn engine_domain_errors_surface_as_decode_errors() {
    let (_engine, bridge) = bridge_over(MemoryGrid::new());
    let err = bridge.query_cells("Ghost!A1").unwrap_err();
    assert!(err.to_string().contains("unknown sheet"));
}

#[test]
fn zero_length_never_starts_phase_two() {
    let (handle, mut commands, _responses) = EngineHandle::pair();
    let fake = thread::spawn(move || {
        let mut seen_data = false;
        while let Some(EngineCommand::Request { request, .. }) = commands.blocking_recv() {
            match request {
                EngineRequest::Length(req) => {
                    req.buffer.store(LENGTH_SLOT, 0);
                    req.buffer.store(ID_SLOT, 42);
                    req.buffer.store_and_notify(STATUS_SLOT, STATUS_READY);
                }
                EngineRequest::Data(_) => seen_data = true,
                EngineRequest::AsyncCells(_) => {}
            }
        }
        seen_data
    });

    let bridge = SyncBridge::new(handle, Duration::from_secs(5));
    assert!(matches!(
        bridge.query_cells("A1"),
        Err(BridgeError::EmptyResult)
    ));
    drop(bridge);
    assert!(!fake.join().unwrap(), "phase 2 must not be attempted");
}

#[test]
fn unresponsive_engine_times_out() {
    let (handle, _commands, _responses) = EngineHandle::pair();
    let bridge = SyncBridge::new(handle, Duration::from_millis(50));
    let err = bridge.query_cells("A1:B2").unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Timeout {
            phase: Phase::Length,
            ..
        }
    ));
}

#[test]
fn engine_gone_is_disconnected() {
    let (engine, bridge) = bridge_over(MemoryGrid::new());
    engine.shutdown().unwrap();
    assert!(matches!(
        bridge.query_cells("A1"),
        Err(BridgeError::Disconnected)
    ));
}

#[test]
fn several_runners_share_one_engine() {
    let mut grid = MemoryGrid::new();
    grid.set_value(1, 1, TypedCellValue::text("shared"));
    let engine = EngineWorker::spawn(grid).unwrap();

    let runners: Vec<_> = (0..4)
        .map(|_| {
            let (handle, _responses) = engine.connect().unwrap();
            let bridge = SyncBridge::new(handle, Duration::from_secs(5));
            thread::spawn(move || {
                (0..25)
                    .map(|_| bridge.query_cells("A1").unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for runner in runners {
        for out in runner.join().unwrap() {
            assert_eq!(
                out,
                QueryOutput::Scalar(Some(HostValue::Text("shared".into())))
            );
        }
    }
}
