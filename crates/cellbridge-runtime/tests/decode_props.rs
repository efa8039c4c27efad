use std::sync::OnceLock;
use std::time::Duration;

use cellbridge_runtime::{
    CellError, EngineWorker, ErrorKind, HostValue, MemoryGrid, QueryOutput, SyncBridge,
    TypedCellValue,
};
use chrono::{Duration as ChronoDur, NaiveDate, NaiveTime};
use proptest::prelude::*;

fn host_value() -> impl Strategy<Value = HostValue> {
    prop_oneof![
        "[ -~]{0,24}".prop_map(HostValue::Text),
        "<b>[a-z]{0,8}</b>".prop_map(HostValue::Html),
        "data:image/png;base64,[A-Za-z0-9+/]{4,16}".prop_map(HostValue::Image),
        (-1e12f64..1e12).prop_map(HostValue::Number),
        any::<bool>().prop_map(HostValue::Logical),
        (-86_400_000i64 * 400..86_400_000 * 400)
            .prop_map(|ms| HostValue::Duration(ChronoDur::milliseconds(ms))),
        prop_oneof![
            Just(ErrorKind::Div),
            Just(ErrorKind::Ref),
            Just(ErrorKind::Na),
            Just(ErrorKind::Value),
        ]
        .prop_map(|kind| HostValue::Error(CellError::new(kind))),
        (0u32..86_400, 0u32..1000).prop_map(|(secs, ms)| {
            HostValue::Time(
                NaiveTime::from_num_seconds_from_midnight_opt(secs, ms * 1_000_000).unwrap(),
            )
        }),
        (0i64..20_000, 0u32..86_400).prop_map(|(days, secs)| {
            let date = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap() + ChronoDur::days(days);
            HostValue::Timestamp(
                date.and_time(NaiveTime::from_num_seconds_from_midnight_opt(secs, 0).unwrap()),
            )
        }),
    ]
}

fn bridge() -> &'static SyncBridge {
    static ENGINE: OnceLock<(EngineWorker, SyncBridge)> = OnceLock::new();
    let (_, bridge) = ENGINE.get_or_init(|| {
        let engine = EngineWorker::spawn(MemoryGrid::new()).unwrap();
        let (handle, _responses) = engine.connect().unwrap();
        (engine, SyncBridge::new(handle, Duration::from_secs(5)))
    });
    bridge
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    // Written on the engine side, read through the full handshake.
    #[test]
    fn single_cell_decode_is_identity(value in host_value(), col in 1u32..50, row in 1u32..50) {
        let mut grid = MemoryGrid::new();
        grid.set_value(col, row, TypedCellValue::from(&value));
        let engine = EngineWorker::spawn(grid).unwrap();
        let (handle, _responses) = engine.connect().unwrap();
        let bridge = SyncBridge::new(handle, Duration::from_secs(5));

        let range = format!("{}{}", cellbridge_common::column_to_letters(col), row);
        let out = bridge.query_cells(&range).unwrap();
        prop_assert_eq!(out, QueryOutput::Scalar(Some(value)));
    }

    #[test]
    fn single_cells_are_never_wrapped(col in 1u32..16_384, row in 1u32..1_048_576) {
        let range = format!("{}{}", cellbridge_common::column_to_letters(col), row);
        let out = bridge().query_cells(&range).unwrap();
        prop_assert_eq!(out, QueryOutput::Scalar(None));
    }
}
