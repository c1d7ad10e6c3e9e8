use std::fs;

use sparseflow::replay::{FlowRecord, FlowRecorder, ReplayError, ReplayMode, RUN_LOG_FILENAME};
use sparseflow::tracking::{TrackPoint, TrackStatus};

fn records() -> Vec<FlowRecord> {
    let tracks = [
        TrackPoint {
            position: [10.5, 20.25],
            status: TrackStatus::Tracked,
            error: Some(0.5),
        },
        TrackPoint {
            position: [-3.0, 7.0],
            status: TrackStatus::Lost,
            error: None,
        },
    ];
    vec![
        FlowRecord::from_tracks(vec![[10.0, 20.0], [-2.0, 7.5]], vec![[4.0, 4.0]], &tracks),
        FlowRecord::default(),
    ]
}

#[test]
fn store_then_load() -> Result<(), ReplayError> {
    let tmp_dir = tempfile::tempdir()?;
    let records = records();
    assert_eq!(records[0].status, vec![1, 0]);

    let mut recorder = FlowRecorder::new(ReplayMode::Store, tmp_dir.path(), "MH_01", "run --store")?;
    for record in &records {
        assert!(recorder.store(record)?);
    }
    assert_eq!(recorder.current_id(), 2);
    assert!(tmp_dir.path().join("MH_01").join("0.bin").exists());
    assert!(tmp_dir.path().join("MH_01").join("1.bin").exists());
    assert_eq!(recorder.load()?, None);

    let mut loader = FlowRecorder::new(ReplayMode::Load, tmp_dir.path(), "MH_01", "run --load")?;
    assert!(!loader.store(&records[0])?);
    assert_eq!(loader.load()?, Some(records[0].clone()));
    assert_eq!(loader.load()?, Some(records[1].clone()));

    // past the last record the position stays put
    assert_eq!(loader.load()?, None);
    assert_eq!(loader.current_id(), 2);

    let log = fs::read_to_string(tmp_dir.path().join("MH_01").join(RUN_LOG_FILENAME))?;
    assert_eq!(log.matches("Run Timestamp: ").count(), 2);
    assert!(log.contains("Execution Command: run --store"));
    assert!(log.contains("Execution Command: run --load"));
    Ok(())
}

#[test]
fn passthrough_touches_nothing() -> Result<(), ReplayError> {
    let tmp_dir = tempfile::tempdir()?;
    let mut recorder =
        FlowRecorder::new(ReplayMode::Passthrough, tmp_dir.path(), "seq", "run")?;

    assert!(!recorder.store(&FlowRecord::default())?);
    assert_eq!(recorder.load()?, None);
    assert!(!tmp_dir.path().join("seq").exists());

    let mut recorder = FlowRecorder::passthrough();
    assert!(!recorder.store(&FlowRecord::default())?);
    Ok(())
}

#[test]
fn corrupt_record() -> Result<(), ReplayError> {
    let tmp_dir = tempfile::tempdir()?;
    let mut loader = FlowRecorder::new(ReplayMode::Load, tmp_dir.path(), "seq", "run")?;
    fs::write(loader.record_path(), [0xff; 5])?;

    assert!(matches!(loader.load(), Err(ReplayError::Decode(_))));
    assert_eq!(loader.current_id(), 0);
    Ok(())
}

#[test]
fn oversized_record_is_an_error() -> Result<(), ReplayError> {
    let tmp_dir = tempfile::tempdir()?;
    let mut loader = FlowRecorder::new(ReplayMode::Load, tmp_dir.path(), "seq", "run")?;

    let mut bytes = (1u64 << 40).to_le_bytes().to_vec();
    bytes.extend_from_slice(&[0; 32]);
    fs::write(loader.record_path(), bytes)?;

    assert!(matches!(loader.load(), Err(ReplayError::Decode(_))));
    assert_eq!(loader.current_id(), 0);
    Ok(())
}
