use granite_engine::{OUTDROP_KEY, OutputError, OutputSettings, OutputStage, RotateRequest};
use granite_meta::{MemoryStore, UPDATED_KEY};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use strata_databuf::{Databuf, RingConfig};
use strata_events::{
    ACQ_MODE_IMG16, ACQ_MODE_PH, ModuleHeader, OutputBlock, PacketHeader, StageBlock,
};
use strata_pff::{DataProduct, FilenameInfo};
use strata_stage::{CancelToken, StageExit, StageRunner, StatusBoard};

fn settings(root: &Path, modules: &str) -> StatusBoard {
    let config = root.join("module.config");
    std::fs::write(&config, modules).unwrap();
    let status = StatusBoard::new();
    OutputSettings {
        save_location: root.join("data"),
        module_config: config,
        max_file_size: 1 << 30,
    }
    .publish(&status);
    status
}

fn session_dir(root: &Path) -> PathBuf {
    let mut dirs: Vec<PathBuf> = std::fs::read_dir(root.join("data"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(dirs.len(), 1);
    dirs.pop().unwrap()
}

fn names(dir: &Path) -> Vec<FilenameInfo> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.unwrap().file_name().into_string().ok())
        .filter_map(|n| n.parse().ok())
        .collect()
}

fn image(module: u16, mode: u8) -> ModuleHeader {
    let mut h = ModuleHeader {
        mod_num: module,
        mode,
        ..Default::default()
    };
    for (q, pkt) in h.pkt_head.iter_mut().enumerate() {
        pkt.acq_mode = ACQ_MODE_IMG16;
        pkt.mod_num = module;
        pkt.qua_num = q as u8;
    }
    h.status = [1; 4];
    h
}

#[test]
fn writes_records_until_the_interrupt_block() {
    let root = tempfile::tempdir().unwrap();
    let status = settings(root.path(), "# dome 0\n1\n");

    let mut store = MemoryStore::new();
    store.set_hash(UPDATED_KEY, [("GPSPRIM", "1")]);
    store.set_hash("GPSPRIM", [("LAT", "37.3")]);

    let stage = OutputStage::new(status.clone(), "LICK", 0, true, store, RotateRequest::new())
        .unwrap();
    assert_eq!(stage.router().modules(), vec![1]);
    assert_eq!(stage.mirror().stats().written, 1);

    let db = Arc::new(Databuf::<OutputBlock>::anonymous(RingConfig::new(2)).unwrap());
    db.with_free_block(0, |blk| {
        blk.clear();
        assert!(blk.push_image(image(14, 16), &[7u8; 2048]));
        assert!(blk.push_image(image(14, 12), &[7u8; 2048]));
        let ph = PacketHeader {
            acq_mode: ACQ_MODE_PH,
            mod_num: 1,
            ..Default::default()
        };
        assert!(blk.push_coinc(ph, &[1u8; 512]));
    })
    .unwrap();
    db.set_filled(0).unwrap();
    db.with_free_block(1, |blk| {
        blk.clear();
        blk.set_interrupted(true);
    })
    .unwrap();
    db.set_filled(1).unwrap();

    let runner = StageRunner::new("output", "OUT", status.clone(), CancelToken::new())
        .with_wait_timeout(Duration::from_millis(10));
    let worker = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            let mut stage = stage;
            let exit = runner.run_sink(&mut stage, &db);
            (exit, stage)
        })
    };
    let (exit, stage) = worker.join().unwrap();
    assert_eq!(exit.unwrap(), StageExit::Interrupted);

    assert_eq!(status.get("OUTSTAT").as_deref(), Some("stopped"));
    assert_eq!(status.get_parsed::<u64>(OUTDROP_KEY), Some(1));
    assert_eq!(status.get_parsed::<u64>("OUTMCNT"), Some(2));
    let stats = stage.router().stats();
    // three metadata polls plus one image and one coincidence record
    assert_eq!((stats.records_written, stats.records_dropped), (5, 1));
    // every file set was closed on the way out
    assert!(stage.router().modules().is_empty());

    let dir = session_dir(root.path());
    let files = names(&dir);
    assert!(files.iter().any(|f| f.module == 14 && f.data_product == DataProduct::Bit16Img));
    let ph = files
        .iter()
        .find(|f| f.module == 1 && f.data_product == DataProduct::PhImg)
        .unwrap();
    assert_eq!(
        std::fs::metadata(dir.join(ph.to_string())).unwrap().len() as usize,
        granite_store::coinc_header_text(&PacketHeader {
            acq_mode: ACQ_MODE_PH,
            mod_num: 1,
            ..Default::default()
        })
        .len()
            + 2
            + 513
    );
}

#[test]
fn rotate_request_is_served_before_the_next_block() {
    let root = tempfile::tempdir().unwrap();
    let status = settings(root.path(), "2\n3\n");
    let rotate = RotateRequest::new();
    let stage = OutputStage::new(
        status.clone(),
        "LICK",
        0,
        true,
        MemoryStore::new(),
        rotate.clone(),
    )
    .unwrap();

    let db = Arc::new(Databuf::<OutputBlock>::anonymous(RingConfig::new(1)).unwrap());
    rotate.request();
    db.with_free_block(0, |blk| {
        blk.clear();
        blk.set_interrupted(true);
    })
    .unwrap();
    db.set_filled(0).unwrap();

    let runner = StageRunner::new("output", "OUT", status, CancelToken::new())
        .with_wait_timeout(Duration::from_millis(10));
    let mut stage = stage;
    assert_eq!(runner.run_sink(&mut stage, &db).unwrap(), StageExit::Interrupted);
    assert!(!rotate.take());

    let files = names(&session_dir(root.path()));
    for module in [2, 3] {
        for dp in DataProduct::PER_MODULE {
            let mut seqnos: Vec<u32> = files
                .iter()
                .filter(|f| f.module == module && f.data_product == dp)
                .map(|f| f.seqno)
                .collect();
            seqnos.sort_unstable();
            assert_eq!(seqnos, vec![0, 1]);
        }
    }
}

#[test]
fn rotate_request_is_served_while_idle() {
    let root = tempfile::tempdir().unwrap();
    let status = settings(root.path(), "2\n");
    let rotate = RotateRequest::new();
    let stage = OutputStage::new(
        status.clone(),
        "LICK",
        0,
        true,
        MemoryStore::new(),
        rotate.clone(),
    )
    .unwrap();

    let db = Arc::new(Databuf::<OutputBlock>::anonymous(RingConfig::new(2)).unwrap());
    let cancel = CancelToken::new();
    let runner = StageRunner::new("output", "OUT", status, cancel.clone())
        .with_wait_timeout(Duration::from_millis(5));
    let worker = {
        let db = Arc::clone(&db);
        thread::spawn(move || {
            let mut stage = stage;
            runner.run_sink(&mut stage, &db)
        })
    };

    // let the stage settle into waiting on an empty ring first
    thread::sleep(Duration::from_millis(50));
    rotate.request();

    let dir = session_dir(root.path());
    let mut rotated = false;
    for _ in 0..1_000 {
        if names(&dir).iter().any(|f| f.module == 2 && f.seqno == 1) {
            rotated = true;
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cancel.cancel();
    assert_eq!(worker.join().unwrap().unwrap(), StageExit::Cancelled);
    assert!(rotated);
    assert_eq!(db.total_status().unwrap(), 0);
}

#[test]
fn missing_module_config_is_fatal_at_startup() {
    let root = tempfile::tempdir().unwrap();
    let status = StatusBoard::new();
    OutputSettings {
        save_location: root.path().join("data"),
        module_config: root.path().join("absent.config"),
        max_file_size: 1 << 20,
    }
    .publish(&status);

    let err = OutputStage::new(status, "LICK", 0, true, MemoryStore::new(), RotateRequest::new())
        .err()
        .unwrap();
    assert!(matches!(err, OutputError::Config(_)));

    let err = OutputStage::new(
        StatusBoard::new(),
        "LICK",
        0,
        true,
        MemoryStore::new(),
        RotateRequest::new(),
    )
    .err()
    .unwrap();
    assert!(matches!(err, OutputError::MissingSettings));
}
