use basalt_engine::PassThrough;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use strata_databuf::{Databuf, RingConfig, SlotState};
use strata_events::{
    ACQ_MODE_IMG16, ACQ_MODE_PH, InputBlock, OutputBlock, PKT_DATA_SIZE, PacketHeader, StageBlock,
};
use strata_stage::{CancelToken, StageExit, StageRunner, StatusBoard, Transform};

fn header(acq_mode: u8, pkt_num: u16) -> PacketHeader {
    PacketHeader {
        acq_mode,
        mod_num: 1,
        qua_num: 0,
        pkt_num,
        ..Default::default()
    }
}

#[test]
fn forwards_blocks_and_the_interrupt_flag() {
    let input = Arc::new(Databuf::<InputBlock>::anonymous(RingConfig::new(2)).unwrap());
    let output = Arc::new(Databuf::<OutputBlock>::anonymous(RingConfig::new(2)).unwrap());

    input
        .with_free_block(0, |blk| {
            blk.clear();
            blk.push_packet(header(ACQ_MODE_IMG16, 1), &[5u8; PKT_DATA_SIZE]);
            blk.push_packet(header(ACQ_MODE_PH, 2), &[6u8; PKT_DATA_SIZE]);
        })
        .unwrap();
    input.set_filled(0).unwrap();
    input
        .with_free_block(1, |blk| {
            blk.clear();
            blk.set_interrupted(true);
        })
        .unwrap();
    input.set_filled(1).unwrap();

    let status = StatusBoard::new();
    let runner = StageRunner::new("compute", "COMPUTE", status.clone(), CancelToken::new())
        .with_wait_timeout(Duration::from_millis(10));
    let worker = {
        let (input, output) = (Arc::clone(&input), Arc::clone(&output));
        thread::spawn(move || {
            let mut stage = PassThrough::new();
            let exit = runner.run_transform(&mut stage, &input, &output);
            (exit, stage.stats())
        })
    };
    let (exit, stats) = worker.join().unwrap();
    assert_eq!(exit.unwrap(), StageExit::Interrupted);
    assert_eq!((stats.images, stats.coincidences, stats.dropped), (1, 1, 0));

    assert_eq!(status.get("COMPUTESTAT").as_deref(), Some("stopped"));
    assert_eq!(status.get_parsed::<u64>("COMPUTEMCNT"), Some(2));
    assert_eq!(input.status(0).unwrap(), SlotState::Free);
    assert_eq!(input.status(1).unwrap(), SlotState::Free);

    let first = output
        .with_filled_block(0, |blk| {
            assert!(!blk.interrupted());
            assert_eq!(blk.mcnt(), 0);
            (blk.image_count(), blk.coinc_count())
        })
        .unwrap();
    assert_eq!(first, (1, 1));
    output
        .with_filled_block(1, |blk| {
            assert!(blk.interrupted());
            assert_eq!((blk.image_count(), blk.coinc_count()), (0, 0));
        })
        .unwrap();
}

#[test]
fn a_full_output_block_drops_the_excess() {
    let input = Databuf::<InputBlock>::anonymous(RingConfig::new(1)).unwrap();
    let output = Databuf::<OutputBlock>::anonymous(RingConfig::new(1)).unwrap();
    input
        .with_free_block(0, |blk| {
            blk.clear();
            while blk.push_packet(header(ACQ_MODE_PH, 0), &[1u8; PKT_DATA_SIZE]) {}
        })
        .unwrap();
    input.set_filled(0).unwrap();

    let mut stage = PassThrough::new();
    // fill the coincidence table first so every packet overflows
    output
        .with_free_block(0, |dst| {
            dst.clear();
            while dst.push_coinc(header(ACQ_MODE_PH, 0), &[0u8; PKT_DATA_SIZE]) {}
        })
        .unwrap();
    input
        .with_filled_block(0, |src| {
            output.with_free_block(0, |dst| stage.transform(src, dst).unwrap())
        })
        .unwrap()
        .unwrap();
    let stats = stage.stats();
    assert_eq!(stats.coincidences, 0);
    assert_eq!(stats.dropped as usize, strata_events::IN_PKT_PER_BLOCK);
}
