use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use pupil_relay::detect::{SharedBackend, StubBackend, ThresholdBackend};
use pupil_relay::display::{display_queue, NullSink};
use pupil_relay::ingest::{StereoSource, SyntheticConfig};
use pupil_relay::pipeline::StepOutcome;
use pupil_relay::protocol::decode_result_message;
use pupil_relay::transport::{memory, MessageSource};
use pupil_relay::{
    Eye, FrameReceiver, FrameSender, LatestPairSlot, ProcessingPipeline, RelayOptions,
    RelayServer, ResultSender, SendOutcome, SequenceEvent, SyntheticStereoSource,
};

fn synthetic() -> SyntheticStereoSource {
    SyntheticStereoSource::new(SyntheticConfig {
        width: 320,
        height: 240,
        pupil_radius: 20,
        ..SyntheticConfig::default()
    })
}

fn shared_threshold() -> SharedBackend {
    Arc::new(Mutex::new(ThresholdBackend::default()))
}

fn drain_result_ids(source: &mut memory::MemorySource) -> Vec<u64> {
    let mut ids = Vec::new();
    while source.poll_readable(Duration::ZERO).unwrap() {
        let message = decode_result_message(&source.recv().unwrap()).unwrap();
        ids.push(message.sequence_id);
    }
    ids
}

#[test]
fn missing_id_is_one_gap_and_every_other_pair_is_processed() {
    let (frame_sink, frame_source) = memory::channel(16);
    let (result_sink, mut result_source) = memory::channel(16);
    let slot = Arc::new(LatestPairSlot::new());

    let mut camera = synthetic();
    let mut sender = FrameSender::new(frame_sink, 90);
    let mut receiver = FrameReceiver::new(frame_source, slot.clone());
    let mut pipeline =
        ProcessingPipeline::new(shared_threshold(), slot.clone(), ResultSender::new(result_sink));

    let mut gaps = Vec::new();
    for id in (0..10).filter(|id| *id != 4) {
        let pair = camera.next_pair().unwrap();
        assert_eq!(
            sender.send(&pair[Eye::Left], &pair[Eye::Right], id),
            SendOutcome::Sent
        );
        match receiver.poll_once(Duration::from_millis(100)).unwrap() {
            Some(event @ SequenceEvent::Gap { .. }) => gaps.push(event),
            Some(_) => {}
            None => panic!("pair {} was not received", id),
        }
        assert_eq!(pipeline.step().unwrap(), StepOutcome::Processed(id));
    }

    assert_eq!(
        gaps,
        vec![SequenceEvent::Gap {
            expected: 4,
            actual: 5
        }]
    );
    assert_eq!(receiver.stats().unwrap().gaps, 1);
    assert_eq!(pipeline.stats().unwrap().processed, 9);
    assert_eq!(pipeline.stats().unwrap().left_detections, 9);
    assert_eq!(drain_result_ids(&mut result_source), vec![0, 1, 2, 3, 5, 6, 7, 8, 9]);
}

#[test]
fn slot_holds_the_last_of_n_pairs() {
    let (frame_sink, frame_source) = memory::channel(16);
    let slot = Arc::new(LatestPairSlot::new());
    let mut camera = synthetic();
    let mut sender = FrameSender::new(frame_sink, 90);
    let mut receiver = FrameReceiver::new(frame_source, slot.clone());

    for id in 0..6 {
        let pair = camera.next_pair().unwrap();
        sender.send(&pair[Eye::Left], &pair[Eye::Right], id);
    }
    while receiver.poll_once(Duration::ZERO).unwrap().is_some() {}

    let (_, latest) = slot.snapshot().unwrap().unwrap();
    assert_eq!(latest.sequence_id, 5);
    assert!(latest.is_complete());
    assert_eq!(receiver.stats().unwrap().received, 6);
}

#[test]
fn restarted_sender_is_a_restart_not_a_gap() {
    let (frame_sink, frame_source) = memory::channel(16);
    let (result_sink, mut result_source) = memory::channel(16);
    let slot = Arc::new(LatestPairSlot::new());

    let mut camera = synthetic();
    let mut first_run = FrameSender::new(frame_sink.clone(), 90).with_session(1);
    let mut receiver = FrameReceiver::new(frame_source, slot.clone());
    let mut pipeline =
        ProcessingPipeline::new(shared_threshold(), slot.clone(), ResultSender::new(result_sink));

    let mut events = Vec::new();
    let mut run = |sender: &mut FrameSender<memory::MemorySink>, id: u64| {
        let pair = camera.next_pair().unwrap();
        assert_eq!(
            sender.send(&pair[Eye::Left], &pair[Eye::Right], id),
            SendOutcome::Sent
        );
        events.push(receiver.poll_once(Duration::from_millis(100)).unwrap());
        assert_eq!(pipeline.step().unwrap(), StepOutcome::Processed(id));
    };

    run(&mut first_run, 100);
    run(&mut first_run, 101);
    drop(first_run);
    // The capture client comes back with a fresh session and counts from zero.
    let mut second_run = FrameSender::new(frame_sink, 90).with_session(2);
    run(&mut second_run, 0);
    run(&mut second_run, 1);

    assert_eq!(
        events,
        vec![
            Some(SequenceEvent::First),
            Some(SequenceEvent::InOrder),
            Some(SequenceEvent::Restart {
                previous: 101,
                session: 2
            }),
            Some(SequenceEvent::InOrder),
        ]
    );
    let stats = receiver.stats().unwrap();
    assert_eq!((stats.restarts, stats.gaps), (1, 0));
    assert_eq!(drain_result_ids(&mut result_source), vec![100, 101, 0, 1]);
}

#[test]
fn backpressure_drops_frames_and_receiver_reports_the_gap() {
    let (frame_sink, frame_source) = memory::channel(2);
    let slot = Arc::new(LatestPairSlot::new());
    let mut camera = synthetic();
    let mut sender = FrameSender::new(frame_sink, 90);
    let mut receiver = FrameReceiver::new(frame_source, slot);

    let outcomes: Vec<SendOutcome> = (0..4)
        .map(|id| {
            let pair = camera.next_pair().unwrap();
            sender.send(&pair[Eye::Left], &pair[Eye::Right], id)
        })
        .collect();
    assert_eq!(
        outcomes,
        vec![
            SendOutcome::Sent,
            SendOutcome::Sent,
            SendOutcome::NotReady,
            SendOutcome::NotReady
        ]
    );

    while receiver.poll_once(Duration::ZERO).unwrap().is_some() {}
    let pair = camera.next_pair().unwrap();
    sender.send(&pair[Eye::Left], &pair[Eye::Right], 4);
    assert_eq!(
        receiver.poll_once(Duration::ZERO).unwrap(),
        Some(SequenceEvent::Gap {
            expected: 2,
            actual: 4
        })
    );
}

#[test]
fn display_queue_never_exceeds_capacity() {
    let (frame_sink, frame_source) = memory::channel(16);
    let (result_sink, _result_source) = memory::channel(16);
    let slot = Arc::new(LatestPairSlot::new());
    let (queue, rx) = display_queue(3);

    let mut camera = synthetic();
    let mut sender = FrameSender::new(frame_sink, 90);
    let mut receiver = FrameReceiver::new(frame_source, slot.clone());
    let mut pipeline = ProcessingPipeline::new(
        Arc::new(Mutex::new(StubBackend::new())),
        slot,
        ResultSender::new(result_sink),
    )
    .with_display(queue.clone());

    for id in 0..8 {
        let pair = camera.next_pair().unwrap();
        sender.send(&pair[Eye::Left], &pair[Eye::Right], id);
        receiver.poll_once(Duration::from_millis(100)).unwrap();
        pipeline.step().unwrap();
        assert!(queue.len() <= 3);
    }
    assert_eq!(queue.len(), 3);
    assert_eq!(rx.len(), 3);
    assert_eq!(pipeline.stats().unwrap().display_drops, 5);
}

#[test]
fn threaded_relay_delivers_latest_result_and_stops() {
    let (frame_sink, frame_source) = memory::channel(16);
    let (result_sink, mut result_source) = memory::channel(16);

    // The sender stays alive until the relay stops; a dropped sink is a transport error.
    let mut camera = synthetic();
    let mut sender = FrameSender::new(frame_sink, 90);
    for id in (0..10).filter(|id| *id != 4) {
        let pair = camera.next_pair().unwrap();
        assert_eq!(
            sender.send(&pair[Eye::Left], &pair[Eye::Right], id),
            SendOutcome::Sent
        );
    }

    let options = RelayOptions {
        receive_poll: Duration::from_millis(10),
        join_timeout: Duration::from_secs(2),
        ..RelayOptions::default()
    };
    let handle = RelayServer::new(
        frame_source,
        result_sink,
        shared_threshold(),
        Box::new(NullSink::new()),
        options,
    )
    .spawn()
    .unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut ids = Vec::new();
    while !ids.contains(&9) && Instant::now() < deadline {
        if result_source
            .poll_readable(Duration::from_millis(50))
            .unwrap()
        {
            let message = decode_result_message(&result_source.recv().unwrap()).unwrap();
            assert!(message.eyes[Eye::Left].is_some());
            ids.push(message.sequence_id);
        }
    }
    assert!(ids.contains(&9), "result for the last pair never arrived: {:?}", ids);
    assert!(ids.windows(2).all(|w| w[0] < w[1]));

    let mut stats = handle.stats().unwrap();
    while stats.receiver.received < 9 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
        stats = handle.stats().unwrap();
    }
    assert_eq!(stats.receiver.received, 9);
    assert_eq!(stats.receiver.gaps, 1);
    assert!(handle.receiver_alive());
    let (_, latest) = handle.slot().snapshot().unwrap().unwrap();
    assert_eq!(latest.sequence_id, 9);

    let abandoned = handle.stop().unwrap();
    assert!(abandoned.is_empty());
    assert_eq!(sender.stats().sent, 9);
}
