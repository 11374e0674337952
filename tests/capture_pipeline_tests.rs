// Pipeline segmentation tests driven through a scripted backend: fixed
// chunk boundaries, final flush on stop, sound tagging, and the
// pause/resume gate.

use scribe_capture::{
    AudioFrame, CaptureEvent, CapturePipeline, PipelineConfig, PipelineState, ScriptedBackend,
};
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::mpsc;

const SAMPLE_RATE: u32 = 16_000;

fn frame(samples: Vec<i16>) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate: SAMPLE_RATE,
        channels: 1,
        timestamp_ms: 0,
    }
}

fn loud(len: usize) -> Vec<i16> {
    let mut samples = vec![0i16; len];
    for (i, s) in samples.iter_mut().enumerate() {
        if i % 100 == 0 {
            *s = 2_000;
        }
    }
    samples
}

fn one_second_config() -> PipelineConfig {
    PipelineConfig {
        chunk_duration: Duration::from_secs(1),
        sound_threshold: 500,
    }
}

fn decoded_len(wav: &[u8]) -> usize {
    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    reader.into_samples::<i16>().count()
}

async fn next_event(rx: &mut mpsc::Receiver<CaptureEvent>) -> CaptureEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for pipeline event")
        .expect("pipeline event channel closed")
}

#[tokio::test]
async fn chunks_split_on_audio_time_and_remainder_flushes_on_stop() {
    let (tx, backend) = ScriptedBackend::channel(16);
    let (mut pipeline, mut events) = CapturePipeline::start(Box::new(backend), one_second_config())
        .await
        .unwrap();

    // 1.5 seconds of audio: one full chunk plus a half-chunk remainder.
    tx.send(frame(loud(SAMPLE_RATE as usize))).await.unwrap();
    tx.send(frame(loud(SAMPLE_RATE as usize / 2))).await.unwrap();
    pipeline.stop().await;

    match next_event(&mut events).await {
        CaptureEvent::Chunk { wav, .. } => assert_eq!(decoded_len(&wav), SAMPLE_RATE as usize),
        other => panic!("expected full chunk, got {:?}", other),
    }
    match next_event(&mut events).await {
        CaptureEvent::Chunk { wav, .. } => assert_eq!(decoded_len(&wav), SAMPLE_RATE as usize / 2),
        other => panic!("expected flushed remainder, got {:?}", other),
    }
    assert!(matches!(next_event(&mut events).await, CaptureEvent::Stopped));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}

#[tokio::test]
async fn oversized_frame_yields_multiple_chunks_in_order() {
    let (tx, backend) = ScriptedBackend::channel(4);
    let (mut pipeline, mut events) = CapturePipeline::start(Box::new(backend), one_second_config())
        .await
        .unwrap();

    // One frame carrying three chunks' worth of samples.
    tx.send(frame(loud(SAMPLE_RATE as usize * 3))).await.unwrap();
    pipeline.stop().await;

    for _ in 0..3 {
        match next_event(&mut events).await {
            CaptureEvent::Chunk { wav, .. } => {
                assert_eq!(decoded_len(&wav), SAMPLE_RATE as usize)
            }
            other => panic!("expected chunk, got {:?}", other),
        }
    }
    assert!(matches!(next_event(&mut events).await, CaptureEvent::Stopped));
}

#[tokio::test]
async fn chunks_are_tagged_with_sound_presence() {
    let (tx, backend) = ScriptedBackend::channel(4);
    let (mut pipeline, mut events) = CapturePipeline::start(Box::new(backend), one_second_config())
        .await
        .unwrap();

    tx.send(frame(loud(SAMPLE_RATE as usize))).await.unwrap();
    tx.send(frame(vec![0i16; SAMPLE_RATE as usize])).await.unwrap();
    pipeline.stop().await;

    match next_event(&mut events).await {
        CaptureEvent::Chunk { sound_detected, .. } => assert!(sound_detected),
        other => panic!("expected chunk, got {:?}", other),
    }
    match next_event(&mut events).await {
        CaptureEvent::Chunk { sound_detected, .. } => assert!(!sound_detected),
        other => panic!("expected chunk, got {:?}", other),
    }
}

#[tokio::test]
async fn paused_audio_is_discarded_not_buffered() {
    let (tx, backend) = ScriptedBackend::channel(4);
    let (mut pipeline, mut events) = CapturePipeline::start(Box::new(backend), one_second_config())
        .await
        .unwrap();

    pipeline.pause();
    assert_eq!(pipeline.state(), PipelineState::Paused);

    // A full chunk's worth arrives while paused and must vanish.
    tx.send(frame(loud(SAMPLE_RATE as usize))).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(events.try_recv().is_err());

    pipeline.resume();
    assert_eq!(pipeline.state(), PipelineState::Capturing);
    tx.send(frame(loud(SAMPLE_RATE as usize))).await.unwrap();

    match next_event(&mut events).await {
        CaptureEvent::Chunk { wav, .. } => assert_eq!(decoded_len(&wav), SAMPLE_RATE as usize),
        other => panic!("expected post-resume chunk, got {:?}", other),
    }

    pipeline.stop().await;
    // Nothing buffered from the paused window, so stop flushes nothing.
    assert!(matches!(next_event(&mut events).await, CaptureEvent::Stopped));
}

#[tokio::test]
async fn backend_stream_ending_flushes_and_stops() {
    let (tx, backend) = ScriptedBackend::channel(4);
    let (pipeline, mut events) = CapturePipeline::start(Box::new(backend), one_second_config())
        .await
        .unwrap();

    tx.send(frame(loud(SAMPLE_RATE as usize / 4))).await.unwrap();
    drop(tx); // device ran dry

    match next_event(&mut events).await {
        CaptureEvent::Chunk { wav, .. } => assert_eq!(decoded_len(&wav), SAMPLE_RATE as usize / 4),
        other => panic!("expected flushed chunk, got {:?}", other),
    }
    assert!(matches!(next_event(&mut events).await, CaptureEvent::Stopped));
    assert_eq!(pipeline.state(), PipelineState::Stopped);
}
