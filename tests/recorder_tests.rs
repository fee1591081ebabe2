// Recorder state machine and pipeline tests, driven on paused tokio time
// with scripted capture sources and a scripted speech service.

mod support;

use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use support::{frame, MockSpeech, Reply, ScriptedCapture};
use voiceprompt::{
    Recorder, RecordingMode, SessionConfig, SessionError, SessionEvent, SessionStatus, SpeechError,
};

fn streaming_recorder(speech: Arc<MockSpeech>) -> Recorder {
    Recorder::new(
        SessionConfig {
            default_mode: RecordingMode::Streaming,
            chunk_interval: Duration::from_millis(3000),
        },
        speech,
    )
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn streaming_two_chunks_accumulate_and_refine_once() -> anyhow::Result<()> {
    let speech = MockSpeech::new(vec![Reply::Text("hello "), Reply::Text("world")]);
    let recorder = streaming_recorder(Arc::clone(&speech));
    let mut events = recorder.subscribe();

    let source = ScriptedCapture::new(vec![(500, frame(500, 1600)), (3500, frame(3500, 1600))]);
    recorder.start(RecordingMode::Streaming, Box::new(source)).await?;

    // Chunk ticks at 3s and 6s; stop at 6.5s.
    tokio::time::sleep(Duration::from_millis(6500)).await;
    let stats = recorder.stop().await?;

    assert_eq!(recorder.transcript().await, "hello world");
    assert_eq!(speech.refine_calls.load(Ordering::SeqCst), 1);
    assert_eq!(speech.refined_inputs.lock().await.as_slice(), ["hello world"]);
    assert_eq!(
        recorder.refined_output().await.as_deref(),
        Some("prompt: hello world")
    );
    assert_eq!(stats.chunks_dispatched, 2);
    assert_eq!(stats.elapsed_secs, 6);
    assert_eq!(recorder.status().await, SessionStatus::Stopped);

    let events = drain(&mut events);
    assert!(matches!(events[0], SessionEvent::Started { .. }));
    assert!(matches!(events[1], SessionEvent::ChunkReady { sequence: 0, .. }));
    assert!(matches!(events[2], SessionEvent::ChunkReady { sequence: 1, .. }));
    assert!(matches!(events[3], SessionEvent::Stopped { .. }));
    assert!(matches!(events[4], SessionEvent::Finalized { .. }));
    assert_eq!(events.len(), 5);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_before_first_tick_skips_finalization() -> anyhow::Result<()> {
    let speech = MockSpeech::new(vec![]);
    let recorder = streaming_recorder(Arc::clone(&speech));
    let mut events = recorder.subscribe();

    let source = ScriptedCapture::new(vec![(100, frame(100, 1600))]);
    recorder.start(RecordingMode::Streaming, Box::new(source)).await?;

    tokio::time::sleep(Duration::from_millis(1000)).await;
    let stats = recorder.stop().await?;

    assert_eq!(recorder.transcript().await, "");
    assert_eq!(recorder.refined_output().await, None);
    assert_eq!(speech.transcribe_calls.load(Ordering::SeqCst), 0);
    assert_eq!(speech.refine_calls.load(Ordering::SeqCst), 0);
    assert_eq!(stats.chunks_dispatched, 0);

    let events = drain(&mut events);
    assert!(!events
        .iter()
        .any(|event| matches!(event, SessionEvent::Finalized { .. })));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_chunk_contributes_nothing_and_does_not_halt_the_session() -> anyhow::Result<()> {
    let speech = MockSpeech::new(vec![Reply::Fail, Reply::Text("world")]);
    let recorder = streaming_recorder(Arc::clone(&speech));

    let source = ScriptedCapture::new(vec![(500, frame(500, 1600)), (3500, frame(3500, 1600))]);
    recorder.start(RecordingMode::Streaming, Box::new(source)).await?;

    tokio::time::sleep(Duration::from_millis(6500)).await;
    let stats = recorder.stop().await?;

    // Both chunks were dispatched; only the second contributed text.
    assert_eq!(stats.chunks_dispatched, 2);
    assert_eq!(speech.transcribe_calls.load(Ordering::SeqCst), 2);
    assert_eq!(recorder.transcript().await, "world");
    assert_eq!(speech.refined_inputs.lock().await.as_slice(), ["world"]);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn out_of_order_completions_append_in_arrival_order() -> anyhow::Result<()> {
    // Chunk #0's call outlives chunk #1's: dispatched at 3s, completes at
    // 7s, while chunk #1 (dispatched at 6s) completes immediately.
    let speech = MockSpeech::new(vec![Reply::TextAfter("hello", 4000), Reply::Text("world")]);
    let recorder = streaming_recorder(Arc::clone(&speech));

    let source = ScriptedCapture::new(vec![(500, frame(500, 1600)), (3500, frame(3500, 1600))]);
    recorder.start(RecordingMode::Streaming, Box::new(source)).await?;

    tokio::time::sleep(Duration::from_millis(8000)).await;
    recorder.stop().await?;

    assert_eq!(recorder.transcript().await, "world hello");
    assert_eq!(speech.refined_inputs.lock().await.as_slice(), ["world hello"]);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn transcriptions_completing_after_stop_are_dropped() -> anyhow::Result<()> {
    let speech = MockSpeech::new(vec![Reply::TextAfter("late", 5000)]);
    let recorder = streaming_recorder(Arc::clone(&speech));
    let mut events = recorder.subscribe();

    let source = ScriptedCapture::new(vec![(500, frame(500, 1600))]);
    recorder.start(RecordingMode::Streaming, Box::new(source)).await?;

    // Chunk #0 is dispatched at 3s and still in flight at stop time.
    tokio::time::sleep(Duration::from_millis(3500)).await;
    recorder.stop().await?;

    assert_eq!(recorder.transcript().await, "");
    assert_eq!(speech.refine_calls.load(Ordering::SeqCst), 0);

    // Let the in-flight call finish; its result must have no effect.
    tokio::time::sleep(Duration::from_millis(6000)).await;
    assert_eq!(recorder.transcript().await, "");
    assert_eq!(recorder.refined_output().await, None);

    let events = drain(&mut events);
    assert!(!events
        .iter()
        .any(|event| matches!(event, SessionEvent::Finalized { .. })));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn start_while_recording_is_rejected_without_touching_the_source() -> anyhow::Result<()> {
    let speech = MockSpeech::new(vec![]);
    let recorder = streaming_recorder(speech);

    let first = ScriptedCapture::new(vec![(100, frame(100, 1600))]);
    recorder.start(RecordingMode::Streaming, Box::new(first)).await?;

    let second = ScriptedCapture::new(vec![]);
    let second_started = second.started_flag();
    let result = recorder
        .start(RecordingMode::Streaming, Box::new(second))
        .await;

    assert!(matches!(result, Err(SessionError::InvalidState)));
    assert!(!second_started.load(Ordering::SeqCst));
    assert_eq!(recorder.status().await, SessionStatus::Recording);

    recorder.stop().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_is_idempotent() -> anyhow::Result<()> {
    let speech = MockSpeech::new(vec![Reply::Text("hello")]);
    let recorder = streaming_recorder(Arc::clone(&speech));
    let mut events = recorder.subscribe();

    let source = ScriptedCapture::new(vec![(500, frame(500, 1600))]);
    recorder.start(RecordingMode::Streaming, Box::new(source)).await?;

    tokio::time::sleep(Duration::from_millis(3500)).await;
    recorder.stop().await?;
    let stats = recorder.stop().await?;

    assert_eq!(stats.status, SessionStatus::Stopped);
    assert_eq!(speech.refine_calls.load(Ordering::SeqCst), 1);

    let events = drain(&mut events);
    let finalized = events
        .iter()
        .filter(|event| matches!(event, SessionEvent::Finalized { .. }))
        .count();
    let stopped = events
        .iter()
        .filter(|event| matches!(event, SessionEvent::Stopped { .. }))
        .count();
    assert_eq!(finalized, 1);
    assert_eq!(stopped, 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_while_idle_is_a_no_op() -> anyhow::Result<()> {
    let speech = MockSpeech::new(vec![]);
    let recorder = streaming_recorder(Arc::clone(&speech));

    let stats = recorder.stop().await?;

    assert_eq!(stats.status, SessionStatus::Idle);
    assert_eq!(speech.refine_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn single_shot_transcribes_the_whole_recording_once() -> anyhow::Result<()> {
    let speech = MockSpeech::new(vec![Reply::Text("test recording")]);
    let recorder = streaming_recorder(Arc::clone(&speech));
    let mut events = recorder.subscribe();

    let source = ScriptedCapture::new(vec![(100, frame(100, 1600)), (1100, frame(1100, 1600))]);
    recorder
        .start(RecordingMode::SingleShot, Box::new(source))
        .await?;

    tokio::time::sleep(Duration::from_millis(5000)).await;
    let stats = recorder.stop().await?;

    // One call, carrying the full recording including data captured after
    // any would-be chunk boundary.
    assert_eq!(speech.transcribe_calls.load(Ordering::SeqCst), 1);
    let transcribed = speech.transcribed.lock().await;
    assert_eq!(transcribed[0].0, "recording.wav");
    let reader = hound::WavReader::new(Cursor::new(transcribed[0].1.clone()))?;
    assert_eq!(reader.spec().sample_rate, 16000);
    assert_eq!(reader.into_samples::<i16>().count(), 3200);

    assert_eq!(recorder.transcript().await, "test recording");
    assert_eq!(
        recorder.refined_output().await.as_deref(),
        Some("prompt: test recording")
    );
    assert_eq!(speech.refined_inputs.lock().await.as_slice(), ["test recording"]);
    assert_eq!(stats.chunks_dispatched, 0);

    let events = drain(&mut events);
    assert!(events
        .iter()
        .any(|event| matches!(event, SessionEvent::Finalized { .. })));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn single_shot_empty_recording_skips_upstream_calls() -> anyhow::Result<()> {
    let speech = MockSpeech::new(vec![]);
    let recorder = streaming_recorder(Arc::clone(&speech));

    let source = ScriptedCapture::new(vec![]);
    recorder
        .start(RecordingMode::SingleShot, Box::new(source))
        .await?;

    tokio::time::sleep(Duration::from_millis(500)).await;
    recorder.stop().await?;

    assert_eq!(speech.transcribe_calls.load(Ordering::SeqCst), 0);
    assert_eq!(speech.refine_calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn refinement_failure_preserves_the_transcript() -> anyhow::Result<()> {
    let speech = MockSpeech::with_failing_refine(vec![Reply::Text("hello")]);
    let recorder = streaming_recorder(Arc::clone(&speech));

    let source = ScriptedCapture::new(vec![(500, frame(500, 1600))]);
    recorder.start(RecordingMode::Streaming, Box::new(source)).await?;

    tokio::time::sleep(Duration::from_millis(3500)).await;
    let result = recorder.stop().await;

    assert!(matches!(
        result,
        Err(SessionError::Speech(SpeechError::RefinementFailed(_)))
    ));
    assert_eq!(recorder.transcript().await, "hello");
    assert_eq!(recorder.refined_output().await, None);
    assert_eq!(recorder.status().await, SessionStatus::Stopped);

    // No retry: a second stop is a no-op.
    let stats = recorder.stop().await?;
    assert_eq!(stats.status, SessionStatus::Stopped);
    assert_eq!(speech.refine_calls.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn restart_resets_session_state() -> anyhow::Result<()> {
    let speech = MockSpeech::new(vec![Reply::Text("first")]);
    let recorder = streaming_recorder(Arc::clone(&speech));

    let source = ScriptedCapture::new(vec![(500, frame(500, 1600))]);
    let first_id = recorder
        .start(RecordingMode::Streaming, Box::new(source))
        .await?;
    tokio::time::sleep(Duration::from_millis(3500)).await;
    recorder.stop().await?;
    assert_eq!(recorder.transcript().await, "first");

    let source = ScriptedCapture::new(vec![]);
    let second_id = recorder
        .start(RecordingMode::Streaming, Box::new(source))
        .await?;

    assert_ne!(first_id, second_id);
    assert_eq!(recorder.transcript().await, "");
    assert_eq!(recorder.refined_output().await, None);
    assert_eq!(recorder.status().await, SessionStatus::Recording);

    recorder.stop().await?;
    Ok(())
}
