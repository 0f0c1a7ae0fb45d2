//! Audio capture controller lifecycle tests.

use parlor_core::{
    AudioBlob, AudioCaptureController, CaptureConstraints, CaptureError, ChatApi,
    ClientContext, CommandCaptureBackend, ConnectivityMonitor, Conversation, ConversationTimings,
    SendOutcome, SharedMessageStore, StatusCell,
};
use parlor_protocol::{AudioReply, ChatEvent, EventSink, MessageKind};
use parlor_test_utils::{ApiCall, RecordingSink, Scripted, ScriptedApi, ScriptedCapture};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

fn controller(capture: &ScriptedCapture, sink: &RecordingSink) -> AudioCaptureController {
    AudioCaptureController::new(
        Arc::new(capture.clone()),
        CaptureConstraints::default(),
        Arc::new(sink.clone()),
    )
}

/// Recording ticks once per second and yields every fragment on stop.
#[tokio::test(start_paused = true)]
async fn record_three_seconds_and_finalize() {
    let capture = ScriptedCapture::new(vec![vec![1, 2], vec![3]]).with_trailing(vec![vec![4, 5]]);
    let sink = RecordingSink::new();
    let mut recorder = controller(&capture, &sink);

    recorder.start().await.expect("start");
    assert!(recorder.is_recording());
    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert_eq!(recorder.elapsed_seconds(), 3);

    let pending = recorder.request_stop().expect("was recording");
    assert!(!recorder.is_recording());
    let blob = pending.finish().await.expect("capture").expect("blob");

    assert_eq!(blob, AudioBlob::new(vec![1, 2, 3, 4, 5], "audio/webm"));
    assert!(capture.released());
    assert_eq!(
        sink.events(),
        vec![
            ChatEvent::RecordingTick { elapsed_secs: 1 },
            ChatEvent::RecordingTick { elapsed_secs: 2 },
            ChatEvent::RecordingTick { elapsed_secs: 3 },
            ChatEvent::RecordingStopped,
        ]
    );
    assert_eq!(capture.last_constraints(), Some(CaptureConstraints::default()));
}

/// The ticker stops with the recording.
#[tokio::test(start_paused = true)]
async fn ticker_stops_after_stop() {
    let capture = ScriptedCapture::new(vec![vec![9]]);
    let sink = RecordingSink::new();
    let mut recorder = controller(&capture, &sink);

    recorder.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let pending = recorder.request_stop().expect("was recording");
    pending.finish().await.expect("capture").expect("blob");
    tokio::time::sleep(Duration::from_secs(5)).await;

    let ticks = sink.count(|event| matches!(event, ChatEvent::RecordingTick { .. }));
    assert_eq!(ticks, 1);
}

/// A capture with no fragments produces nothing to send.
#[tokio::test]
async fn empty_recording_resolves_to_none() {
    let capture = ScriptedCapture::new(Vec::new());
    let sink = RecordingSink::new();
    let mut recorder = controller(&capture, &sink);

    recorder.start().await.expect("start");
    let pending = recorder.request_stop().expect("was recording");
    assert!(pending.finish().await.expect("capture").is_none());
}

/// Starting without a capture device fails without opening anything.
#[tokio::test]
async fn unsupported_platform_cannot_record() {
    let capture = ScriptedCapture::unsupported();
    let sink = RecordingSink::new();
    let mut recorder = controller(&capture, &sink);

    assert!(!recorder.is_supported());
    let err = recorder.start().await.unwrap_err();
    assert!(matches!(err, CaptureError::Unsupported(_)), "got {err:?}");
    assert_eq!(capture.open_count(), 0);
    assert!(!recorder.is_recording());
}

/// Permission failures leave the controller idle and ready to retry.
#[tokio::test]
async fn denied_device_stays_idle() {
    let capture = ScriptedCapture::denied("permission denied");
    let sink = RecordingSink::new();
    let mut recorder = controller(&capture, &sink);

    let err = recorder.start().await.unwrap_err();
    assert!(matches!(err, CaptureError::Device(_)), "got {err:?}");
    assert!(!recorder.is_recording());
    assert!(recorder.request_stop().is_none());
    assert!(sink.events().is_empty());
}

/// A device that fails mid-capture leaves the controller idle and says why.
#[tokio::test(start_paused = true)]
async fn stream_failure_before_stop_reports_device_error() {
    let capture = ScriptedCapture::failing("device unplugged");
    let sink = RecordingSink::new();
    let mut recorder = controller(&capture, &sink);

    recorder.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    assert!(!recorder.is_recording());
    assert_eq!(
        sink.events(),
        vec![ChatEvent::RecordingFailed(
            "capture device error: device unplugged".to_string()
        )]
    );
    assert!(capture.released());
    assert!(recorder.request_stop().is_none());

    recorder.start().await.expect("restart after failure");
    assert_eq!(capture.open_count(), 2);
}

/// A stop that races the failure still surfaces the device error.
#[tokio::test]
async fn stop_after_failure_yields_error() {
    let capture = ScriptedCapture::failing("device unplugged");
    let sink = RecordingSink::new();
    let mut recorder = controller(&capture, &sink);

    recorder.start().await.expect("start");
    let pending = recorder.request_stop().expect("was recording");
    match pending.finish().await {
        Err(CaptureError::Device(reason)) => assert_eq!(reason, "device unplugged"),
        Ok(None) => {
            // The stop won the race; the stream then ended cleanly.
        }
        other => panic!("unexpected result {other:?}"),
    }
}

/// Only one capture can run at a time.
#[tokio::test]
async fn second_start_is_rejected() {
    let capture = ScriptedCapture::new(vec![vec![1]]);
    let sink = RecordingSink::new();
    let mut recorder = controller(&capture, &sink);

    recorder.start().await.expect("start");
    let err = recorder.start().await.unwrap_err();
    assert!(matches!(err, CaptureError::AlreadyRecording), "got {err:?}");
    assert_eq!(capture.open_count(), 1);
}

/// Dropping the controller mid-recording releases the device.
#[tokio::test]
async fn teardown_releases_device() {
    let capture = ScriptedCapture::new(vec![vec![1]]);
    let sink = RecordingSink::new();
    let mut recorder = controller(&capture, &sink);

    recorder.start().await.expect("start");
    drop(recorder);
    for _ in 0..50 {
        if capture.released() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(capture.released());
}

/// Record, stop and dispatch the blob as one voice turn.
#[tokio::test(start_paused = true)]
async fn recorded_blob_is_dispatched_as_audio_turn() {
    let api = Arc::new(ScriptedApi::new());
    api.push_audio(Scripted::Reply(AudioReply {
        transcribed_text: "tell me a joke".to_string(),
        response_text: "why did the chicken".to_string(),
        timestamp: "2024-05-01T10:00:03Z".to_string(),
        audio_url: "/chat/audio/joke.mp3".to_string(),
    }));
    let chat_api: Arc<dyn ChatApi> = api.clone();
    let sink = RecordingSink::new();
    let events: Arc<dyn EventSink> = Arc::new(sink.clone());
    let monitor = ConnectivityMonitor::new(chat_api.clone(), StatusCell::new(), events.clone());
    let conversation = Conversation::new(
        chat_api,
        SharedMessageStore::new(),
        monitor,
        events,
        ClientContext::new("session_voice", "http://localhost:8000", true),
        ConversationTimings::default(),
    );

    let capture = ScriptedCapture::new(vec![vec![0; 100], vec![0; 50]]);
    let mut recorder = controller(&capture, &sink);
    recorder.start().await.expect("start");
    tokio::time::sleep(Duration::from_secs(3)).await;
    let blob = recorder
        .request_stop()
        .expect("was recording")
        .finish()
        .await
        .expect("capture")
        .expect("blob");

    assert_eq!(conversation.send_audio(blob).await, SendOutcome::Completed);
    assert_eq!(
        api.calls(),
        vec![ApiCall::SendAudio {
            session_id: "session_voice".to_string(),
            bytes: 150,
            mime: "audio/webm".to_string(),
        }]
    );
    let messages = conversation.store().snapshot();
    assert_eq!(messages[0].kind, MessageKind::Audio);
    assert_eq!(messages[0].content, "tell me a joke");
    assert_eq!(
        messages[1].audio_url.as_deref(),
        Some("http://localhost:8000/chat/audio/joke.mp3")
    );
}

#[cfg(unix)]
mod command_backend {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sh(script: &str) -> CommandCaptureBackend {
        CommandCaptureBackend::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            "audio/wav",
        )
    }

    /// Output of a recorder that exits on its own is collected.
    #[tokio::test]
    async fn collects_recorder_stdout() {
        let sink = RecordingSink::new();
        let mut recorder = AudioCaptureController::new(
            Arc::new(sh("printf abc; printf def")),
            CaptureConstraints::default(),
            Arc::new(sink),
        );
        assert!(recorder.is_supported());

        recorder.start().await.expect("start");
        tokio::time::sleep(Duration::from_millis(200)).await;
        let blob = tokio::time::timeout(
            Duration::from_secs(5),
            recorder.request_stop().expect("was recording").finish(),
        )
        .await
        .expect("finalized in time")
        .expect("capture")
        .expect("blob");

        assert_eq!(blob.bytes, b"abcdef".to_vec());
        assert_eq!(blob.mime, "audio/wav");
    }

    /// Stopping interrupts a long-running recorder and keeps its output.
    #[tokio::test]
    async fn stop_interrupts_running_recorder() {
        let sink = RecordingSink::new();
        let mut recorder = AudioCaptureController::new(
            Arc::new(sh("printf abc; exec sleep 30")),
            CaptureConstraints::default(),
            Arc::new(sink),
        );

        recorder.start().await.expect("start");
        tokio::time::sleep(Duration::from_millis(300)).await;
        let blob = tokio::time::timeout(
            Duration::from_secs(5),
            recorder.request_stop().expect("was recording").finish(),
        )
        .await
        .expect("recorder stopped in time")
        .expect("capture")
        .expect("blob");

        assert_eq!(blob.bytes, b"abc".to_vec());
    }

    async fn wait_for_failure(sink: &RecordingSink) -> Vec<ChatEvent> {
        for _ in 0..100 {
            let failures: Vec<_> = sink
                .events()
                .into_iter()
                .filter(|event| matches!(event, ChatEvent::RecordingFailed(_)))
                .collect();
            if !failures.is_empty() {
                return failures;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("recorder failure not reported");
    }

    /// A recorder that exits with an error before the stop is a device failure.
    #[tokio::test]
    async fn failing_recorder_is_reported() {
        let sink = RecordingSink::new();
        let mut recorder = AudioCaptureController::new(
            Arc::new(sh("echo 'no such device' >&2; exit 1")),
            CaptureConstraints::default(),
            Arc::new(sink.clone()),
        );

        recorder.start().await.expect("start");
        let failures = wait_for_failure(&sink).await;

        assert_eq!(failures.len(), 1);
        assert!(
            matches!(&failures[0], ChatEvent::RecordingFailed(reason) if reason.contains("recorder exited")),
            "got {failures:?}"
        );
        assert!(!recorder.is_recording());
        assert!(recorder.request_stop().is_none());
    }

    /// A recorder that exits cleanly without any audio is a device failure too.
    #[tokio::test]
    async fn silent_recorder_is_reported() {
        let sink = RecordingSink::new();
        let mut recorder = AudioCaptureController::new(
            Arc::new(sh("exit 0")),
            CaptureConstraints::default(),
            Arc::new(sink.clone()),
        );

        recorder.start().await.expect("start");
        wait_for_failure(&sink).await;

        assert!(!recorder.is_recording());
    }
}
