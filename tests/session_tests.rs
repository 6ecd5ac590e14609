// Integration tests for the voice session lifecycle
//
// The session is driven directly through its handlers with in-memory doubles
// for the microphone, speaker, remote service and host navigation.

mod common;

use std::time::Duration;

use anyhow::Result;
use common::{audio_event, harness, harness_with, interrupted_event, navigate_event, server_event, Options};
use studio_voice::audio::{AudioFrame, PlaybackEvent};
use studio_voice::live::{OutboundMessage, TransportEvent};
use studio_voice::{ExternalContext, SessionStatus, View, VoiceError};

fn statuses(changes: &mut tokio::sync::broadcast::Receiver<studio_voice::session::StatusChange>) -> Vec<SessionStatus> {
    std::iter::from_fn(|| changes.try_recv().ok())
        .map(|change| change.to)
        .collect()
}

#[tokio::test]
async fn test_cold_start_reaches_active() -> Result<()> {
    let mut h = harness();
    let mut changes = h.session.subscribe();

    h.session.start().await?;

    assert_eq!(h.session.status(), SessionStatus::Active);
    assert_eq!(statuses(&mut changes), vec![SessionStatus::Connecting, SessionStatus::Active]);
    assert!(h.session.is_capturing());
    assert!(h.output.lock().unwrap().open);

    let mut transport = h.transport.lock().unwrap();
    let setup = &transport.setups[0].setup;
    assert_eq!(setup.model, "models/gemini-2.5-flash-native-audio-preview-12-2025");
    assert_eq!(setup.tools[0].function_declarations[0].name, "navigateTo");

    // greeting goes out right after the handshake
    match transport.sent().as_slice() {
        [OutboundMessage::Text(greeting)] => assert!(greeting.starts_with("Greetings.")),
        other => panic!("unexpected outbound messages: {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_microphone_frames_reach_outbound_queue() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    let frames = h.capture.lock().unwrap().frames.clone().unwrap();
    frames
        .send(AudioFrame {
            samples: vec![0.5; 4096],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        })
        .await?;

    let mut outbound = h.transport.lock().unwrap().outbound.take().unwrap();
    assert!(matches!(outbound.recv().await, Some(OutboundMessage::Text(_))));

    let frame = tokio::time::timeout(Duration::from_secs(1), outbound.recv()).await?;
    match frame {
        Some(OutboundMessage::Audio(frame)) => {
            assert_eq!(frame.sample_count, 4096);
            assert_eq!(frame.mime_type, "audio/pcm;rate=16000");
            assert_eq!(frame.sequence, 0);
        }
        other => panic!("expected audio frame, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_microphone_denied_returns_to_standby() -> Result<()> {
    let mut h = harness_with(Options {
        deny_microphone: true,
        ..Options::default()
    });
    let mut changes = h.session.subscribe();

    // start itself does not fail
    h.session.start().await?;

    assert_eq!(h.session.status(), SessionStatus::Standby);
    assert_eq!(
        statuses(&mut changes),
        vec![SessionStatus::Connecting, SessionStatus::Error, SessionStatus::Standby]
    );
    assert!(h.transport.lock().unwrap().setups.is_empty());
    assert!(!h.session.is_capturing());
    Ok(())
}

#[tokio::test]
async fn test_handshake_failure_releases_devices() -> Result<()> {
    let mut h = harness_with(Options {
        fail_handshake: true,
        ..Options::default()
    });
    let mut changes = h.session.subscribe();

    h.session.start().await?;

    assert_eq!(h.session.status(), SessionStatus::Standby);
    assert_eq!(
        statuses(&mut changes),
        vec![SessionStatus::Connecting, SessionStatus::Error, SessionStatus::Standby]
    );
    assert_eq!(h.capture.lock().unwrap().released, 1);
    assert_eq!(h.output.lock().unwrap().closed, 1);

    // a failed start leaves the session ready for another attempt
    assert!(h.session.start().await.is_ok());
    Ok(())
}

#[tokio::test]
async fn test_second_start_is_rejected() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    let err = h.session.start().await.unwrap_err();
    assert!(matches!(err, VoiceError::InvalidState { operation: "start", .. }));
    assert_eq!(h.session.status(), SessionStatus::Active);
    assert_eq!(h.transport.lock().unwrap().setups.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_one_inbound_frame_plays_then_ends() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    // 4800 samples at 24 kHz
    h.session.handle_transport_event(audio_event(4800)).await;

    assert_eq!(h.session.status(), SessionStatus::Speaking);
    assert!(h.session.snapshot().speaking);
    let (id, start, duration) = h.output.lock().unwrap().started[0];
    assert_eq!(start, 0.0);
    assert!((duration - 0.2).abs() < 1e-9);
    assert!((h.session.scheduler().next_start() - 0.2).abs() < 1e-9);

    h.session.handle_playback_event(PlaybackEvent::Ended(id));

    assert_eq!(h.session.status(), SessionStatus::Active);
    assert_eq!(h.session.scheduler().active_len(), 0);
    assert_eq!(h.session.stats().units_scheduled, 1);
    Ok(())
}

#[tokio::test]
async fn test_consecutive_frames_play_back_to_back() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;
    h.output.lock().unwrap().now = 1.0;

    for _ in 0..3 {
        h.session.handle_transport_event(audio_event(2400)).await;
    }

    let started = h.output.lock().unwrap().started.clone();
    assert_eq!(started[0].1, 1.0);
    for pair in started.windows(2) {
        assert!((pair[1].1 - (pair[0].1 + pair[0].2)).abs() < 1e-9);
    }

    // speaking continues until the last unit ends
    h.session.handle_playback_event(PlaybackEvent::Ended(started[0].0));
    h.session.handle_playback_event(PlaybackEvent::Ended(started[1].0));
    assert_eq!(h.session.status(), SessionStatus::Speaking);
    h.session.handle_playback_event(PlaybackEvent::Ended(started[2].0));
    assert_eq!(h.session.status(), SessionStatus::Active);
    Ok(())
}

#[tokio::test]
async fn test_barge_in_stops_all_playback() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    for _ in 0..3 {
        h.session.handle_transport_event(audio_event(4800)).await;
    }
    assert_eq!(h.session.status(), SessionStatus::Speaking);

    h.session.handle_transport_event(interrupted_event()).await;

    assert_eq!(h.session.status(), SessionStatus::Active);
    assert_eq!(h.session.scheduler().active_len(), 0);
    assert_eq!(h.session.scheduler().next_start(), 0.0);

    let output = h.output.lock().unwrap();
    let mut stopped = output.stopped.clone();
    stopped.sort_unstable();
    let started: Vec<_> = output.started.iter().map(|unit| unit.0).collect();
    assert_eq!(stopped, started);
    drop(output);

    // completions of interrupted units are stale
    h.session.handle_playback_event(PlaybackEvent::Ended(started[0]));
    assert_eq!(h.session.status(), SessionStatus::Active);
    assert_eq!(h.session.stats().interruptions, 1);
    Ok(())
}

#[tokio::test]
async fn test_undecodable_frame_is_dropped() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;
    h.session.handle_transport_event(audio_event(4800)).await;
    let cursor = h.session.scheduler().next_start();

    h.session
        .handle_transport_event(server_event(
            r#"{"serverContent": {"modelTurn": {"parts": [{"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAEC"}}]}}}"#,
        ))
        .await;

    assert_eq!(h.session.scheduler().next_start(), cursor);
    assert_eq!(h.session.scheduler().active_len(), 1);
    assert_eq!(h.session.stats().decode_failures, 1);
    assert_eq!(h.session.status(), SessionStatus::Speaking);
    Ok(())
}

#[tokio::test]
async fn test_tool_call_round_trip() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;
    h.transport.lock().unwrap().sent();

    h.session.handle_transport_event(navigate_event("call-1", "meetings")).await;

    assert_eq!(*h.views.lock().unwrap(), vec![View::Meetings]);
    // the host navigated before the response was queued
    assert_eq!(*h.queued_at_navigation.lock().unwrap(), vec![0]);
    let sent = h.transport.lock().unwrap().sent();
    match sent.as_slice() {
        [OutboundMessage::ToolResponse(responses)] => {
            assert_eq!(responses.len(), 1);
            assert_eq!(responses[0].id, "call-1");
            assert_eq!(responses[0].name, "navigateTo");
            assert_eq!(
                responses[0].response,
                serde_json::json!({"result": "Success. Navigated to meetings"})
            );
        }
        other => panic!("expected one tool response, got {:?}", other),
    }
    Ok(())
}

#[tokio::test]
async fn test_every_call_is_answered_independently() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;
    h.transport.lock().unwrap().sent();

    h.session
        .handle_transport_event(server_event(
            r#"{"toolCall": {"functionCalls": [
                {"id": "a", "name": "navigateTo", "args": {"view": "photo"}},
                {"id": "b", "name": "shareScreen", "args": {}},
                {"id": "c", "name": "navigateTo", "args": {"view": "kitchen"}}
            ]}}"#,
        ))
        .await;

    assert_eq!(*h.views.lock().unwrap(), vec![View::Photo]);
    let ids: Vec<String> = h
        .transport
        .lock()
        .unwrap()
        .sent()
        .into_iter()
        .filter_map(|message| match message {
            OutboundMessage::ToolResponse(responses) => Some(responses[0].id.clone()),
            _ => None,
        })
        .collect();
    // unknown function names get no response
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(h.session.stats().tool_calls, 3);
    Ok(())
}

#[tokio::test]
async fn test_combined_message_is_applied_in_order() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;

    h.session
        .handle_transport_event(server_event(&format!(
            r#"{{
                "serverContent": {{
                    "inputTranscription": {{"text": "take me to the scripts"}},
                    "interrupted": true,
                    "modelTurn": {{"parts": [{{"inlineData": {{"mimeType": "audio/pcm;rate=24000", "data": "{}"}}}}]}}
                }},
                "toolCall": {{"functionCalls": [{{"id": "x", "name": "navigateTo", "args": {{"view": "scripts"}}}}]}}
            }}"#,
            common::pcm_payload(2400)
        )))
        .await;

    // tool call first, then the audio is scheduled and stopped by the interruption
    assert_eq!(*h.views.lock().unwrap(), vec![View::Scripts]);
    let output = h.output.lock().unwrap();
    assert_eq!(output.started.len(), 1);
    assert_eq!(output.stopped, vec![output.started[0].0]);
    drop(output);

    assert_eq!(h.session.status(), SessionStatus::Active);
    assert_eq!(h.session.snapshot().transcript, "take me to the scripts");
    Ok(())
}

#[tokio::test]
async fn test_stop_releases_everything() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;
    h.session.handle_transport_event(audio_event(4800)).await;
    h.session
        .handle_transport_event(server_event(r#"{"serverContent": {"inputTranscription": {"text": "hello"}}}"#))
        .await;

    h.session.stop().await;

    assert_eq!(h.session.status(), SessionStatus::Standby);
    assert!(!h.session.is_capturing());
    assert_eq!(h.capture.lock().unwrap().released, 1);
    assert_eq!(h.output.lock().unwrap().closed, 1);
    assert_eq!(h.output.lock().unwrap().stopped.len(), 1);
    assert_eq!(h.session.scheduler().next_start(), 0.0);
    assert!(h.session.snapshot().transcript.is_empty());
    assert_eq!(h.transport.lock().unwrap().sent().last(), Some(&OutboundMessage::Close));

    // stopping again is harmless
    h.session.stop().await;
    assert_eq!(h.capture.lock().unwrap().released, 1);
    Ok(())
}

#[tokio::test]
async fn test_remote_close_tears_down() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;
    h.session.handle_transport_event(audio_event(4800)).await;

    h.session.handle_transport_event(TransportEvent::Closed).await;

    assert_eq!(h.session.status(), SessionStatus::Standby);
    assert!(!h.session.is_capturing());
    assert_eq!(h.output.lock().unwrap().closed, 1);
    assert_eq!(h.session.scheduler().active_len(), 0);
    Ok(())
}

#[tokio::test]
async fn test_transport_error_passes_through_error() -> Result<()> {
    let mut h = harness();
    h.session.start().await?;
    let mut changes = h.session.subscribe();

    h.session
        .handle_transport_event(TransportEvent::Error("connection reset".into()))
        .await;

    assert_eq!(statuses(&mut changes), vec![SessionStatus::Error, SessionStatus::Standby]);
    assert!(!h.session.is_capturing());
    Ok(())
}

#[tokio::test]
async fn test_context_is_captured_at_start() -> Result<()> {
    let mut h = harness();
    h.session.set_context(ExternalContext {
        document: Some("Launch checklist".into()),
        name: Some("launch.md".into()),
    });
    assert!(h.session.snapshot().context_attached);

    h.session.start().await?;
    h.session.set_context(ExternalContext {
        document: Some("Budget".into()),
        name: Some("budget.md".into()),
    });
    h.session.stop().await;
    h.session.start().await?;

    let transport = h.transport.lock().unwrap();
    assert!(transport.instruction(0).contains("USER DOCUMENT (launch.md): Launch checklist"));
    assert!(!transport.instruction(0).contains("Budget"));
    assert!(transport.instruction(1).contains("USER DOCUMENT (budget.md): Budget"));
    Ok(())
}

#[tokio::test]
async fn test_spawned_session_follows_remote_close() -> Result<()> {
    let h = harness();
    let transport = h.transport.clone();
    let output = h.output.clone();
    let (handle, task) = h.session.spawn();
    let mut snapshots = handle.watch();

    handle.start().await?;
    assert_eq!(handle.status().status, SessionStatus::Active);

    let inbound = transport.lock().unwrap().inbound.clone().unwrap();
    inbound.send(audio_event(4800)).await?;
    tokio::time::timeout(
        Duration::from_secs(1),
        snapshots.wait_for(|s| s.status == SessionStatus::Speaking),
    )
    .await??;

    // the output device reports the unit as played
    let id = output.lock().unwrap().started[0].0;
    output.lock().unwrap().finish(id);
    tokio::time::timeout(
        Duration::from_secs(1),
        snapshots.wait_for(|s| s.status == SessionStatus::Active),
    )
    .await??;

    inbound.send(TransportEvent::Closed).await?;
    tokio::time::timeout(
        Duration::from_secs(1),
        snapshots.wait_for(|s| s.status == SessionStatus::Standby),
    )
    .await??;

    assert!(matches!(
        handle.start().await,
        Ok(())
    ));
    let stats = handle.stop().await?;
    assert_eq!(stats.units_scheduled, 0);

    handle.shutdown().await?;
    task.await?;
    Ok(())
}
