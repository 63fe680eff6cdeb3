//! Generation gate tests
//!
//! The scripted model records how many calls overlap; with the gate in place
//! that number never exceeds one, whichever entry point the callers use.

use std::sync::Arc;
use std::time::Duration;

use tokio_test::{assert_err, assert_ok};
use vox_gateway::voice::framing::decode_frames;
use vox_gateway::{ChatMessage, Error};

mod common;
use common::{ScriptedLlm, engine};

fn prompt() -> Vec<ChatMessage> {
    vec![ChatMessage::system("sé breve"), ChatMessage::user("hola")]
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_generations_are_serialized() {
    let llm = Arc::new(ScriptedLlm::new("Hola.").with_delay(Duration::from_millis(30)));
    let engine = engine("hola", Arc::clone(&llm), false);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.generate(prompt(), false).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "Hola.");
    }
    assert_eq!(llm.calls(), 4);
    assert_eq!(llm.peak_concurrency(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_gate_spans_all_generation_modes() {
    let llm = Arc::new(ScriptedLlm::new("Hola. Adiós.").with_delay(Duration::from_millis(30)));
    let engine = engine("hola", Arc::clone(&llm), true);

    let one_shot = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.generate(prompt(), true).await.map(|_| ()) })
    };
    let batch = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.speak(prompt()).await.map(|_| ()) })
    };
    let chunked = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let reply = engine.speak_chunked(prompt()).await?;
            reply.reply.await?.map(|_| ())
        })
    };

    assert_ok!(one_shot.await.unwrap());
    assert_ok!(batch.await.unwrap());
    assert_ok!(chunked.await.unwrap());
    assert_eq!(llm.calls(), 3);
    assert_eq!(llm.peak_concurrency(), 1);
}

#[tokio::test]
async fn test_gate_released_after_failure() {
    let llm = Arc::new(ScriptedLlm::new("Hola.").failing());
    let engine = engine("hola", Arc::clone(&llm), true);

    assert_err!(engine.generate(prompt(), false).await);
    assert!(!engine.is_generating());

    assert_err!(engine.speak(prompt()).await);
    assert!(!engine.is_generating());

    assert_eq!(llm.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_is_generating_while_gate_held() {
    let llm = Arc::new(ScriptedLlm::new("Hola.").with_delay(Duration::from_millis(200)));
    let engine = engine("hola", llm, false);

    let running = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.generate(prompt(), false).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(engine.is_generating());

    assert_ok!(running.await.unwrap());
    assert!(!engine.is_generating());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transcription_bypasses_gate() {
    let llm = Arc::new(ScriptedLlm::new("Hola.").with_delay(Duration::from_millis(300)));
    let engine = engine("avanza", llm, false);

    let running = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.generate(prompt(), false).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let heard = tokio::time::timeout(Duration::from_millis(150), engine.transcribe(vec![1, 2]))
        .await
        .expect("transcription waited on the gate");
    assert_eq!(heard.unwrap(), "avanza");

    assert_ok!(running.await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_stream_still_finishes() {
    let llm = Arc::new(ScriptedLlm::new("Uno. Dos. Tres.").with_delay(Duration::from_millis(20)));
    let engine = engine("hola", Arc::clone(&llm), true);

    let chunked = engine.speak_chunked(prompt()).await.unwrap();
    drop(chunked.frames);

    // The next caller waits for the abandoned generation to finish
    assert_ok!(engine.generate(prompt(), false).await);

    let reply = chunked.reply.await.unwrap().unwrap();
    assert_eq!(reply, "Uno. Dos. Tres.");
    assert_eq!(llm.peak_concurrency(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancelled_caller_keeps_gate_until_model_returns() {
    let llm = Arc::new(ScriptedLlm::new("Hola.").with_delay(Duration::from_millis(300)));
    let engine = engine("hola", Arc::clone(&llm), true);

    let one_shot = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.generate(prompt(), false).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    one_shot.abort();
    assert!(one_shot.await.unwrap_err().is_cancelled());
    assert!(engine.is_generating());

    assert_ok!(engine.generate(prompt(), false).await);

    let batch = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.speak(prompt()).await.map(|_| ()) })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    batch.abort();
    assert!(batch.await.unwrap_err().is_cancelled());
    assert!(engine.is_generating());

    assert_ok!(engine.speak(prompt()).await);

    assert_eq!(llm.calls(), 4);
    assert_eq!(llm.peak_concurrency(), 1);
}

#[tokio::test]
async fn test_stream_ends_with_terminator() {
    let llm = Arc::new(ScriptedLlm::new("Uno. Dos."));
    let engine = engine("hola", llm, true);

    let mut chunked = engine.speak_chunked(prompt()).await.unwrap();
    let mut stream = Vec::new();
    while let Some(frame) = chunked.frames.recv().await {
        stream.extend_from_slice(&frame);
    }

    assert_eq!(decode_frames(&stream).unwrap().len(), 2);
    assert_eq!(chunked.reply.await.unwrap().unwrap(), "Uno. Dos.");
}

#[tokio::test]
async fn test_speech_requires_synthesizer() {
    let llm = Arc::new(ScriptedLlm::new("Hola."));
    let engine = engine("hola", Arc::clone(&llm), false);

    assert!(matches!(
        engine.speak(prompt()).await,
        Err(Error::NotConfigured(_))
    ));
    assert!(matches!(
        engine.speak_chunked(prompt()).await,
        Err(Error::NotConfigured(_))
    ));
    assert_eq!(llm.calls(), 0);
}
