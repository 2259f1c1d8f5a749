//! Guidance Demo — drive the coordinator through a scripted emergency.
//!
//! Engines are scripted doubles, so this runs anywhere. If `LIFELINE_API_KEY`
//! (or `OPENROUTER_API_KEY`) is set in the environment or `.env`, the cloud
//! responder answers; otherwise every answer comes from the offline fallback
//! table — the exact degradation path a device with no credential takes.

use lifeline_voice::{
    CloudResponder, Coordinator, CoordinatorConfig, CoordinatorEvent, CoordinatorHandle,
    EmergencyCategory, FallbackResponder, InteractionState, PlaybackPreferences, PreferenceStore,
    Responder, ScriptedRecognizer, ScriptedStep, ScriptedSynthesizer, StaticPreferenceReader,
    Subsystems,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

async fn wait_for_idle(handle: &CoordinatorHandle) {
    let mut states = handle.watch_state();
    let _ = tokio::time::timeout(Duration::from_secs(20), async {
        loop {
            if *states.borrow() == InteractionState::Idle {
                break;
            }
            if states.changed().await.is_err() {
                break;
            }
        }
    })
    .await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Guidance Demo — listen → respond → speak, with offline fallback");

    let recognizer = Arc::new(ScriptedRecognizer::with_sessions(vec![vec![
        ScriptedStep::Ready,
        ScriptedStep::Delay(Duration::from_millis(300)),
        ScriptedStep::Partial("my dad collapsed".to_string()),
        ScriptedStep::Delay(Duration::from_millis(300)),
        ScriptedStep::Final("my dad collapsed and is not breathing".to_string()),
    ]]));
    let synthesizer = Arc::new(ScriptedSynthesizer::new());

    let responder: Option<Arc<dyn Responder>> = match CloudResponder::from_env() {
        Some(cloud) => {
            info!("Responder: cloud (key found in environment).");
            Some(Arc::new(cloud))
        }
        None => {
            info!("Responder: offline fallback table (no LIFELINE_API_KEY set).");
            None
        }
    };

    // Initial preferences from a key-value source, as a settings store would
    // provide them.
    let reader = StaticPreferenceReader::from_pairs([
        ("voice.rate", "1.1"),
        ("voice.language", "en-US"),
    ]);
    let prefs = PreferenceStore::new(PlaybackPreferences::from_reader(&reader));

    let handle = Coordinator::spawn(
        CoordinatorConfig::default(),
        Subsystems {
            recognizer,
            synthesizer,
            responder,
            fallback: FallbackResponder::default(),
        },
        prefs,
    )?;

    let mut states = handle.watch_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = states.borrow().as_str();
            info!(state, "state");
        }
    });
    let mut events = handle.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                CoordinatorEvent::Transcript(t) => info!(kind = ?t.kind, "transcript: {}", t.text),
                CoordinatorEvent::Response(r) => {
                    info!(source = r.source().unwrap_or("?"), "guidance: {}", r.text);
                }
                CoordinatorEvent::ActionRequired(action) => info!("action required: {action:?}"),
                CoordinatorEvent::Error(report) => {
                    info!(class = ?report.class, "error: {}", report.message);
                }
            }
        }
    });

    // Voice path: scripted "not breathing" emergency.
    handle.start_listening()?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    wait_for_idle(&handle).await;

    // Shortcut path: bypasses recognition entirely.
    handle.shortcut(EmergencyCategory::Burn)?;
    tokio::time::sleep(Duration::from_millis(200)).await;
    wait_for_idle(&handle).await;

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.shutdown()?;
    info!("demo finished");
    Ok(())
}
