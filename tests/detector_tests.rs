// Integration tests for the record-then-analyze flow

use anyhow::Result;
use do_not_lie::audio::ScriptedDevice;
use do_not_lie::render::Scene;
use do_not_lie::{
    Analysis, AnalysisAdapter, AnalysisError, Clip, Detector, MicrophoneSession, SessionConfig,
    SessionState, SimulatedAnalyzer, StartError, Verdict, WaveformRenderer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Adapter returning a fixed outcome after a delay
struct FixedAnalyzer {
    outcome: Result<Analysis, AnalysisError>,
    delay: Duration,
}

#[async_trait::async_trait]
impl AnalysisAdapter for FixedAnalyzer {
    async fn analyze(&self, _clip: &Clip) -> Result<Analysis, AnalysisError> {
        tokio::time::sleep(self.delay).await;
        self.outcome.clone()
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

fn detector_with(device: ScriptedDevice, analyzer: Arc<dyn AnalysisAdapter>) -> Detector {
    let session = MicrophoneSession::new(
        Arc::new(device),
        SessionConfig {
            frame_interval: Duration::from_millis(5),
            ..Default::default()
        },
    );
    Detector::new(Arc::new(session), analyzer)
}

fn fixed(outcome: Result<Analysis, AnalysisError>, delay: Duration) -> Arc<dyn AnalysisAdapter> {
    Arc::new(FixedAnalyzer { outcome, delay })
}

#[tokio::test]
async fn test_finish_publishes_verdict() -> Result<()> {
    let device = ScriptedDevice::new().with_chunks(vec![b"voice".to_vec()]);
    let detector = detector_with(
        device,
        Arc::new(SimulatedAnalyzer::seeded(Duration::ZERO, 11)),
    );

    detector.start().await?;
    let analysis = detector.finish().await.expect("analysis");

    assert_eq!(detector.result(), Some(analysis));
    assert!(!detector.is_busy());
    assert!(detector
        .share_text()
        .unwrap()
        .contains(&format!("{}% confidence", analysis.confidence)));

    Ok(())
}

#[tokio::test]
async fn test_finish_without_recording() -> Result<()> {
    let detector = detector_with(
        ScriptedDevice::new(),
        Arc::new(SimulatedAnalyzer::seeded(Duration::ZERO, 1)),
    );

    assert!(detector.finish().await.is_none());
    assert!(detector.result().is_none());
    assert!(!detector.is_busy());

    Ok(())
}

#[tokio::test]
async fn test_empty_clip_degrades_to_neutral() -> Result<()> {
    let detector = detector_with(
        ScriptedDevice::new(),
        Arc::new(SimulatedAnalyzer::seeded(Duration::ZERO, 1)),
    );

    detector.start().await?;
    let analysis = detector.finish().await.expect("analysis");

    assert_eq!(analysis, Analysis::new(Verdict::Neutral, 0));
    Ok(())
}

#[tokio::test]
async fn test_adapter_error_degrades_to_neutral() -> Result<()> {
    let device = ScriptedDevice::new().with_chunks(vec![b"voice".to_vec()]);
    let detector = detector_with(
        device,
        fixed(
            Err(AnalysisError::Remote("model offline".to_string())),
            Duration::ZERO,
        ),
    );

    detector.start().await?;
    assert_eq!(detector.finish().await, Some(Analysis::degraded()));
    assert_eq!(detector.result(), Some(Analysis::degraded()));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_slow_adapter_times_out() -> Result<()> {
    let detector = detector_with(
        ScriptedDevice::new(),
        fixed(
            Ok(Analysis::new(Verdict::Truth, 95)),
            Duration::from_secs(60),
        ),
    )
    .with_timeout(Duration::from_secs(5));

    let clip = Clip::assemble(vec![b"voice".to_vec()], "audio/webm");
    assert_eq!(detector.analyze(&clip).await, Analysis::degraded());
    assert!(!detector.is_busy());

    Ok(())
}

#[tokio::test]
async fn test_busy_while_analyzing() -> Result<()> {
    let detector = Arc::new(detector_with(
        ScriptedDevice::new(),
        fixed(Ok(Analysis::new(Verdict::Lie, 88)), Duration::from_millis(100)),
    ));

    let mut busy = detector.subscribe_busy();
    let task = tokio::spawn({
        let detector = Arc::clone(&detector);
        async move {
            let clip = Clip::assemble(vec![b"voice".to_vec()], "audio/webm");
            detector.analyze(&clip).await
        }
    });

    timeout(Duration::from_secs(2), busy.wait_for(|b| *b)).await??;

    let mut renderer = WaveformRenderer::new(640, 100)?;
    let scene = detector.paint(&mut renderer);
    assert!(matches!(scene, Scene::Busy(ref bars) if bars.len() == 64));

    let analysis = task.await?;
    assert_eq!(analysis, Analysis::new(Verdict::Lie, 88));
    assert!(!detector.is_busy());

    let scene = detector.paint(&mut renderer);
    assert!(matches!(scene, Scene::Baseline(_)));

    Ok(())
}

#[tokio::test]
async fn test_paint_live_bars_while_recording() -> Result<()> {
    let device = ScriptedDevice::new().with_frames(vec![vec![255; 128]]);
    let detector = detector_with(
        device,
        Arc::new(SimulatedAnalyzer::seeded(Duration::ZERO, 1)),
    );

    detector.start().await?;
    let mut frames = detector.session().frequency();
    timeout(Duration::from_secs(2), frames.wait_for(|f| f.is_some())).await??;

    let mut renderer = WaveformRenderer::new(256, 100)?;
    let scene = detector.paint(&mut renderer);
    let Scene::Live(bars) = scene else {
        panic!("expected live bars");
    };
    assert_eq!(bars.len(), 128);
    assert_eq!(bars[0].height, 80.0);

    detector.session().teardown().await;
    Ok(())
}

#[tokio::test]
async fn test_start_and_reset_clear_result() -> Result<()> {
    let device = ScriptedDevice::new().with_chunks(vec![b"voice".to_vec()]);
    let detector = detector_with(
        device,
        fixed(Ok(Analysis::new(Verdict::Truth, 90)), Duration::ZERO),
    );

    detector.start().await?;
    detector.finish().await;
    assert!(detector.result().is_some());

    detector.reset();
    assert!(detector.result().is_none());
    assert!(detector.share_text().is_none());

    detector.start().await?;
    detector.finish().await;
    assert!(detector.result().is_some());

    detector.start().await?;
    assert!(detector.result().is_none());
    detector.session().teardown().await;

    Ok(())
}

#[tokio::test]
async fn test_stop_marks_busy_before_analysis() -> Result<()> {
    let device = ScriptedDevice::new().with_chunks(vec![b"voice".to_vec()]);
    let detector = detector_with(
        device,
        fixed(Ok(Analysis::new(Verdict::Truth, 75)), Duration::ZERO),
    );

    detector.start().await?;
    let (clip, ticket) = detector.stop().await.expect("clip");
    assert!(detector.is_busy());

    assert_eq!(detector.start().await, Err(StartError::Busy));
    assert_eq!(detector.session().state(), SessionState::Idle);

    let analysis = detector.complete_analysis(ticket, &clip).await;
    assert_eq!(analysis, Analysis::new(Verdict::Truth, 75));
    assert!(!detector.is_busy());

    detector.start().await?;
    assert_eq!(detector.result(), None);
    assert_eq!(
        detector.start().await,
        Err(StartError::Active(SessionState::Recording))
    );
    detector.session().teardown().await;

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_abandoned_analysis_clears_busy() -> Result<()> {
    let device = ScriptedDevice::new().with_chunks(vec![b"voice".to_vec()]);
    let detector = detector_with(
        device,
        fixed(Ok(Analysis::new(Verdict::Lie, 90)), Duration::from_secs(60)),
    );

    detector.start().await?;
    assert!(timeout(Duration::from_secs(1), detector.finish())
        .await
        .is_err());

    assert!(!detector.is_busy());
    assert!(detector.result().is_none());

    let mut renderer = WaveformRenderer::new(64, 32)?;
    assert!(matches!(detector.paint(&mut renderer), Scene::Baseline(_)));

    Ok(())
}
