//! Integration tests for the detector set
//!
//! Exercise detectors through `Detector::analyze` and the registry, the way
//! the analysis service calls them.

#[cfg(test)]
mod integration_tests {
    use chrono::Utc;

    use crate::logic::artifact::{wav, Artifact, ArtifactKind, Payload, PixelFormat, RawArtifact};
    use crate::logic::detector::audio::{
        ArtifactSummary, AudioDeepfakeDetector, AudioFeatures, PitchSummary, SpectralSummary,
    };
    use crate::logic::detector::rules::{AudioThresholds, DetectorConfig};
    use crate::logic::detector::{Availability, Capabilities, Detector, DetectorError, DetectorRegistry};
    use crate::logic::verdict::{Channel, Indicator};

    fn audio_artifact(samples: Vec<f32>, sample_rate: u32) -> Artifact {
        Artifact::new(Channel::Microphone, Payload::Audio { samples, sample_rate }, Utc::now())
    }

    /// Deterministic noise-like signal with a moving pitch and loudness
    fn lively_voice(sample_rate: u32, seconds: f32) -> Vec<f32> {
        let len = (sample_rate as f32 * seconds) as usize;
        let mut state: u32 = 0x1234_5678;
        let mut phase = 0.0f32;
        (0..len)
            .map(|i| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                let noise = (state as f32 / u32::MAX as f32) * 2.0 - 1.0;
                let t = i as f32 / sample_rate as f32;
                let f0 = 120.0 + 60.0 * (t * 3.0).sin();
                phase += 2.0 * std::f32::consts::PI * f0 / sample_rate as f32;
                let envelope = 0.2 + 0.7 * ((t * 5.0).sin().abs()).powi(3);
                (phase.sin() * 0.6 + noise * 0.4) * envelope
            })
            .collect()
    }

    fn detector() -> AudioDeepfakeDetector {
        AudioDeepfakeDetector::new(AudioThresholds::default(), Availability::Available)
    }

    #[test]
    fn test_scenario_a_rules() {
        let features = AudioFeatures {
            spectral: Some(SpectralSummary {
                centroid_mean: 5000.0,
                rolloff_mean: 3000.0,
                bandwidth_std: 800.0,
            }),
            pitch: Some(PitchSummary { mean: 150.0, std: 5.0 }),
            artifacts: ArtifactSummary {
                zcr_mean: 0.1,
                rms_std: 0.1,
                peak_to_mean: 5.0,
            },
        };

        let findings = detector().evaluate(&features);
        let raised: Vec<(Indicator, u8)> = findings.iter().map(|f| (f.indicator, f.confidence())).collect();
        assert_eq!(
            raised,
            vec![(Indicator::SpectralCenter, 25), (Indicator::PitchStable, 30)]
        );
    }

    #[test]
    fn test_no_voiced_frames_means_no_voice_findings() {
        let features = AudioFeatures {
            spectral: None,
            pitch: None,
            artifacts: ArtifactSummary {
                zcr_mean: 0.2,
                rms_std: 0.1,
                peak_to_mean: 6.0,
            },
        };
        assert!(detector().evaluate(&features).is_empty());
    }

    #[test]
    fn test_empty_audio_is_zero_verdict() {
        let verdict = detector().analyze(&audio_artifact(vec![], 16_000)).unwrap();
        assert_eq!(verdict.confidence(), 0);
        assert!(verdict.findings().is_empty());
        assert!(!verdict.is_threat());
    }

    #[test]
    fn test_all_zero_audio_completes() {
        let verdict = detector().analyze(&audio_artifact(vec![0.0; 48_000], 16_000)).unwrap();
        assert!(verdict.confidence() <= 100);
        assert!(!verdict.is_threat());
    }

    #[test]
    fn test_pure_tone_flags_artifacts_but_not_threat() {
        let samples: Vec<f32> = (0..16_000)
            .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 16_000.0).sin() * 0.5)
            .collect();
        let verdict = detector().analyze(&audio_artifact(samples, 16_000)).unwrap();

        assert!(verdict.has_indicator(Indicator::PitchStable));
        assert!(verdict.has_indicator(Indicator::RmsStable));
        assert!(verdict.has_indicator(Indicator::RmsDynamic));
        assert_eq!(verdict.confidence(), 30);
        assert!(!verdict.is_threat());
    }

    #[test]
    fn test_findings_bounded_and_verdict_is_max() {
        let verdict = detector().analyze(&audio_artifact(lively_voice(16_000, 2.0), 16_000)).unwrap();
        let max = verdict.findings().iter().map(|f| f.confidence()).max().unwrap_or(0);
        assert!(verdict.findings().iter().all(|f| f.confidence() <= 100));
        assert_eq!(verdict.confidence(), max);
        assert_eq!(verdict.is_threat(), verdict.confidence() > 50);
    }

    #[test]
    fn test_deterministic() {
        let artifact = audio_artifact(lively_voice(16_000, 1.0), 16_000);
        let d = detector();
        assert_eq!(d.analyze(&artifact).unwrap(), d.analyze(&artifact).unwrap());
    }

    #[test]
    fn test_low_sample_rate_swallows_pitch_failure() {
        // 1 kHz audio cannot be pitch-tracked up to 1000 Hz; the rest still runs
        let samples: Vec<f32> = (0..4000).map(|i| ((i % 7) as f32 - 3.0) / 10.0).collect();
        let verdict = detector().analyze(&audio_artifact(samples, 1_000)).unwrap();
        assert!(!verdict.has_indicator(Indicator::PitchStable));
        assert!(!verdict.has_indicator(Indicator::PitchRange));
    }

    #[test]
    fn test_dependency_unavailable() {
        let d = AudioDeepfakeDetector::new(
            AudioThresholds::default(),
            Availability::Unavailable("disabled".into()),
        );
        let result = d.analyze(&audio_artifact(vec![0.1; 100], 16_000));
        assert!(matches!(result, Err(DetectorError::DependencyUnavailable(_))));
    }

    #[test]
    fn test_audio_detector_rejects_text() {
        let artifact = Artifact::new(Channel::Clipboard, Payload::Text("hi".into()), Utc::now());
        assert!(matches!(
            detector().analyze(&artifact),
            Err(DetectorError::UnsupportedArtifact(_))
        ));
    }

    #[test]
    fn test_registry_wav_roundtrip_through_decode() {
        let registry = DetectorRegistry::standard(&DetectorConfig::default(), Capabilities::all_available());
        let bytes = wav::encode_pcm16(&lively_voice(16_000, 1.0), 16_000);
        let raw = RawArtifact::new(Channel::Microphone, ArtifactKind::Audio, bytes);
        let artifact = Artifact::decode(&raw).unwrap();

        let verdict = registry.analyze(&artifact).unwrap();
        assert_eq!(verdict.channel(), Channel::Microphone);
        assert_eq!(verdict.metadata().sample_rate, Some(16_000));
        assert!(verdict.metadata().duration_secs.unwrap() > 0.99);
    }

    #[test]
    fn test_registry_missing_dependency() {
        let caps = Capabilities {
            audio_features: Availability::Unavailable("probe failed".into()),
        };
        let registry = DetectorRegistry::standard(&DetectorConfig::default(), caps);
        let result = registry.analyze(&audio_artifact(vec![0.2; 1000], 16_000));
        assert!(matches!(result, Err(DetectorError::DependencyUnavailable(_))));

        // Text detection does not depend on it
        let text = Artifact::new(Channel::Clipboard, Payload::Text("hello".into()), Utc::now());
        assert_eq!(registry.analyze(&text).unwrap().confidence(), 0);
    }

    #[test]
    fn test_registry_text_threat() {
        let registry = DetectorRegistry::standard(&DetectorConfig::default(), Capabilities::all_available());
        let text = "Security alert: your PC has been locked. Call 1-800-555-0142 now";
        let artifact = Artifact::new(Channel::Screen, Payload::Text(text.into()), Utc::now());
        let verdict = registry.analyze(&artifact).unwrap();

        assert!(verdict.has_indicator(Indicator::TechSupportScam));
        assert_eq!(verdict.confidence(), 75);
        assert!(verdict.is_threat());
    }

    #[test]
    fn test_registry_screen_flood() {
        let registry = DetectorRegistry::standard(&DetectorConfig::default(), Capabilities::all_available());
        let pixels = [220u8, 10, 10].repeat(100);
        let artifact = Artifact::new(
            Channel::Screen,
            Payload::Image { pixels, width: 10, height: 10, format: PixelFormat::Rgb8 },
            Utc::now(),
        );
        let verdict = registry.analyze(&artifact).unwrap();
        assert!(verdict.has_indicator(Indicator::AlarmColor));
        assert!(verdict.has_indicator(Indicator::AlarmFlood));
        assert_eq!(verdict.confidence(), 60);
        assert!(verdict.is_threat());
    }

    #[test]
    fn test_empty_registry_is_unsupported() {
        let registry = DetectorRegistry::new(Capabilities::all_available());
        let artifact = Artifact::new(Channel::Clipboard, Payload::Text("x".into()), Utc::now());
        assert!(matches!(
            registry.analyze(&artifact),
            Err(DetectorError::UnsupportedArtifact(_))
        ));
    }
}
