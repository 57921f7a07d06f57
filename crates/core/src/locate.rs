//! Ordered candidate lists: the first candidate found on screen wins.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::detector::{DetectionSpec, Detect, Detector, Hit, ImageSpec, MatchDefaults};
use crate::error::RecordError;
use crate::logger;
use crate::platform::{self, CaptureProvider};
use crate::record::CandidateRecord;
use crate::sleep::sleep_until;
use crate::types::{CaptureRect, Snapshot};

/// Index and hit of the first detector that matches `snapshot`.
///
/// Detectors are tried in order and evaluation stops at the first hit.
/// Every detector sees the same snapshot, pixel candidates included. A
/// detector error is logged and counts as a miss.
pub fn first_hit<D: Detect>(detectors: &[D], snapshot: &Snapshot) -> Option<(usize, Hit)> {
    for (i, detector) in detectors.iter().enumerate() {
        match detector.evaluate(Some(snapshot), snapshot) {
            Ok(Some(hit)) => return Some((i, hit)),
            Ok(None) => {}
            Err(e) => logger::warn(&format!("{}: {}", detector.label(), e)),
        }
    }
    None
}

pub fn locate<D: Detect>(detectors: &[D], snapshot: &Snapshot) -> Option<Hit> {
    first_hit(detectors, snapshot).map(|(_, hit)| hit)
}

/// Detectors normalized from any of the accepted candidate forms.
#[derive(Debug, Default)]
pub struct CandidateList {
    detectors: Vec<Detector>,
}

impl CandidateList {
    /// Reference image paths, all with the default options.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P], defaults: &MatchDefaults) -> Result<Self, RecordError> {
        let detectors = paths
            .iter()
            .map(|p| {
                let spec = DetectionSpec::Image(ImageSpec::new(p.as_ref()));
                Detector::new(&spec, defaults)
            })
            .collect::<Result<_, _>>()?;
        Ok(Self { detectors })
    }

    pub fn from_specs(specs: &[DetectionSpec], defaults: &MatchDefaults) -> Result<Self, RecordError> {
        let detectors = specs
            .iter()
            .map(|s| Detector::new(s, defaults))
            .collect::<Result<_, _>>()?;
        Ok(Self { detectors })
    }

    /// Path strings and option objects, possibly mixed.
    pub fn from_records(records: &[CandidateRecord], defaults: &MatchDefaults) -> Result<Self, RecordError> {
        let specs = records
            .iter()
            .map(CandidateRecord::to_spec)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_specs(&specs, defaults)
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn detectors(&self) -> &[Detector] {
        &self.detectors
    }

    pub fn locate(&self, snapshot: &Snapshot) -> Option<Hit> {
        locate(&self.detectors, snapshot)
    }

    /// Poll until a candidate shows up or `timeout` passes. One capture of
    /// `rect` (whole screen when None) per poll.
    pub fn wait_for(
        &self,
        capture: &dyn CaptureProvider,
        rect: Option<CaptureRect>,
        timeout: Duration,
        interval: Duration,
    ) -> Option<Hit> {
        let deadline = Instant::now() + timeout;
        loop {
            let started = Instant::now();
            if let Some(hit) = self.poll(capture, rect) {
                return Some(hit);
            }
            if started >= deadline {
                return None;
            }
            sleep_until((started + interval).min(deadline));
        }
    }

    /// Poll until no candidate is visible. False if one is still there when
    /// `timeout` passes.
    pub fn wait_to_disappear(
        &self,
        capture: &dyn CaptureProvider,
        rect: Option<CaptureRect>,
        timeout: Duration,
        interval: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let started = Instant::now();
            match platform::snapshot(capture, rect) {
                Ok(snap) => {
                    if self.locate(&snap).is_none() {
                        return true;
                    }
                }
                Err(e) => logger::warn(&format!("capture failed: {}", e)),
            }
            if started >= deadline {
                return false;
            }
            sleep_until((started + interval).min(deadline));
        }
    }

    fn poll(&self, capture: &dyn CaptureProvider, rect: Option<CaptureRect>) -> Option<Hit> {
        match platform::snapshot(capture, rect) {
            Ok(snap) => self.locate(&snap),
            Err(e) => {
                logger::warn(&format!("capture failed: {}", e));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::thread;

    use image::{imageops, DynamicImage, Rgba, RgbaImage};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use crate::detector::PixelSpec;
    use crate::error::{CaptureError, DetectError, MatchResult};
    use crate::platform::stub::StubScreen;
    use crate::platform::PixelSource;
    use crate::types::{Capture, Point, Rgb};

    struct Counting {
        answer: Option<Hit>,
        fail: bool,
        calls: Cell<u32>,
    }

    impl Counting {
        fn hit(x: i32) -> Self {
            Self {
                answer: Some(Hit { point: Point::new(x, 0), confidence: 1.0 }),
                fail: false,
                calls: Cell::new(0),
            }
        }

        fn miss() -> Self {
            Self { answer: None, fail: false, calls: Cell::new(0) }
        }

        fn failing() -> Self {
            Self { answer: None, fail: true, calls: Cell::new(0) }
        }
    }

    impl Detect for Counting {
        fn evaluate(&self, _snapshot: Option<&Snapshot>, _pixels: &dyn PixelSource) -> MatchResult {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(DetectError::Capture(CaptureError::Failed("boom".into())));
            }
            Ok(self.answer)
        }

        fn label(&self) -> String {
            "counting".into()
        }
    }

    fn noise(w: u32, h: u32, seed: u64) -> RgbaImage {
        let mut rng = StdRng::seed_from_u64(seed);
        RgbaImage::from_fn(w, h, |_, _| Rgba([rng.gen(), rng.gen(), rng.gen(), 255]))
    }

    fn blank_snapshot() -> Snapshot {
        let img = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        Snapshot::new(Capture::from_rgba(&img), CaptureRect::new(0, 0, 8, 8))
    }

    #[test]
    fn test_first_match_wins_and_stops_evaluation() {
        let snap = blank_snapshot();
        let list = [Counting::miss(), Counting::hit(1), Counting::hit(2)];
        let (i, hit) = first_hit(&list, &snap).unwrap();
        assert_eq!(i, 1);
        assert_eq!(hit.point.x, 1);
        assert_eq!(list[0].calls.get(), 1);
        assert_eq!(list[1].calls.get(), 1);
        assert_eq!(list[2].calls.get(), 0);
    }

    #[test]
    fn test_error_counts_as_miss() {
        let snap = blank_snapshot();
        let list = [Counting::failing(), Counting::hit(7)];
        assert_eq!(locate(&list, &snap).unwrap().point.x, 7);
        assert!(locate(&[Counting::failing(), Counting::miss()], &snap).is_none());
    }

    #[test]
    fn test_mixed_candidates_share_one_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("star.png");
        let templ = noise(6, 6, 21);
        templ.save(&path).unwrap();

        let screen = StubScreen::new(noise(60, 40, 22));
        screen.set_pixel(Point::new(50, 30), Rgb::new(0, 200, 0));

        let specs = [
            DetectionSpec::Image(ImageSpec::new(&path)),
            DetectionSpec::Pixel(PixelSpec::new(Point::new(50, 30), Rgb::new(0, 200, 0))),
        ];
        let list = CandidateList::from_specs(&specs, &MatchDefaults::default()).unwrap();

        let hit = list
            .wait_for(&screen, None, Duration::from_millis(0), Duration::from_millis(10))
            .expect("pixel candidate");
        assert_eq!(hit.point, Point::new(50, 30));
        assert_eq!(screen.grab_count(), 1);

        screen.paint(&templ, 10, 10);
        let hit = list
            .wait_for(&screen, None, Duration::from_millis(0), Duration::from_millis(10))
            .expect("image candidate");
        assert_eq!(hit.point, Point::new(13, 13));
    }

    #[test]
    fn test_from_records_accepts_mixed_forms() {
        let records: Vec<CandidateRecord> = serde_json::from_str(
            r#"["a.png", {"path": "b.png", "threshold": 0.9, "grayscale": true}]"#,
        )
        .unwrap();
        let list = CandidateList::from_records(&records, &MatchDefaults::default()).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list.detectors().iter().all(|d| d.is_disabled()));
        assert!(list.locate(&blank_snapshot()).is_none());
    }

    #[test]
    fn test_invalid_candidate_is_rejected() {
        let records: Vec<CandidateRecord> =
            serde_json::from_str(r#"[{"path": "b.png", "threshold": 2.0}]"#).unwrap();
        assert!(matches!(
            CandidateList::from_records(&records, &MatchDefaults::default()),
            Err(RecordError::ThresholdRange(_))
        ));
    }

    #[test]
    fn test_wait_for_sees_late_appearance() {
        let templ = noise(8, 8, 23);
        let screen = StubScreen::new(noise(80, 60, 24));
        let d = Detector::with_reference(
            &ImageSpec::new("late.png"),
            &DynamicImage::ImageRgba8(templ.clone()),
            &MatchDefaults::default(),
        )
        .unwrap();
        let list = CandidateList { detectors: vec![d] };

        let painter = screen.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(60));
            painter.paint(&templ, 40, 20);
        });

        let hit = list.wait_for(&screen, None, Duration::from_secs(3), Duration::from_millis(10));
        t.join().unwrap();
        assert_eq!(hit.map(|h| h.point), Some(Point::new(44, 24)));
        assert!(screen.grab_count() > 1);
    }

    #[test]
    fn test_wait_to_disappear() {
        let templ = noise(8, 8, 25);
        let mut scene = noise(50, 50, 26);
        imageops::replace(&mut scene, &templ, 5, 5);
        let screen = StubScreen::new(scene);
        let d = Detector::with_reference(
            &ImageSpec::new("popup.png"),
            &DynamicImage::ImageRgba8(templ),
            &MatchDefaults::default(),
        )
        .unwrap();
        let list = CandidateList { detectors: vec![d] };

        assert!(!list.wait_to_disappear(&screen, None, Duration::from_millis(50), Duration::from_millis(10)));

        screen.set_scene(noise(50, 50, 27));
        assert!(list.wait_to_disappear(&screen, None, Duration::from_millis(50), Duration::from_millis(10)));
    }
}
