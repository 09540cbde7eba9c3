// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Text detection capability and the shared, lazily initialised engine handle.

use std::fmt;
use std::sync::{Mutex, OnceLock};

use folienwerk_core::PointF;
use folienwerk_core::error::{FolienwerkError, Result};
use image::RgbImage;
use tracing::{info, warn};

/// One recognised text region, in image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Corner points of the (possibly rotated) region.
    pub quad: [PointF; 4],
    pub text: String,
    /// Recognition confidence in `[0, 1]`.
    pub confidence: f32,
}

/// An optical character recognition engine.
pub trait TextDetector: Send {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;
}

type DetectorFactory = Box<dyn Fn() -> Result<Box<dyn TextDetector>> + Send + Sync>;

/// Shared access to one text detector.
///
/// The engine is expensive to build, so it is constructed on first use from
/// the factory and then reused. Calls are serialised through a mutex, so one
/// handle may be shared by every page worker. If construction fails the
/// failure is logged once and the handle behaves as if no OCR were
/// available.
pub struct DetectorHandle {
    factory: Option<DetectorFactory>,
    engine: OnceLock<Option<Mutex<Box<dyn TextDetector>>>>,
}

impl DetectorHandle {
    /// A handle that builds its engine with `factory` on first use.
    pub fn lazy<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn TextDetector>> + Send + Sync + 'static,
    {
        Self {
            factory: Some(Box::new(factory)),
            engine: OnceLock::new(),
        }
    }

    /// A handle around an engine that already exists.
    pub fn ready(detector: Box<dyn TextDetector>) -> Self {
        let engine = OnceLock::new();
        let _ = engine.set(Some(Mutex::new(detector)));
        Self {
            factory: None,
            engine,
        }
    }

    /// A handle with no engine; every detection yields nothing.
    pub fn unavailable() -> Self {
        Self {
            factory: None,
            engine: OnceLock::new(),
        }
    }

    /// Whether an engine exists or can be built. Builds it if needed.
    pub fn is_available(&self) -> bool {
        self.engine().is_some()
    }

    /// Run detection. Returns `Ok(None)` when no engine is available.
    pub fn detect(&self, image: &RgbImage) -> Result<Option<Vec<Detection>>> {
        let Some(engine) = self.engine() else {
            return Ok(None);
        };
        let mut guard = engine
            .lock()
            .map_err(|_| FolienwerkError::OcrError("OCR engine lock poisoned".into()))?;
        guard.detect(image).map(Some)
    }

    fn engine(&self) -> Option<&Mutex<Box<dyn TextDetector>>> {
        self.engine
            .get_or_init(|| {
                let factory = self.factory.as_ref()?;
                info!("Initialising OCR engine");
                match factory() {
                    Ok(detector) => Some(Mutex::new(detector)),
                    Err(err) => {
                        warn!(%err, "OCR engine unavailable, continuing without OCR");
                        None
                    }
                }
            })
            .as_ref()
    }
}

impl Default for DetectorHandle {
    fn default() -> Self {
        Self::unavailable()
    }
}

impl fmt::Debug for DetectorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.engine.get() {
            Some(Some(_)) => "ready",
            Some(None) => "failed",
            None if self.factory.is_some() => "pending",
            None => "unavailable",
        };
        f.debug_struct("DetectorHandle").field("state", &state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(Vec<Detection>);

    impl TextDetector for Fixed {
        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    fn detection(text: &str) -> Detection {
        Detection {
            quad: [PointF::new(0.0, 0.0); 4],
            text: text.into(),
            confidence: 0.9,
        }
    }

    #[test]
    fn factory_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handle = DetectorHandle::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(Fixed(vec![detection("a")])) as Box<dyn TextDetector>)
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let image = RgbImage::new(2, 2);
        assert_eq!(handle.detect(&image).unwrap().unwrap().len(), 1);
        assert_eq!(handle.detect(&image).unwrap().unwrap().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_init_degrades_to_no_ocr() {
        let handle = DetectorHandle::lazy(|| Err(FolienwerkError::OcrError("no models".into())));
        assert!(!handle.is_available());
        assert_eq!(handle.detect(&RgbImage::new(1, 1)).unwrap(), None);
        assert_eq!(format!("{handle:?}"), "DetectorHandle { state: \"failed\" }");
    }

    #[test]
    fn unavailable_handle_detects_nothing() {
        let handle = DetectorHandle::default();
        assert_eq!(handle.detect(&RgbImage::new(1, 1)).unwrap(), None);
    }

    #[test]
    fn ready_handle_is_available() {
        let handle = DetectorHandle::ready(Box::new(Fixed(Vec::new())));
        assert!(handle.is_available());
    }
}
