//! Single-frame preview of the current form.

use crate::api::RenderService;
use crate::error::{ActionError, ServiceError};
use crate::form::FormState;
use crate::model::{PreviewImage, UiEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

pub(crate) struct PreviewController {
    service: Arc<dyn RenderService>,
    events: UnboundedSender<UiEvent>,
    /// Fixed output file; `None` writes next to other temp files, named by image type.
    dest: Option<PathBuf>,
}

impl PreviewController {
    pub fn new(
        service: Arc<dyn RenderService>,
        events: UnboundedSender<UiEvent>,
        dest: Option<PathBuf>,
    ) -> Self {
        Self {
            service,
            events,
            dest,
        }
    }

    fn target_for(&self, image: &PreviewImage) -> PathBuf {
        self.dest.clone().unwrap_or_else(|| {
            std::env::temp_dir().join(format!("chronoscope-preview.{}", image.extension()))
        })
    }

    /// Render one frame for the form and save it. On any failure the panel is hidden.
    pub async fn generate(&self, form: &FormState) -> Result<PathBuf, ActionError> {
        let config = match form.build() {
            Ok(config) => config,
            Err(e) => {
                self.send(UiEvent::alert("Invalid configuration", e.to_string()));
                return Err(e.into());
            }
        };

        self.send(UiEvent::PreviewLoading);
        let image = match self.service.preview(&config).await {
            Ok(image) => image,
            Err(e) => return Err(self.hide(e)),
        };

        let path = self.target_for(&image);
        if let Err(e) = tokio::fs::write(&path, &image.bytes).await {
            return Err(self.hide(e.into()));
        }

        info!(
            path = %path.display(),
            width = image.width,
            height = image.height,
            "preview saved"
        );
        self.send(UiEvent::PreviewReady {
            path: path.clone(),
            format: image.format,
            width: image.width,
            height: image.height,
            bytes: image.bytes.len(),
        });
        Ok(path)
    }

    fn hide(&self, e: ServiceError) -> ActionError {
        warn!(error = %e, "preview failed");
        self.send(UiEvent::PreviewHidden);
        self.send(UiEvent::alert("Error generating preview", e.to_string()));
        e.into()
    }

    fn send(&self, event: UiEvent) {
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeService;
    use crate::model::Resolution;
    use crate::view::{PreviewPanel, ViewState};
    use std::sync::atomic::Ordering;
    use tokio::sync::mpsc;

    fn form() -> FormState {
        FormState {
            repo_path: "/repo".into(),
            ..Default::default()
        }
    }

    fn frame() -> PreviewImage {
        PreviewImage {
            bytes: vec![1, 2, 3, 4],
            format: image::ImageFormat::Png,
            width: 1920,
            height: 1080,
        }
    }

    fn fold(rx: &mut mpsc::UnboundedReceiver<UiEvent>) -> ViewState {
        let mut view = ViewState::default();
        while let Ok(ev) = rx.try_recv() {
            view.apply_event(ev);
        }
        view
    }

    #[tokio::test]
    async fn frame_is_saved_and_shown() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("frame.png");
        let service = Arc::new(FakeService::default());
        service.previews.lock().unwrap().push_back(Ok(frame()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let preview = PreviewController::new(service, tx, Some(dest.clone()));

        let path = preview.generate(&form()).await.unwrap();
        assert_eq!(path, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), [1, 2, 3, 4]);
        match fold(&mut rx).preview {
            PreviewPanel::Shown { width, height, .. } => assert_eq!((width, height), (1920, 1080)),
            other => panic!("unexpected panel {other:?}"),
        }
    }

    #[tokio::test]
    async fn service_failure_hides_the_panel() {
        let service = Arc::new(FakeService::default());
        service
            .previews
            .lock()
            .unwrap()
            .push_back(Err("Failed to generate preview".into()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let preview = PreviewController::new(service, tx, None);

        assert!(preview.generate(&form()).await.is_err());
        let view = fold(&mut rx);
        assert_eq!(view.preview, PreviewPanel::Hidden);
        assert_eq!(view.alerts.len(), 1);
    }

    #[tokio::test]
    async fn invalid_custom_size_aborts_without_a_request() {
        let service = Arc::new(FakeService::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let preview = PreviewController::new(service.clone(), tx, None);
        let form = FormState {
            resolution: Resolution::Custom,
            width: "1280".into(),
            height: String::new(),
            ..form()
        };

        assert!(matches!(
            preview.generate(&form).await,
            Err(ActionError::Validation(_))
        ));
        assert_eq!(service.preview_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fold(&mut rx).preview, PreviewPanel::Hidden);
    }
}
