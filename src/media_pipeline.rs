//! Fetches and decodes slide images over HTTP.
//!
//! This module is responsible for:
//! - Downloading an image with `reqwest` and decoding it with `image` on a blocking worker.
//! - Recording what was applied to each material in a shared `TextureStore`.
//! - Exposing both through `HttpImageDownloader`, the runtime `ImageDownloader`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use image::GenericImageView;
use log::{debug, error, info, trace};
use reqwest::Client as ReqwestClient;
use tokio::task::JoinHandle;

use crate::download_slots::{CompletionSender, DownloadHandle, ImageDownloader};
use crate::errors::MediaError;
use crate::model::{DownloadFailure, DownloadState, ImageDimensions, MaterialId, SlideUrl, TextureId, WrapMode};

/// What a material currently displays.
#[derive(Clone, Debug, PartialEq)]
pub enum AppliedTexture {
    Downloaded { url: SlideUrl, dimensions: ImageDimensions, wrap: WrapMode },
    /// The configured error texture.
    Fallback(TextureId),
}

/// Shared material table, written by downloads and by the surface.
#[derive(Clone, Debug, Default)]
pub struct TextureStore {
    inner: Arc<Mutex<HashMap<MaterialId, AppliedTexture>>>,
}

impl TextureStore {
    fn lock(&self) -> MutexGuard<'_, HashMap<MaterialId, AppliedTexture>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn apply(&self, material: MaterialId, texture: AppliedTexture) {
        trace!("Material {} now shows {:?}", material, texture);
        self.lock().insert(material, texture);
    }

    pub fn get(&self, material: &MaterialId) -> Option<AppliedTexture> {
        self.lock().get(material).cloned()
    }
}

/// Downloads slides on the tokio runtime the caller is running in.
#[derive(Clone, Debug)]
pub struct HttpImageDownloader {
    client: ReqwestClient,
    textures: TextureStore,
}

impl HttpImageDownloader {
    pub fn new(client: ReqwestClient, textures: TextureStore) -> Self {
        Self { client, textures }
    }

    pub fn textures(&self) -> &TextureStore {
        &self.textures
    }
}

#[derive(Debug)]
pub struct HttpDownloadHandle {
    state: Arc<Mutex<DownloadState>>,
    task: JoinHandle<()>,
}

fn set_state(state: &Mutex<DownloadState>, value: DownloadState) {
    *state.lock().unwrap_or_else(PoisonError::into_inner) = value;
}

impl DownloadHandle for HttpDownloadHandle {
    fn state(&self) -> DownloadState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(self) {
        if !self.task.is_finished() {
            debug!("Cancelling in-flight download");
        }
        self.task.abort();
    }
}

impl ImageDownloader for HttpImageDownloader {
    type Handle = HttpDownloadHandle;

    fn download(
        &mut self,
        url: &SlideUrl,
        material: &MaterialId,
        receiver: CompletionSender,
        wrap: WrapMode,
    ) -> HttpDownloadHandle {
        let state = Arc::new(Mutex::new(DownloadState::Pending));
        let task_state = state.clone();
        let client = self.client.clone();
        let textures = self.textures.clone();
        let url = url.clone();
        let material = material.clone();

        let task = tokio::spawn(async move {
            match fetch_image(&client, &url).await {
                Ok(dimensions) => {
                    textures.apply(material, AppliedTexture::Downloaded { url, dimensions, wrap });
                    set_state(&task_state, DownloadState::Complete);
                    receiver.loaded(dimensions);
                }
                Err(e) => {
                    set_state(&task_state, DownloadState::Error);
                    receiver.failed(DownloadFailure::new(url, e.code(), e.to_string(), Some(material)));
                }
            }
        });
        HttpDownloadHandle { state, task }
    }
}

/// Fetches an image and returns its pixel dimensions.
#[must_use = "fetching an image can fail; the Result must be handled"]
pub async fn fetch_image(client: &ReqwestClient, url: &SlideUrl) -> Result<ImageDimensions, MediaError> {
    debug!("Fetching image: {}", url);
    let response = client.get(url.as_str()).send().await.map_err(|e| {
        error!("Request error fetching image {}: {:?}", url, e);
        MediaError::Download(e)
    })?;

    let status = response.status();
    if !status.is_success() {
        error!("HTTP error {} fetching image {}", status, url);
        return Err(MediaError::HttpStatus(status));
    }

    let image_bytes = response.bytes().await.map_err(|e| {
        error!("Error reading image bytes for {}: {:?}", url, e);
        MediaError::Download(e)
    })?;

    trace!("Decoding {} bytes from {}", image_bytes.len(), url);
    let dimensions = tokio::task::spawn_blocking(move || decode_dimensions(&image_bytes))
        .await
        .map_err(|e| {
            error!("Decode task for {} failed: {}", url, e);
            MediaError::Task(e.to_string())
        })??;

    info!("Fetched {} ({}x{})", url, dimensions.width, dimensions.height);
    Ok(dimensions)
}

/// Decodes an encoded image and returns its dimensions.
pub fn decode_dimensions(bytes: &[u8]) -> Result<ImageDimensions, MediaError> {
    let img = image::load_from_memory(bytes)?;
    let (width, height) = img.dimensions();
    Ok(ImageDimensions { width, height })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_poller::ErrorMailbox;
    use crate::errors::DownloadErrorCode;
    use crate::download_slots::DownloadEvent;
    use std::io::Cursor;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::new_rgba8(width, height)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    /// Answers a single HTTP request with `status` and `body`.
    async fn serve_once(status: &'static str, body: Vec<u8>) -> SlideUrl {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            let _ = socket.shutdown().await;
        });
        SlideUrl::parse(&format!("http://{}/slide.png", addr)).unwrap()
    }

    fn client() -> ReqwestClient {
        ReqwestClient::builder().no_proxy().build().unwrap()
    }

    #[test]
    fn decodes_dimensions() {
        assert_eq!(decode_dimensions(&png(16, 9)).unwrap(), ImageDimensions { width: 16, height: 9 });
    }

    #[test]
    fn garbage_is_an_invalid_image() {
        let err = decode_dimensions(b"definitely not a png").unwrap_err();
        assert_eq!(err.code(), DownloadErrorCode::InvalidImage);
    }

    #[test]
    fn texture_store_keeps_the_latest_texture() {
        let store = TextureStore::default();
        let material = MaterialId("screen".into());
        assert_eq!(store.get(&material), None);
        store.apply(material.clone(), AppliedTexture::Fallback(TextureId("error.png".into())));
        store.apply(material.clone(), AppliedTexture::Fallback(TextureId("other.png".into())));
        assert_eq!(store.get(&material), Some(AppliedTexture::Fallback(TextureId("other.png".into()))));
    }

    #[tokio::test]
    async fn fetch_reports_http_status() {
        let url = serve_once("404 Not Found", Vec::new()).await;
        let err = fetch_image(&client(), &url).await.unwrap_err();
        assert!(matches!(err, MediaError::HttpStatus(status) if status.as_u16() == 404));
        assert_eq!(err.code(), DownloadErrorCode::DownloadError);
    }

    #[tokio::test]
    async fn downloader_applies_texture_then_notifies() {
        let url = serve_once("200 OK", png(4, 3)).await;
        let (tx, mut events) = mpsc::unbounded_channel();
        let mailbox = ErrorMailbox::default();
        let mut downloader = HttpImageDownloader::new(client(), TextureStore::default());
        let material = MaterialId("screen".into());

        let handle = downloader.download(&url, &material, CompletionSender::new(tx, mailbox.clone()), WrapMode::Repeat);
        let dimensions = ImageDimensions { width: 4, height: 3 };
        assert_eq!(events.recv().await, Some(DownloadEvent::Loaded(dimensions)));
        assert_eq!(handle.state(), DownloadState::Complete);
        assert_eq!(
            downloader.textures().get(&material),
            Some(AppliedTexture::Downloaded { url, dimensions, wrap: WrapMode::Repeat })
        );
        assert!(mailbox.is_empty());
        handle.release();
    }

    #[tokio::test]
    async fn downloader_posts_failures_to_the_mailbox() {
        let url = serve_once("403 Forbidden", Vec::new()).await;
        let (tx, mut events) = mpsc::unbounded_channel();
        let mailbox = ErrorMailbox::default();
        let mut downloader = HttpImageDownloader::new(client(), TextureStore::default());
        let material = MaterialId("screen".into());

        let handle = downloader.download(&url, &material, CompletionSender::new(tx, mailbox.clone()), WrapMode::Clamp);
        assert_eq!(events.recv().await, Some(DownloadEvent::Failed));
        assert_eq!(handle.state(), DownloadState::Error);
        let failure = mailbox.take().unwrap();
        assert_eq!(failure.code, DownloadErrorCode::AccessDenied);
        assert_eq!(failure.material, Some(material.clone()));
        assert_eq!(downloader.textures().get(&material), None);
    }
}
