use std::sync::Arc;

use image::RgbaImage;
use log::debug;

use crate::{
    artwork::{ArtworkFetcher, ArtworkOptions, ArtworkResolver, DefaultFetcher},
    artwork_worker::ArtworkWorker,
    bus::MediaBus,
    session::{PlaybackStatus, SessionManager},
};

/// Plain display fields handed to the presentation layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DisplaySnapshot {
    pub player: Option<String>,
    pub title: String,
    pub artist: String,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub status: PlaybackStatus,
}

impl DisplaySnapshot {
    pub fn is_playing(&self) -> bool {
        self.status == PlaybackStatus::Playing
    }
}

/// The single artwork slot: the reference it came from and its bitmap.
#[derive(Debug, Clone)]
pub struct ArtworkCacheEntry {
    pub source_ref: String,
    pub bitmap: Arc<RgbaImage>,
}

/// Drives a [`SessionManager`] one `tick()` at a time and keeps the latest
/// display fields and artwork for the presentation layer.
///
/// Artwork is resolved only when the player's art reference changes.
pub struct NowPlayingController<B, F = DefaultFetcher> {
    session: SessionManager<B>,
    resolver: Arc<ArtworkResolver<F>>,
    worker: Option<ArtworkWorker<F>>,
    options: ArtworkOptions,
    display: DisplaySnapshot,
    artwork: Option<ArtworkCacheEntry>,
    artwork_revision: u64,
}

impl<B, F> NowPlayingController<B, F>
where
    B: MediaBus,
    F: ArtworkFetcher + Send + Sync + 'static,
{
    pub fn new(session: SessionManager<B>, resolver: ArtworkResolver<F>) -> Self {
        Self {
            session,
            resolver: Arc::new(resolver),
            worker: None,
            options: ArtworkOptions::default(),
            display: DisplaySnapshot::default(),
            artwork: None,
            artwork_revision: 0,
        }
    }

    pub fn with_artwork_options(mut self, options: ArtworkOptions) -> Self {
        self.options = options;
        self
    }

    /// Resolves artwork on a worker thread; results are applied by later ticks.
    pub fn with_background_artwork(mut self) -> Self {
        self.worker = Some(ArtworkWorker::new(Arc::clone(&self.resolver)));
        self
    }

    pub fn session(&self) -> &SessionManager<B> {
        &self.session
    }

    pub fn artwork_options(&self) -> ArtworkOptions {
        self.options
    }

    /// Changes the output size or radius; the current artwork is re-resolved on the next tick.
    pub fn set_artwork_options(&mut self, options: ArtworkOptions) {
        if self.options == options {
            return;
        }
        self.options = options;
        self.session.forget_art_ref();
        if let Some(worker) = self.worker.as_mut() {
            worker.cancel();
        }
    }

    pub fn tick(&mut self) {
        self.collect_background_artwork();

        if !self.session.is_connected() && !self.session.connect_any() {
            self.reset();
            return;
        }

        let Some(metadata) = self.session.try_metadata() else {
            if !self.session.is_connected() {
                self.reset();
            }
            return;
        };

        if self.session.record_art_ref(&metadata.art_ref) {
            self.request_artwork(&metadata.art_ref);
        }

        let playback = self.session.playback();
        if !self.session.is_connected() {
            self.reset();
            return;
        }

        self.display = DisplaySnapshot {
            player: self
                .session
                .current_handle()
                .map(|handle| handle.short_name().to_owned()),
            title: metadata.title,
            artist: metadata.artist,
            position_seconds: playback.position_seconds,
            duration_seconds: metadata.duration_seconds,
            status: playback.status,
        };
    }

    pub fn display(&self) -> &DisplaySnapshot {
        &self.display
    }

    pub fn current_title(&self) -> &str {
        &self.display.title
    }

    pub fn current_artist(&self) -> &str {
        &self.display.artist
    }

    pub fn current_position_seconds(&self) -> f64 {
        self.display.position_seconds
    }

    pub fn current_duration_seconds(&self) -> f64 {
        self.display.duration_seconds
    }

    pub fn is_playing(&self) -> bool {
        self.display.is_playing()
    }

    pub fn current_artwork(&self) -> Option<&RgbaImage> {
        self.artwork.as_ref().map(|entry| entry.bitmap.as_ref())
    }

    pub fn artwork_entry(&self) -> Option<&ArtworkCacheEntry> {
        self.artwork.as_ref()
    }

    /// Bumped every time the shown artwork changes, including when it is cleared.
    pub fn artwork_revision(&self) -> u64 {
        self.artwork_revision
    }

    pub fn request_play_pause(&mut self) {
        self.session.play_pause();
    }

    pub fn request_next(&mut self) {
        self.session.next();
    }

    pub fn request_previous(&mut self) {
        self.session.previous();
    }

    fn request_artwork(&mut self, reference: &str) {
        if reference.trim().is_empty() {
            if let Some(worker) = self.worker.as_mut() {
                worker.cancel();
            }
            self.store_artwork(reference, None);
            return;
        }

        match self.worker.as_mut() {
            Some(worker) => {
                worker.request(reference, self.options);
                self.store_artwork(reference, None);
            }
            None => {
                let bitmap = self.resolver.resolve(reference, self.options);
                self.store_artwork(reference, bitmap);
            }
        }
    }

    fn collect_background_artwork(&mut self) {
        let Some(message) = self.worker.as_mut().and_then(ArtworkWorker::poll) else {
            return;
        };
        if self.session.state().last_art_ref.as_deref() != Some(message.source_ref.as_str()) {
            debug!("Dropping artwork for superseded reference {:?}", message.source_ref);
            return;
        }
        self.store_artwork(&message.source_ref, message.bitmap);
    }

    fn store_artwork(&mut self, source_ref: &str, bitmap: Option<RgbaImage>) {
        let next = bitmap.map(|bitmap| ArtworkCacheEntry {
            source_ref: source_ref.to_owned(),
            bitmap: Arc::new(bitmap),
        });
        if self.artwork.is_none() && next.is_none() {
            return;
        }
        self.artwork = next;
        self.artwork_revision = self.artwork_revision.wrapping_add(1);
    }

    fn reset(&mut self) {
        self.display = DisplaySnapshot::default();
        if let Some(worker) = self.worker.as_mut() {
            worker.cancel();
        }
        self.store_artwork("", None);
    }
}
