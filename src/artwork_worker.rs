use std::{
    sync::{
        mpsc::{self, Receiver, TryRecvError},
        Arc,
    },
    thread,
};

use image::RgbaImage;
use log::{debug, warn};

use crate::artwork::{ArtworkFetcher, ArtworkOptions, ArtworkResolver};

pub struct ArtworkMessage {
    pub request_id: u64,
    pub source_ref: String,
    pub bitmap: Option<RgbaImage>,
}

/// Runs [`ArtworkResolver::resolve`] off the tick thread.
///
/// Only the most recent request is tracked; a newer request drops the
/// receiver of the previous one, so stale results are never delivered.
pub struct ArtworkWorker<F> {
    resolver: Arc<ArtworkResolver<F>>,
    rx: Option<Receiver<ArtworkMessage>>,
    inflight_request: Option<u64>,
    next_request_id: u64,
}

impl<F> ArtworkWorker<F>
where
    F: ArtworkFetcher + Send + Sync + 'static,
{
    pub fn new(resolver: Arc<ArtworkResolver<F>>) -> Self {
        Self {
            resolver,
            rx: None,
            inflight_request: None,
            next_request_id: 1,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.inflight_request.is_some()
    }

    pub fn request(&mut self, reference: &str, options: ArtworkOptions) -> u64 {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);

        let (tx, rx) = mpsc::channel();
        self.rx = Some(rx);
        self.inflight_request = Some(request_id);

        let resolver = Arc::clone(&self.resolver);
        let source_ref = reference.to_owned();
        debug!("Artwork request {request_id} for {source_ref:?}");

        thread::spawn(move || {
            let bitmap = resolver.resolve(&source_ref, options);
            let _ = tx.send(ArtworkMessage {
                request_id,
                source_ref,
                bitmap,
            });
        });

        request_id
    }

    /// Forgets any in-flight request without waiting for it.
    pub fn cancel(&mut self) {
        self.rx = None;
        self.inflight_request = None;
    }

    /// Non-blocking: returns the result of the current request once it is ready.
    pub fn poll(&mut self) -> Option<ArtworkMessage> {
        let rx = self.rx.as_ref()?;
        let message = match rx.try_recv() {
            Ok(message) if Some(message.request_id) == self.inflight_request => Some(message),
            Ok(_) => None,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => {
                warn!("Artwork worker exited without a result");
                None
            }
        };
        self.cancel();
        message
    }
}
