#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use now_playing_bar::{
    artwork::{ArtReference, ArtworkError, ArtworkFetcher},
    bus::{BusError, BusValue, MediaBus, PEER_INTERFACE, PLAYER_INTERFACE},
};

pub const PREFIX: &str = "org.mpris.MediaPlayer2.";

pub fn service(short: &str) -> String {
    format!("{PREFIX}{short}")
}

#[derive(Debug, Clone)]
pub struct FakePlayer {
    pub status: String,
    pub title: String,
    pub artists: Vec<String>,
    pub art_url: String,
    pub length_us: i64,
    pub position_us: i64,
    pub read_error: Option<BusError>,
    pub control_error: Option<BusError>,
    pub refuse_bind: bool,
}

impl FakePlayer {
    pub fn playing(title: &str, art_url: &str) -> Self {
        Self {
            status: "Playing".into(),
            title: title.into(),
            artists: vec!["Boards of Canada".into()],
            art_url: art_url.into(),
            length_us: 185_000_000,
            position_us: 75_000_000,
            read_error: None,
            control_error: None,
            refuse_bind: false,
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.into();
        self
    }
}

#[derive(Default)]
struct FakeState {
    players: BTreeMap<String, FakePlayer>,
    extra_names: Vec<String>,
    calls: Vec<String>,
}

/// In-memory session bus. Clones share state so a test can keep a handle
/// after moving one into the controller.
#[derive(Clone, Default)]
pub struct FakeBus {
    state: Arc<Mutex<FakeState>>,
}

impl FakeBus {
    pub fn with_player(self, short: &str, player: FakePlayer) -> Self {
        self.insert(short, player);
        self
    }

    pub fn insert(&self, short: &str, player: FakePlayer) {
        self.state.lock().unwrap().players.insert(service(short), player);
    }

    pub fn remove(&self, short: &str) {
        self.state.lock().unwrap().players.remove(&service(short));
    }

    pub fn add_unrelated_name(&self, name: &str) {
        self.state.lock().unwrap().extra_names.push(name.into());
    }

    pub fn update(&self, short: &str, change: impl FnOnce(&mut FakePlayer)) {
        let mut state = self.state.lock().unwrap();
        let player = state.players.get_mut(&service(short)).expect("player");
        change(player);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn count_calls(&self, needle: &str) -> usize {
        self.calls().iter().filter(|call| call.ends_with(needle)).count()
    }
}

impl MediaBus for FakeBus {
    fn list_service_names(&self) -> Result<Vec<String>, BusError> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.extra_names.clone();
        names.extend(state.players.keys().cloned());
        Ok(names)
    }

    fn get_property(
        &self,
        service: &str,
        interface: &str,
        property: &str,
    ) -> Result<BusValue, BusError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("get {service} {property}"));
        assert_eq!(interface, PLAYER_INTERFACE);

        let player = state
            .players
            .get(service)
            .ok_or_else(|| BusError::NoActivePlayer(service.to_owned()))?;
        if let Some(err) = &player.read_error {
            return Err(err.clone());
        }

        match property {
            "PlaybackStatus" => Ok(BusValue::Str(player.status.clone())),
            "Position" => Ok(BusValue::Int(player.position_us)),
            "Metadata" => {
                let mut map = HashMap::new();
                map.insert("xesam:title".to_owned(), BusValue::Str(player.title.clone()));
                map.insert(
                    "xesam:artist".to_owned(),
                    BusValue::List(player.artists.iter().cloned().map(BusValue::Str).collect()),
                );
                if !player.art_url.is_empty() {
                    map.insert("mpris:artUrl".to_owned(), BusValue::Str(player.art_url.clone()));
                }
                map.insert("mpris:length".to_owned(), BusValue::Int(player.length_us));
                Ok(BusValue::Map(map))
            }
            other => Err(BusError::Transport(format!("unknown property {other}"))),
        }
    }

    fn invoke_method(
        &self,
        service: &str,
        interface: &str,
        method: &str,
    ) -> Result<(), BusError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("call {service} {method}"));

        let player = state
            .players
            .get_mut(service)
            .ok_or_else(|| BusError::NoActivePlayer(service.to_owned()))?;

        if interface == PEER_INTERFACE {
            return if player.refuse_bind {
                Err(BusError::Transport("bind refused".into()))
            } else {
                Ok(())
            };
        }

        if let Some(err) = &player.control_error {
            return Err(err.clone());
        }
        if method == "PlayPause" {
            player.status = if player.status == "Playing" {
                "Paused".into()
            } else {
                "Playing".into()
            };
        }
        Ok(())
    }
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([30, 144, 255]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// Serves a generated PNG for every reference and counts fetches.
/// References containing `broken` return undecodable bytes.
#[derive(Clone, Default)]
pub struct CountingFetcher {
    fetched: Arc<Mutex<Vec<String>>>,
    calls: Arc<AtomicUsize>,
}

impl CountingFetcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl ArtworkFetcher for CountingFetcher {
    fn fetch(&self, reference: &ArtReference) -> Result<Vec<u8>, ArtworkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let label = match reference {
            ArtReference::Local(path) => path.display().to_string(),
            ArtReference::Remote(url) => url.clone(),
        };
        let broken = label.contains("broken");
        self.fetched.lock().unwrap().push(label);
        if broken {
            Ok(vec![0xde, 0xad, 0xbe, 0xef])
        } else {
            Ok(png_bytes(32, 32))
        }
    }
}
