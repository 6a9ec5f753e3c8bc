use std::fmt;

use log::{debug, info, warn};

use crate::bus::{BusError, BusValue, MediaBus, MPRIS_PREFIX, PEER_INTERFACE, PLAYER_INTERFACE};

const MICROS_PER_SECOND: f64 = 1_000_000.0;

const KEY_TITLE: &str = "xesam:title";
const KEY_ARTIST: &str = "xesam:artist";
const KEY_ART_URL: &str = "mpris:artUrl";
const KEY_LENGTH: &str = "mpris:length";

/// Bus name of one discovered player.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerHandle(String);

impl PlayerHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Name without the MPRIS prefix, e.g. `spotify` or `firefox.instance_1_42`.
    pub fn short_name(&self) -> &str {
        self.0.strip_prefix(MPRIS_PREFIX).unwrap_or(&self.0)
    }
}

impl fmt::Display for PlayerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl PlaybackStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Playing" => Some(PlaybackStatus::Playing),
            "Paused" => Some(PlaybackStatus::Paused),
            "Stopped" => Some(PlaybackStatus::Stopped),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub art_ref: String,
    pub duration_seconds: f64,
}

impl TrackMetadata {
    /// Maps an MPRIS `Metadata` dictionary; missing or mistyped keys become empty values.
    pub fn from_bus(value: &BusValue) -> Self {
        let Some(map) = value.as_map() else {
            return Self::default();
        };

        let text = |key: &str| {
            map.get(key)
                .and_then(BusValue::as_str)
                .unwrap_or_default()
                .to_owned()
        };

        Self {
            title: text(KEY_TITLE),
            artist: map
                .get(KEY_ARTIST)
                .map(|artists| artists.string_list().join(", "))
                .unwrap_or_default(),
            art_ref: text(KEY_ART_URL),
            duration_seconds: map
                .get(KEY_LENGTH)
                .and_then(BusValue::as_f64)
                .map(micros_to_seconds)
                .unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PlaybackSnapshot {
    pub status: PlaybackStatus,
    pub position_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub current_handle: Option<PlayerHandle>,
    pub connected: bool,
    pub last_art_ref: Option<String>,
}

/// Ranking bucket used when choosing among candidates. Lower sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CandidateRank {
    Playing,
    Paused,
    Idle,
    Unreachable,
}

impl CandidateRank {
    fn from_probe(probe: &Result<BusValue, BusError>) -> Self {
        match probe {
            Ok(value) => match value.as_str().and_then(PlaybackStatus::parse) {
                Some(PlaybackStatus::Playing) => CandidateRank::Playing,
                Some(PlaybackStatus::Paused) => CandidateRank::Paused,
                _ => CandidateRank::Idle,
            },
            Err(_) => CandidateRank::Unreachable,
        }
    }
}

/// Discovers MPRIS players, keeps one of them connected and reads it.
///
/// Every read or control call has a defined fallback value and never returns
/// an error; transport failures only ever move the session back to idle.
pub struct SessionManager<B> {
    bus: B,
    prefix: String,
    state: SessionState,
}

impl<B: MediaBus> SessionManager<B> {
    pub fn new(bus: B) -> Self {
        Self::with_prefix(bus, MPRIS_PREFIX)
    }

    pub fn with_prefix(bus: B, prefix: impl Into<String>) -> Self {
        Self {
            bus,
            prefix: prefix.into(),
            state: SessionState::default(),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected
    }

    pub fn current_handle(&self) -> Option<&PlayerHandle> {
        self.state.current_handle.as_ref()
    }

    /// Every service on the bus whose name starts with the configured prefix.
    pub fn list_candidates(&self) -> Vec<PlayerHandle> {
        match self.bus.list_service_names() {
            Ok(names) => names
                .into_iter()
                .filter(|name| name.starts_with(&self.prefix))
                .map(PlayerHandle::new)
                .collect(),
            Err(err) => {
                warn!("Failed to list bus services: {err}");
                Vec::new()
            }
        }
    }

    /// Orders candidates playing, paused, idle, unreachable; ties by name.
    pub fn prioritize(&self, candidates: Vec<PlayerHandle>) -> Vec<PlayerHandle> {
        let mut ranked: Vec<(CandidateRank, PlayerHandle)> = candidates
            .into_iter()
            .map(|handle| {
                let probe =
                    self.bus
                        .get_property(handle.name(), PLAYER_INTERFACE, "PlaybackStatus");
                let rank = CandidateRank::from_probe(&probe);
                debug!("Candidate {handle} ranked {rank:?}");
                (rank, handle)
            })
            .collect();
        ranked.sort();
        ranked.into_iter().map(|(_, handle)| handle).collect()
    }

    pub fn connect(&mut self, handle: PlayerHandle) -> bool {
        match self.bus.invoke_method(handle.name(), PEER_INTERFACE, "Ping") {
            Ok(()) => {
                info!("Connected to {handle}");
                self.state.current_handle = Some(handle);
                self.state.connected = true;
                self.state.last_art_ref = None;
                true
            }
            Err(err) => {
                warn!("Failed to connect to {handle}: {err}");
                false
            }
        }
    }

    /// Drops the current session and connects to the best available player.
    pub fn connect_any(&mut self) -> bool {
        self.disconnect();
        let candidates = self.prioritize(self.list_candidates());
        for handle in candidates {
            if self.connect(handle) {
                return true;
            }
        }
        false
    }

    pub fn disconnect(&mut self) {
        if let Some(handle) = self.state.current_handle.take() {
            info!("Disconnected from {handle}");
        }
        self.state.connected = false;
    }

    /// Current metadata, or `None` if not connected or the read failed.
    ///
    /// A "no active player" failure also drops the session; any other
    /// failure leaves it connected.
    pub fn try_metadata(&mut self) -> Option<TrackMetadata> {
        let value = self.read_property("Metadata")?;
        Some(TrackMetadata::from_bus(&value))
    }

    /// Current metadata; all fields empty when unavailable.
    pub fn metadata(&mut self) -> TrackMetadata {
        self.try_metadata().unwrap_or_default()
    }

    /// Elapsed seconds; `0.0` when unavailable.
    pub fn position(&mut self) -> f64 {
        self.read_property("Position")
            .and_then(|value| value.as_f64())
            .map(micros_to_seconds)
            .unwrap_or(0.0)
    }

    /// Playback status; `Stopped` when unavailable.
    pub fn status(&mut self) -> PlaybackStatus {
        self.read_property("PlaybackStatus")
            .and_then(|value| value.as_str().and_then(PlaybackStatus::parse))
            .unwrap_or_default()
    }

    pub fn playback(&mut self) -> PlaybackSnapshot {
        PlaybackSnapshot {
            status: self.status(),
            position_seconds: self.position(),
        }
    }

    pub fn play_pause(&mut self) {
        self.control("PlayPause");
    }

    pub fn next(&mut self) {
        self.control("Next");
    }

    pub fn previous(&mut self) {
        self.control("Previous");
    }

    /// Records `art_ref` as the last resolved reference. Returns `true` when it
    /// differs from the previous one, i.e. when artwork must be resolved again.
    pub fn record_art_ref(&mut self, art_ref: &str) -> bool {
        if self.state.last_art_ref.as_deref() == Some(art_ref) {
            return false;
        }
        self.state.last_art_ref = Some(art_ref.to_owned());
        true
    }

    pub fn forget_art_ref(&mut self) {
        self.state.last_art_ref = None;
    }

    fn connected_handle(&self) -> Option<PlayerHandle> {
        if self.state.connected {
            self.state.current_handle.clone()
        } else {
            None
        }
    }

    fn read_property(&mut self, property: &str) -> Option<BusValue> {
        let handle = self.connected_handle()?;
        match self
            .bus
            .get_property(handle.name(), PLAYER_INTERFACE, property)
        {
            Ok(value) => Some(value),
            Err(err) if err.is_no_active_player() => {
                info!("{handle} went away while reading {property}: {err}");
                self.disconnect();
                None
            }
            Err(err) => {
                warn!("Reading {property} from {handle} failed: {err}");
                None
            }
        }
    }

    fn control(&mut self, method: &str) {
        let Some(handle) = self.connected_handle() else {
            debug!("Ignoring {method}: no player connected");
            return;
        };
        if let Err(err) = self.bus.invoke_method(handle.name(), PLAYER_INTERFACE, method) {
            warn!("{method} on {handle} failed: {err}");
            self.disconnect();
        }
    }
}

fn micros_to_seconds(micros: f64) -> f64 {
    (micros / MICROS_PER_SECOND).max(0.0)
}
