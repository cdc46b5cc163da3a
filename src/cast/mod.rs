//! Remote playback on cast-capable devices

pub mod controller;
pub mod models;
pub mod transport;

pub use controller::{ConnectionTransition, RemoteEventSink, RemoteSessionController, RemoteUpdate};
pub use models::{
    start_offset_from_url, strip_fragment, with_start_fragment, ConnectionState, LoadMediaOptions,
    LoadRequest, RemoteConnection,
};
pub use transport::{
    CastError, CastSession, CastSessionEvent, CastTransport, ListenerId, RemotePlayer,
    RemotePlayerEvent, RemotePlayerEventKind, RemotePlayerListener, SessionState,
    UnavailableTransport,
};
