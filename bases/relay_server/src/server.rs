// bases/relay_server/src/server.rs
use crate::config::Config;
use crate::error::ServerError;
use crate::relay::{Relay, RelaySettings};
use async_stream::stream;
use futures::Stream;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use broadcast_hub::HubError;
use command_dispatch::DispatchError;
use device_transport::TcpTransport;
use playlist_store::{Playlist, PlaylistError, PlaylistStore};
use relay_protocol::{CommandRequest, PlaybackState};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    relay: Relay,
    /// Cancelled when the process is shutting down; ends open event streams
    shutdown: CancellationToken,
}

impl AppState {
    pub fn new(relay: Relay, shutdown: CancellationToken) -> Self {
        Self { relay, shutdown }
    }
}

#[derive(Debug, Deserialize)]
struct PlayRequest {
    playlist_index: usize,
    movie_index: usize,
}

/// Run the relay until Ctrl-C
pub async fn run(config: Config) -> Result<(), ServerError> {
    if !config.serve_dir.is_dir() {
        warn!(
            "Static directory {} does not exist, only the API will be served",
            config.serve_dir.display()
        );
    }

    let playlists = Arc::new(PlaylistStore::load(&config.playlist_file).await?);
    info!(
        "Loaded {} playlists from {}",
        playlists.playlists().len(),
        playlists.path().display()
    );

    let transport = TcpTransport::new(config.player_address.clone())
        .with_connect_timeout(config.connect_timeout);
    let (relay, tasks) = Relay::start(transport, playlists, RelaySettings::from(&config));

    let shutdown = CancellationToken::new();
    let app = router(AppState::new(relay.clone(), shutdown.clone()), &config.serve_dir);

    let address = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;

    info!("Relay listening on http://{}", address);
    info!("   Player at {}", config.player_address);
    info!("   Serving {}", config.serve_dir.display());

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await;

    relay.shutdown(tasks).await;
    info!("Relay stopped");

    served.map_err(ServerError::Serve)
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Cannot listen for Ctrl-C, running until killed: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
    shutdown.cancel();
}

pub fn router(state: AppState, serve_dir: &Path) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/cmd", post(submit_command).options(preflight))
        .route("/events", get(events))
        .route("/state", get(playback_state))
        .route("/playlists", get(list_playlists).post(replace_playlists))
        .route("/play", post(play))
        .fallback_service(ServeDir::new(serve_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Plain `OPTIONS` without CORS request headers; real preflights are
/// answered by the CORS layer.
async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Queue a command for the player. Answers as soon as it is queued; the
/// outcome arrives later as a `commandACK` event.
async fn submit_command(
    State(state): State<AppState>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<bool>, AppError> {
    let id = state.relay.dispatcher.admit(request).await?;
    debug!("Queued command {}", id);
    Ok(Json(true))
}

async fn events(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let mut subscription = state.relay.hub.join().await?;
    let shutdown = state.shutdown.clone();
    info!("Event stream {} opened", subscription.id());

    let stream = stream! {
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => None,
                message = subscription.recv() => message,
            };
            let Some(message) = message else { break };
            let event = Event::default().event(message.event()).data(message.data());
            yield Ok::<_, axum::Error>(event);
        }
        info!("Event stream {} closed", subscription.id());
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn playback_state(State(state): State<AppState>) -> Json<PlaybackState> {
    Json(state.relay.poller.get_state())
}

async fn list_playlists(State(state): State<AppState>) -> Json<Vec<Playlist>> {
    Json(state.relay.playlists.playlists())
}

async fn replace_playlists(
    State(state): State<AppState>,
    Json(playlists): Json<Vec<Playlist>>,
) -> Json<bool> {
    info!("Replacing playlists, {} received", playlists.len());
    state.relay.playlists.replace(playlists);
    state.relay.saves.try_signal();
    Json(true)
}

/// Start a movie from a playlist and remember which one it was
async fn play(
    State(state): State<AppState>,
    Json(request): Json<PlayRequest>,
) -> Result<Json<bool>, AppError> {
    let movie = state
        .relay
        .playlists
        .movie(request.playlist_index, request.movie_index)
        .map_err(|e| {
            warn!("Cannot play: {}", e);
            e
        })?;

    state.relay.poller.update_state(|current| {
        current.playlist_index = request.playlist_index as i64;
        current.movie_index = request.movie_index as i64;
    });

    let id = state
        .relay
        .dispatcher
        .admit(CommandRequest::new("play", vec![Value::String(movie.path.clone())]))
        .await?;
    info!("Playing {} as command {}", movie.path, id);

    Ok(Json(true))
}

/// Application-level errors for HTTP handlers
#[derive(Debug)]
enum AppError {
    Dispatch(DispatchError),
    Playlist(PlaylistError),
    Hub(HubError),
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        AppError::Dispatch(err)
    }
}

impl From<PlaylistError> for AppError {
    fn from(err: PlaylistError) -> Self {
        AppError::Playlist(err)
    }
}

impl From<HubError> for AppError {
    fn from(err: HubError) -> Self {
        AppError::Hub(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Dispatch(err @ DispatchError::Rejected(_)) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            AppError::Dispatch(err @ DispatchError::WorkerGone) => {
                (StatusCode::SERVICE_UNAVAILABLE, err.to_string())
            }
            AppError::Playlist(err @ PlaylistError::IndexOutOfRange { .. }) => {
                (StatusCode::NOT_FOUND, err.to_string())
            }
            AppError::Playlist(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            AppError::Hub(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::RelayTasks;
    use async_trait::async_trait;
    use broadcast_hub::HubConfig;
    use command_dispatch::DispatcherConfig;
    use device_transport::Transport;
    use playlist_store::Movie;
    use relay_protocol::{Ack, Command, STATE_QUERY};
    use rstest::rstest;
    use state_poller::PollerConfig;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    /// Accepts everything and reports each line it was sent
    struct RecordingPlayer {
        lines: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Transport for RecordingPlayer {
        async fn send(&self, command: &Command, _deadline: Duration) -> Ack {
            if command.name() == STATE_QUERY {
                return Ack::delivered(command.clone(), r#"{"playing": false}"#);
            }
            let _ = self.lines.send(command.to_line());
            Ack::delivered(command.clone(), "ok")
        }
    }

    struct Harness {
        state: AppState,
        lines: mpsc::UnboundedReceiver<String>,
        _tasks: RelayTasks,
    }

    fn start() -> Harness {
        let (lines_tx, lines) = mpsc::unbounded_channel();
        let store = Arc::new(PlaylistStore::empty("unused.json"));
        store.replace(vec![Playlist {
            name: "afternoon".to_string(),
            movies: vec![Movie::new("/movies/one.mp4"), Movie::new("/movies/two.mp4")],
        }]);

        let settings = RelaySettings {
            dispatcher: DispatcherConfig::default(),
            poller: PollerConfig {
                interval: Duration::from_secs(3600),
                query_deadline: Duration::from_millis(50),
            },
            hub: HubConfig::default(),
            save_cooldown: Duration::from_secs(3600),
        };
        let (relay, tasks) = Relay::start(RecordingPlayer { lines: lines_tx }, store, settings);

        Harness {
            state: AppState::new(relay, CancellationToken::new()),
            lines,
            _tasks: tasks,
        }
    }

    async fn next_line(lines: &mut mpsc::UnboundedReceiver<String>) -> String {
        timeout(Duration::from_secs(5), lines.recv())
            .await
            .expect("command reached the player")
            .expect("player running")
    }

    fn request(cmd: &str, arg: Vec<Value>) -> Json<CommandRequest> {
        Json(CommandRequest::new(cmd, arg))
    }

    #[tokio::test]
    async fn command_is_queued_and_sent() {
        let mut harness = start();

        let Json(accepted) = submit_command(
            State(harness.state.clone()),
            request("volume", vec![json!(0.4)]),
        )
        .await
        .unwrap();

        assert!(accepted);
        assert_eq!(next_line(&mut harness.lines).await, "volume 0.4");
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[tokio::test]
    async fn blank_command_is_bad_request(#[case] cmd: &str) {
        let harness = start();

        let err = submit_command(State(harness.state.clone()), request(cmd, vec![]))
            .await
            .unwrap_err();

        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn play_selects_and_starts_movie() {
        let mut harness = start();

        let Json(accepted) = play(
            State(harness.state.clone()),
            Json(PlayRequest {
                playlist_index: 0,
                movie_index: 1,
            }),
        )
        .await
        .unwrap();

        assert!(accepted);
        assert_eq!(next_line(&mut harness.lines).await, "play /movies/two.mp4");
        let Json(current) = playback_state(State(harness.state.clone())).await;
        assert_eq!(current.playlist_index, 0);
        assert_eq!(current.movie_index, 1);
    }

    #[rstest]
    #[case(0, 2)]
    #[case(1, 0)]
    #[tokio::test]
    async fn play_out_of_range_is_not_found(
        #[case] playlist_index: usize,
        #[case] movie_index: usize,
    ) {
        let mut harness = start();

        let err = play(
            State(harness.state.clone()),
            Json(PlayRequest {
                playlist_index,
                movie_index,
            }),
        )
        .await
        .unwrap_err();

        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
        assert!(harness.lines.try_recv().is_err());
        let current = harness.state.relay.poller.get_state();
        assert_eq!(current.movie_index, relay_protocol::NO_SELECTION);
    }

    #[tokio::test]
    async fn replaced_playlists_are_listed() {
        let harness = start();
        let replacement = vec![Playlist {
            name: "night".to_string(),
            movies: vec![Movie::new("/movies/owl.mp4")],
        }];

        let Json(accepted) =
            replace_playlists(State(harness.state.clone()), Json(replacement.clone())).await;
        let Json(listed) = list_playlists(State(harness.state.clone())).await;

        assert!(accepted);
        assert_eq!(listed, replacement);
    }

    #[test]
    fn errors_map_to_status_codes() {
        let cases = [
            (AppError::from(DispatchError::WorkerGone), StatusCode::SERVICE_UNAVAILABLE),
            (AppError::from(HubError::Closed), StatusCode::SERVICE_UNAVAILABLE),
            (
                AppError::from(PlaylistError::IndexOutOfRange { playlist: 3, movie: 0 }),
                StatusCode::NOT_FOUND,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    /// Serve the router on a loopback port
    async fn serve(state: AppState, serve_dir: &Path) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let app = router(state, serve_dir);
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        address
    }

    /// Read from `stream` until `needle` shows up, returning everything read
    async fn read_until(stream: &mut TcpStream, needle: &str) -> String {
        let mut seen = String::new();
        let mut buffer = [0u8; 1024];
        timeout(Duration::from_secs(5), async {
            while !seen.contains(needle) {
                let read = stream.read(&mut buffer).await.unwrap();
                assert!(read > 0, "connection closed before {:?} arrived", needle);
                seen.push_str(&String::from_utf8_lossy(&buffer[..read]));
            }
        })
        .await
        .expect("expected text in time");
        seen
    }

    #[tokio::test]
    async fn event_stream_carries_command_acks() {
        let harness = start();
        let dir = TempDir::new().unwrap();
        let address = serve(harness.state.clone(), dir.path()).await;

        let mut client = TcpStream::connect(&address).await.unwrap();
        client
            .write_all(b"GET /events HTTP/1.1\r\nHost: relay\r\n\r\n")
            .await
            .unwrap();
        let head = read_until(&mut client, "\r\n\r\n").await;
        assert!(head.contains("text/event-stream"));

        submit_command(State(harness.state.clone()), request("pause", vec![]))
            .await
            .unwrap();

        let body = read_until(&mut client, r#""cmd":"pause""#).await;
        assert!(body.contains("event: commandACK"));
    }

    #[tokio::test]
    async fn event_stream_ends_on_shutdown() {
        let harness = start();
        let dir = TempDir::new().unwrap();
        let address = serve(harness.state.clone(), dir.path()).await;

        let mut client = TcpStream::connect(&address).await.unwrap();
        client
            .write_all(b"GET /events HTTP/1.1\r\nHost: relay\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        read_until(&mut client, "\r\n\r\n").await;
        timeout(Duration::from_secs(5), async {
            while harness.state.relay.hub.subscriber_count() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("stream registered");

        harness.state.shutdown.cancel();

        timeout(Duration::from_secs(5), async {
            while harness.state.relay.hub.subscriber_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("stream deregistered");
    }

    #[tokio::test]
    async fn cors_preflight_is_answered() {
        let harness = start();
        let dir = TempDir::new().unwrap();
        let address = serve(harness.state.clone(), dir.path()).await;

        let mut client = TcpStream::connect(&address).await.unwrap();
        client
            .write_all(
                b"OPTIONS /cmd HTTP/1.1\r\nHost: relay\r\nOrigin: http://panel.local\r\n\
                  Access-Control-Request-Method: POST\r\n\
                  Access-Control-Request-Headers: content-type\r\nConnection: close\r\n\r\n",
            )
            .await
            .unwrap();

        let head = read_until(&mut client, "\r\n\r\n").await.to_lowercase();
        assert!(head.starts_with("http/1.1 200"));
        assert!(head.contains("access-control-allow-origin: *"));
        assert!(head.contains("content-type"));
    }

    #[tokio::test]
    async fn static_files_are_served() {
        let harness = start();
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>relay</h1>").unwrap();
        let address = serve(harness.state.clone(), dir.path()).await;

        let mut client = TcpStream::connect(&address).await.unwrap();
        client
            .write_all(b"GET /index.html HTTP/1.1\r\nHost: relay\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let response = read_until(&mut client, "<h1>relay</h1>").await;
        assert!(response.starts_with("HTTP/1.1 200"));
    }
}
