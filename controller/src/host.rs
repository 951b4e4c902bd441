use std::{io::ErrorKind, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::Serialize;
use tokio::{
    net::TcpListener,
    sync::{Mutex, Notify},
};
use tracing::{info, warn};

use sprinkler_common::{
    RuntimeConfig, WeatherConfig, WeatherSync, TOPIC_CMD_WEATHER_CHECK, TOPIC_CONTROLLER_STATUS,
    TOPIC_WEATHER_STATE,
};

use crate::{
    transport::TcpTransport,
    weather::{run_weather_check, RuntimeSink, SprinklerController},
};

type Controller = SprinklerController<FileStore>;

#[derive(Clone)]
struct AppState {
    controller: Arc<Mutex<Controller>>,
    check_requested: Arc<Notify>,
    mqtt: AsyncClient,
}

#[derive(Clone)]
struct FileStore {
    runtime_path: Arc<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = FileStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.sanitize();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.network.mqtt_host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.network.mqtt_port);

    let mut mqtt_options = MqttOptions::new("sprinkler-controller-rust", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.network.mqtt_user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.network.mqtt_pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);

    info!(
        "weather checks every {}s against `{}`",
        runtime.weather.check_interval_secs, runtime.weather.host
    );
    let controller = SprinklerController::new(runtime, store)
        .with_host_override(std::env::var("WEATHER_HOST").ok());

    let app_state = AppState {
        controller: Arc::new(Mutex::new(controller)),
        check_requested: Arc::new(Notify::new()),
        mqtt,
    };

    mqtt_subscribe(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_weather_loop(app_state.clone(), WeatherSync::default());

    let app = Router::new()
        .route("/api/weather", get(handle_get_weather))
        .route("/api/weather/check", post(handle_post_check))
        .route(
            "/api/weather/config",
            get(handle_get_weather_config).put(handle_put_weather_config),
        )
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn mqtt_subscribe(mqtt: &AsyncClient) -> anyhow::Result<()> {
    mqtt.subscribe(TOPIC_CMD_WEATHER_CHECK, QoS::AtMostOnce).await?;
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if message.payload.len() > MAX_MQTT_PAYLOAD_BYTES {
                        warn!(
                            "dropping oversized MQTT payload on topic {} ({} bytes)",
                            message.topic,
                            message.payload.len()
                        );
                        continue;
                    }
                    if message.topic == TOPIC_CMD_WEATHER_CHECK {
                        info!("weather check requested over mqtt");
                        app_state.check_requested.notify_one();
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_CONTROLLER_STATUS, QoS::AtLeastOnce, true, "online")
                        .await
                    {
                        warn!("controller status publish failed: {err}");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_weather_loop(app_state: AppState, mut sync: WeatherSync) {
    tokio::spawn(async move {
        loop {
            let controller = app_state.controller.clone();
            let joined = tokio::task::spawn_blocking(move || {
                let mut controller = controller.blocking_lock();
                run_weather_check(
                    &mut sync,
                    &mut TcpTransport,
                    &mut *controller,
                    Utc::now().timestamp(),
                );
                sync
            })
            .await;

            sync = match joined {
                Ok(sync) => sync,
                Err(err) => {
                    warn!("weather check task failed: {err}");
                    WeatherSync::default()
                }
            };

            publish_weather_state(&app_state).await;

            let interval = {
                let controller = app_state.controller.lock().await;
                Duration::from_secs(controller.weather().check_interval_secs)
            };
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = app_state.check_requested.notified() => {}
            }
        }
    });
}

async fn publish_weather_state(app_state: &AppState) {
    let payload = {
        let controller = app_state.controller.lock().await;
        let local_now = controller.local_now(Utc::now().timestamp());
        serde_json::to_vec(&controller.status(local_now))
    };

    match payload {
        Ok(body) => {
            if let Err(err) = app_state
                .mqtt
                .publish(TOPIC_WEATHER_STATE, QoS::AtLeastOnce, true, body)
                .await
            {
                warn!("weather state publish failed: {err}");
            }
        }
        Err(err) => warn!("weather state serialization failed: {err}"),
    }
}

async fn handle_get_weather(State(state): State<AppState>) -> impl IntoResponse {
    let controller = state.controller.lock().await;
    let local_now = controller.local_now(Utc::now().timestamp());
    Json(controller.status(local_now))
}

async fn handle_post_check(State(state): State<AppState>) -> impl IntoResponse {
    state.check_requested.notify_one();
    (StatusCode::ACCEPTED, handle_get_weather(State(state)).await).into_response()
}

async fn handle_get_weather_config(State(state): State<AppState>) -> impl IntoResponse {
    let controller = state.controller.lock().await;
    Json(controller.weather().clone())
}

async fn handle_put_weather_config(
    State(state): State<AppState>,
    Json(mut update): Json<WeatherConfig>,
) -> impl IntoResponse {
    update.sanitize();
    let firmware_version = state.controller.lock().await.runtime().firmware_version;
    if let Err(err) = update.validate(firmware_version) {
        return error_response(StatusCode::BAD_REQUEST, &err.to_string());
    }

    let controller = state.controller.clone();
    let saved = tokio::task::spawn_blocking(move || {
        controller.blocking_lock().replace_weather(update)
    })
    .await;

    match saved {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            warn!("failed to persist weather config update: {err:#}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist weather settings",
            );
        }
        Err(err) => {
            warn!("weather config update task failed: {err}");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to persist weather settings",
            );
        }
    }

    state.check_requested.notify_one();
    handle_get_weather_config(State(state)).await.into_response()
}

impl FileStore {
    fn new() -> Self {
        let data_dir = std::env::var("SPRINKLER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.sprinkler"));

        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }
}

impl RuntimeSink for FileStore {
    // Only ever called with the controller locked on a blocking thread.
    fn save(&mut self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let path = self.runtime_path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        std::fs::write(path, payload)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
