pub mod store;

use std::env;
use std::net::SocketAddr;
use anyhow::Context;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Extension, Router};
use rivals_common::paths::PathError;
use crate::store::Store;

pub const DB_PATH_VAR: &str = "RIVALS_DB_PATH";

pub type Result<T> = std::result::Result<T, AppError>;

pub struct AppError(anyhow::Error);

// Bad paths are the caller's fault; everything else is ours.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<PathError>().is_some() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        tracing::warn!(%status, "request failed: {:#}", self.0);
        (status, format!("Something went wrong: {:#}", self.0)).into_response()
    }
}

// This enables using `?` on functions that return `Result<_, anyhow::Error>` to turn them into
// `Result<_, AppError>`.
impl<E> From<E> for AppError
    where
        E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Clone)]
pub struct State {
    store: Store,
}
impl State {
    pub fn open(db_path: &str) -> anyhow::Result<Self> {
        Ok(Self { store: Store::open(db_path)? })
    }
    pub fn temporary() -> anyhow::Result<Self> {
        Ok(Self { store: Store::temporary()? })
    }
    pub fn store(&self) -> &Store {
        &self.store
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerConfig {
    pub port: u16,
    pub db_path: String,
}
impl ServerConfig {
    /// Port from the first argument, database directory from the environment.
    pub fn from_args_and_env(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut port = 8000;
        if let Some(p) = args.nth(1) {
            port = p.parse().with_context(|| format!("`{p}` is not a port"))?;
        }
        let db_path = env::var(DB_PATH_VAR).unwrap_or_else(|_| String::from("sled") + &port.to_string());
        Ok(Self { port, db_path })
    }
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], self.port))
    }
}

pub fn router(state: State) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/db", get(db::read_root).post(db::update))
        .route("/db/*path", get(db::read).delete(db::delete))
        .route("/push/*parent", post(db::push))
        .route("/blobs/*path", put(blobs::put_blob).get(blobs::get_blob).delete(blobs::delete_blob))
        .route("/scores", post(users::scores))
        .route("/notify/:user", post(users::notify))
        .layer(Extension(state))
}

async fn root() -> &'static str {
    "rivals"
}

mod db {
    use axum::extract::Path;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use rivals_common::ChildUpdates;
    use tracing::info;
    use crate::{Result, State};

    pub async fn read_root(Extension(state): Extension<State>) -> Result<impl IntoResponse> {
        Ok(Json(state.store.read("")?))
    }
    pub async fn read(Extension(state): Extension<State>, Path(path): Path<String>) -> Result<impl IntoResponse> {
        Ok(Json(state.store.read(&path)?))
    }
    pub async fn update(Extension(state): Extension<State>, Json(updates): Json<ChildUpdates>) -> Result<impl IntoResponse> {
        info!(paths = ?updates.keys().collect::<Vec<_>>(), "update");
        state.store.update(updates)?;
        Ok(())
    }
    pub async fn delete(Extension(state): Extension<State>, Path(path): Path<String>) -> Result<impl IntoResponse> {
        info!(%path, "delete");
        state.store.delete(&path)?;
        Ok(())
    }
    pub async fn push(Extension(state): Extension<State>, Path(parent): Path<String>) -> Result<impl IntoResponse> {
        Ok(Json(state.store.allocate_id(&parent)?))
    }
}

mod blobs {
    use axum::body::Bytes;
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Extension;
    use tracing::info;
    use crate::{Result, State};

    pub async fn put_blob(Extension(state): Extension<State>, Path(path): Path<String>, body: Bytes) -> Result<impl IntoResponse> {
        info!(%path, bytes = body.len(), "store blob");
        state.store.put_blob(&path, &body)?;
        Ok(())
    }
    pub async fn get_blob(Extension(state): Extension<State>, Path(path): Path<String>) -> Result<Response> {
        Ok(match state.store.blob(&path)? {
            Some(bytes) => bytes.into_response(),
            None => StatusCode::NOT_FOUND.into_response(),
        })
    }
    pub async fn delete_blob(Extension(state): Extension<State>, Path(path): Path<String>) -> Result<impl IntoResponse> {
        info!(%path, "delete blob");
        state.store.delete_blob(&path)?;
        Ok(())
    }
}

mod users {
    use axum::extract::Path;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use rivals_common::Notification;
    use tracing::debug;
    use crate::{Result, State};

    pub async fn scores(Extension(state): Extension<State>, Json(ids): Json<Vec<String>>) -> Result<impl IntoResponse> {
        debug!(ids = ids.len(), "score lookup");
        Ok(Json(state.store.scores(&ids)?))
    }
    pub async fn notify(
        Extension(state): Extension<State>,
        Path(user): Path<String>,
        Json(notification): Json<Notification>,
    ) -> Result<impl IntoResponse> {
        let key = state.store.notify(&user, &notification)?;
        debug!(%user, %key, "queued notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_comes_from_first_argument() {
        let config = ServerConfig::from_args_and_env(["rivals-server".to_string(), "9000".to_string()].into_iter()).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.addr().port(), 9000);
        assert!(ServerConfig::from_args_and_env(["rivals-server".to_string(), "x".to_string()].into_iter()).is_err());
    }

    #[test]
    fn default_port() {
        let config = ServerConfig::from_args_and_env(std::iter::once("rivals-server".to_string())).unwrap();
        assert_eq!(config.port, 8000);
    }
}
