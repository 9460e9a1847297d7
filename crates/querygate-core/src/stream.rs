//! # Streaming Events
//!
//! Incremental rendering of a pipeline run for clients that want progress
//! as it happens. A run produces:
//!
//! ```text
//! step*  (sql row_count content* [results_start results_batch* results_end] | error)  [DONE]
//! ```
//!
//! Events are transport-agnostic; [`StreamEvent::to_sse`] renders one as a
//! server-sent-events frame.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::execute::Row;
use crate::pipeline::{QueryRequest, QueryResponse, QueryService, SqlGenerator, Stage};

/// Characters per `content` event.
pub const CONTENT_CHUNK_CHARS: usize = 100;

/// Rows per `results_batch` event.
pub const RESULTS_BATCH_ROWS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Step(String),
    Sql(String),
    RowCount(usize),
    Content(String),
    ResultsStart,
    ResultsBatch { batch_index: usize, rows: Vec<Row> },
    ResultsEnd,
    Error(String),
    /// End-of-stream sentinel; not a JSON object.
    Done,
}

impl Serialize for StreamEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if matches!(self, StreamEvent::ResultsBatch { .. }) {
            2
        } else {
            1
        };
        let mut map = serializer.serialize_map(Some(len))?;
        match self {
            StreamEvent::Step(text) => map.serialize_entry("step", text)?,
            StreamEvent::Sql(sql) => map.serialize_entry("sql", sql)?,
            StreamEvent::RowCount(n) => map.serialize_entry("row_count", n)?,
            StreamEvent::Content(chunk) => map.serialize_entry("content", chunk)?,
            StreamEvent::ResultsStart => map.serialize_entry("results_start", &true)?,
            StreamEvent::ResultsBatch { batch_index, rows } => {
                map.serialize_entry("results_batch", rows)?;
                map.serialize_entry("batch_index", batch_index)?;
            }
            StreamEvent::ResultsEnd => map.serialize_entry("results_end", &true)?,
            StreamEvent::Error(message) => map.serialize_entry("error", message)?,
            StreamEvent::Done => map.serialize_entry("done", &true)?,
        }
        map.end()
    }
}

impl StreamEvent {
    /// Render as an SSE frame: `data: <json>\n\n`, or `data: [DONE]\n\n`.
    pub fn to_sse(&self) -> String {
        match self {
            StreamEvent::Done => "data: [DONE]\n\n".to_string(),
            event => match serde_json::to_string(event) {
                Ok(json) => format!("data: {}\n\n", json),
                Err(e) => format!("data: {{\"error\":{:?}}}\n\n", e.to_string()),
            },
        }
    }
}

/// Split text into pieces of at most `size` characters, never inside a
/// UTF-8 sequence.
pub fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let size = size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for c in text.chars() {
        current.push(c);
        count += 1;
        if count == size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Events for a finished run, excluding progress steps. Always ends with
/// [`StreamEvent::Done`].
pub fn response_events(response: &QueryResponse) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    match response {
        QueryResponse::Success {
            sql,
            response,
            results,
            ..
        } => {
            events.push(StreamEvent::Sql(sql.clone()));
            events.push(StreamEvent::RowCount(results.row_count()));
            events.extend(
                chunk_text(response, CONTENT_CHUNK_CHARS)
                    .into_iter()
                    .map(StreamEvent::Content),
            );
            if !results.is_empty() {
                events.push(StreamEvent::ResultsStart);
                for (batch_index, batch) in results.rows.chunks(RESULTS_BATCH_ROWS).enumerate() {
                    events.push(StreamEvent::ResultsBatch {
                        batch_index,
                        rows: batch.to_vec(),
                    });
                }
                events.push(StreamEvent::ResultsEnd);
            }
        }
        QueryResponse::Failure { error, .. } => {
            events.push(StreamEvent::Error(error.clone()));
        }
    }
    events.push(StreamEvent::Done);
    events
}

/// Run a question and hand each event to `emit` as soon as it is known.
/// Progress steps arrive while the pipeline runs; the rest once it finishes.
pub async fn ask_streaming<G, F>(service: &QueryService<G>, request: &QueryRequest, mut emit: F) -> QueryResponse
where
    G: SqlGenerator,
    F: FnMut(StreamEvent) + Send,
{
    let response = service
        .ask_with_progress(request, |stage| {
            if stage != Stage::Failed {
                emit(StreamEvent::Step(stage.progress_message().to_string()));
            }
        })
        .await;

    for event in response_events(&response) {
        emit(event);
    }
    response
}
