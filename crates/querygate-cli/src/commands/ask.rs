use std::io::{self, Write};

use anyhow::{bail, Context, Result};

use querygate_core::llm::client::LlmProvider;
use querygate_core::llm::LlmSqlGenerator;
use querygate_core::stream::ask_streaming;
use querygate_core::{QueryRequest, QueryService, SqlGenerator, Stage};

use super::{connect, load_config, print_response, spinner};
use crate::args::{AskArgs, GlobalArgs};

pub async fn run(global: &GlobalArgs, args: &AskArgs) -> Result<()> {
    let config = load_config()?;
    let provider = LlmProvider::from_config(&config.llm, args.model.as_deref())?;
    tracing::debug!("Using {}", provider.label());

    let pool = connect(global, &config).await?;
    let mut service = QueryService::from_config(pool, LlmSqlGenerator::new(provider), &config.query);
    if args.metrics {
        service = service.with_metrics_log();
    }

    let mut request = QueryRequest::new(args.question.clone());
    request.row_limit = args.rows;

    if args.stream {
        let mut frames = FrameWriter::new(io::stdout());
        let response = ask_streaming(&service, &request, |event| frames.write(&event.to_sse())).await;
        service.pool().close().await;
        print_metrics(&service)?;
        frames.finish().context("Failed to write event stream to stdout")?;
        if let Some(error) = response.error() {
            bail!("{}", error);
        }
        return Ok(());
    }

    let pb = spinner(Stage::SchemaReady.progress_message());
    let response = service
        .ask_with_progress(&request, |stage| pb.set_message(stage.progress_message()))
        .await;
    pb.finish_and_clear();

    service.pool().close().await;
    print_metrics(&service)?;
    print_response(&response, args.format, service.formatter())
}

/// Stderr, so stdout stays parseable in every format.
fn print_metrics<G: SqlGenerator>(service: &QueryService<G>) -> Result<()> {
    if let Some(summary) = service.metrics_summary() {
        eprintln!("{}", serde_json::to_string_pretty(&summary)?);
    }
    Ok(())
}

/// Writes SSE frames as they arrive. The pipeline keeps running after a
/// failed write; the first error is kept and reported once it ends.
struct FrameWriter<W: Write> {
    out: W,
    error: Option<io::Error>,
}

impl<W: Write> FrameWriter<W> {
    fn new(out: W) -> Self {
        Self { out, error: None }
    }

    fn write(&mut self, frame: &str) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = self.out.write_all(frame.as_bytes()).and_then(|()| self.out.flush()) {
            self.error = Some(e);
        }
    }

    fn finish(self) -> io::Result<()> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Accepts `room` bytes, then fails like a closed pipe.
    struct ClosedAfter {
        room: usize,
        written: Vec<u8>,
        attempts: usize,
    }

    impl Write for ClosedAfter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.attempts += 1;
            if self.written.len() + buf.len() > self.room {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"));
            }
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_frames_are_written_in_order() {
        let mut frames = FrameWriter::new(Vec::new());
        frames.write("data: one\n\n");
        frames.write("data: two\n\n");
        assert!(frames.error.is_none());
        assert_eq!(frames.out, b"data: one\n\ndata: two\n\n");
        assert!(frames.finish().is_ok());
    }

    #[test]
    fn test_first_write_error_is_reported() {
        let mut frames = FrameWriter::new(ClosedAfter {
            room: 12,
            written: Vec::new(),
            attempts: 0,
        });
        frames.write("data: one\n\n");
        frames.write("data: two\n\n");
        frames.write("data: three\n\n");

        assert_eq!(frames.out.written, b"data: one\n\n");
        // Nothing is attempted after the first failure
        assert_eq!(frames.out.attempts, 2);
        let err = frames.finish().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
