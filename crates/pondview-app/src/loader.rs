//! Trace acquisition from disk or HTTP.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use pondview_model::Trace;
use tracing::debug;

/// Where the replay document comes from. The viewer keeps this around so
/// the reload key can re-fetch from the same place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceSource {
    File(PathBuf),
    Url(String),
}

impl TraceSource {
    /// Builds the source from the command line, favouring the positional
    /// file when both forms are present.
    pub fn from_cli(file: Option<PathBuf>, url: Option<String>) -> Result<Self> {
        match (file, url) {
            (Some(path), _) => Ok(Self::File(path)),
            (None, Some(url)) => Ok(Self::Url(url)),
            (None, None) => bail!("no trace given; pass a file path or --data-url"),
        }
    }

    /// Human-readable name for logs and the event feed.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Url(url) => url.clone(),
        }
    }

    /// Fetches the raw JSON document.
    pub fn fetch(&self) -> Result<String> {
        match self {
            Self::File(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read trace file {}", path.display())),
            Self::Url(url) => {
                let response = reqwest::blocking::get(url)
                    .with_context(|| format!("failed to fetch trace from {url}"))?
                    .error_for_status()
                    .with_context(|| format!("trace endpoint {url} answered with an error"))?;
                response
                    .text()
                    .context("failed to read the trace response body")
            }
        }
    }

    /// Fetches and converts in one step.
    pub fn load(&self) -> Result<Trace> {
        let raw = self.fetch()?;
        debug!(source = %self.describe(), bytes = raw.len(), "trace document fetched");
        Trace::from_json_str(&raw)
            .with_context(|| format!("trace from {} is malformed", self.describe()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTEST_TRACE: &str =
        r#"[[1,3],[[[10,10,[[2,2,1]],[0],0,0],[[[[1,1,5,0]]],[[[2,2,5,1]]]]]]]"#;

    #[test]
    fn loads_a_trace_from_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trace.json");
        fs::write(&path, CONTEST_TRACE).expect("write fixture");

        let trace = TraceSource::File(path).load().expect("load");
        assert_eq!(trace.stage_count(), 1);
        assert_eq!(trace.stages[0].turn_count(), 2);
    }

    #[test]
    fn missing_file_names_the_path() {
        let source = TraceSource::File(PathBuf::from("/definitely/not/here.json"));
        let err = source.load().expect_err("must fail");
        assert!(
            format!("{err:#}").contains("not/here.json"),
            "error should name the path: {err:#}"
        );
    }

    #[test]
    fn malformed_document_names_the_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        fs::write(&path, "[[1,3]").expect("write fixture");

        let err = TraceSource::File(path).load().expect_err("must fail");
        assert!(
            format!("{err:#}").contains("malformed"),
            "error should flag the document: {err:#}"
        );
    }

    #[test]
    fn cli_requires_some_source() {
        assert!(TraceSource::from_cli(None, None).is_err());
    }

    #[test]
    fn cli_prefers_the_positional_file() {
        let source = TraceSource::from_cli(
            Some(PathBuf::from("a.json")),
            Some("http://example.invalid/trace".into()),
        )
        .expect("source");
        assert_eq!(source, TraceSource::File(PathBuf::from("a.json")));
    }
}
