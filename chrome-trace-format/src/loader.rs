// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use crate::{BalancedJsonTokenizer, CpuProfile, LoadError, RawTrace, RawTraceEvent, TraceFormat};
use serde_json::Value;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};

const CPU_PROFILE_PREFIX: &str = r#"{"nodes":"#;
const TRACE_EVENTS_KEY: &str = r#""traceEvents""#;

/// Receives loader notifications. All callbacks run synchronously on the
/// thread that feeds the loader.
pub trait LoaderClient {
    fn loading_started(&mut self) {}

    fn loading_progress(&mut self, _progress: LoadProgress) {}

    fn processing_started(&mut self) {}

    /// Called exactly once per load. `None` means the load failed or was
    /// cancelled and nothing should be shown.
    fn loading_complete(&mut self, trace: Option<RawTrace>);

    fn loading_error(&mut self, _error: &LoadError) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadProgress {
    pub bytes_read: usize,
    pub total_bytes: Option<usize>,
    pub events_parsed: usize,
}

impl LoadProgress {
    pub fn fraction(&self) -> Option<f64> {
        self.total_bytes
            .filter(|total| *total > 0)
            .map(|total| (self.bytes_read as f64 / total as f64).min(1.0))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    /// Bytes read from the source per write.
    pub chunk_size: usize,
    /// Progress is reported after this many newly parsed events.
    pub batch_size: usize,
    pub total_bytes: Option<usize>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1 << 20,
            batch_size: 50_000,
            total_bytes: None,
        }
    }
}

enum State {
    Initial,
    LookingForEvents,
    ReadingEvents,
    ReadingCpuProfile,
    Done,
}

/// Incremental trace loader.
///
/// Bytes are pushed in with [`TraceLoader::write`] as they arrive; the
/// format is detected from the first non-whitespace characters and events
/// are parsed one at a time as soon as their closing bracket is seen.
pub struct TraceLoader<C: LoaderClient> {
    client: C,
    options: LoadOptions,
    state: State,
    format: Option<TraceFormat>,
    buffer: String,
    pending_bytes: Vec<u8>,
    tokenizer: BalancedJsonTokenizer,
    events: Vec<RawTraceEvent>,
    bytes_read: usize,
    last_reported: usize,
}

impl<C: LoaderClient> TraceLoader<C> {
    pub fn new(mut client: C, options: LoadOptions) -> Self {
        client.loading_started();
        Self {
            client,
            options,
            state: State::Initial,
            format: None,
            buffer: String::new(),
            pending_bytes: Vec::new(),
            tokenizer: BalancedJsonTokenizer::new(),
            events: Vec::new(),
            bytes_read: 0,
            last_reported: 0,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_client(self) -> C {
        self.client
    }

    pub fn format(&self) -> Option<TraceFormat> {
        self.format
    }

    /// Feeds the next chunk. On error the load is already torn down and the
    /// client notified; the caller should stop feeding.
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), LoadError> {
        if matches!(self.state, State::Done) {
            return Err(LoadError::Cancelled);
        }
        self.bytes_read += chunk.len();
        let text = match self.decode(chunk) {
            Ok(text) => text,
            Err(err) => return Err(self.fail(err)),
        };
        if let Err(err) = self.write_text(&text) {
            return Err(self.fail(err));
        }
        if self.events.len() - self.last_reported >= self.options.batch_size {
            self.last_reported = self.events.len();
            self.client.loading_progress(LoadProgress {
                bytes_read: self.bytes_read,
                total_bytes: self.options.total_bytes,
                events_parsed: self.events.len(),
            });
        }
        Ok(())
    }

    /// Signals end of input and hands the trace to the client.
    pub fn finish(&mut self) -> Result<(), LoadError> {
        if matches!(self.state, State::Done) {
            return Err(LoadError::Cancelled);
        }
        match self.build_trace() {
            Ok(trace) => {
                self.state = State::Done;
                tracing::debug!(events = trace.events.len(), format = ?trace.format, "trace loaded");
                self.client.processing_started();
                self.client.loading_complete(Some(trace));
                Ok(())
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Drops everything parsed so far and tells the client nothing loaded.
    pub fn cancel(&mut self) {
        if matches!(self.state, State::Done) {
            return;
        }
        self.discard();
        self.client.loading_complete(None);
    }

    fn fail(&mut self, err: LoadError) -> LoadError {
        tracing::warn!(error = %err, bytes_read = self.bytes_read, "trace loading failed");
        self.client.loading_error(&err);
        self.discard();
        self.client.loading_complete(None);
        err
    }

    fn discard(&mut self) {
        self.state = State::Done;
        self.events = Vec::new();
        self.buffer = String::new();
        self.pending_bytes = Vec::new();
        self.tokenizer = BalancedJsonTokenizer::new();
    }

    fn decode(&mut self, chunk: &[u8]) -> Result<String, LoadError> {
        self.pending_bytes.extend_from_slice(chunk);
        match std::str::from_utf8(&self.pending_bytes) {
            Ok(text) => {
                let text = text.to_string();
                self.pending_bytes.clear();
                Ok(text)
            }
            Err(err) if err.error_len().is_none() => {
                // A multi-byte character is split across chunks.
                let valid = err.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending_bytes[..valid]).into_owned();
                self.pending_bytes.drain(..valid);
                Ok(text)
            }
            Err(_) => Err(LoadError::InvalidUtf8),
        }
    }

    fn write_text(&mut self, text: &str) -> Result<(), LoadError> {
        match self.state {
            State::Initial => {
                self.buffer.push_str(text);
                self.detect_format()
            }
            State::LookingForEvents => {
                self.buffer.push_str(text);
                self.find_events_array()
            }
            State::ReadingEvents => self.read_events(text),
            State::ReadingCpuProfile => {
                self.buffer.push_str(text);
                Ok(())
            }
            State::Done => Err(LoadError::Cancelled),
        }
    }

    fn detect_format(&mut self) -> Result<(), LoadError> {
        let trimmed = self.buffer.trim_start();
        let Some(first) = trimmed.chars().next() else {
            return Ok(());
        };
        match first {
            '[' => {
                self.format = Some(TraceFormat::Array);
                self.state = State::ReadingEvents;
                let rest = trimmed[1..].to_string();
                self.buffer.clear();
                self.read_events(&rest)
            }
            '{' => {
                let compact: String = trimmed
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .take(CPU_PROFILE_PREFIX.len())
                    .collect();
                if compact.len() < CPU_PROFILE_PREFIX.len() && CPU_PROFILE_PREFIX.starts_with(&compact) {
                    // Not enough input to tell a CPU profile from an object.
                    return Ok(());
                }
                if compact == CPU_PROFILE_PREFIX {
                    self.format = Some(TraceFormat::CpuProfile);
                    self.state = State::ReadingCpuProfile;
                    Ok(())
                } else {
                    self.format = Some(TraceFormat::Object);
                    self.state = State::LookingForEvents;
                    self.find_events_array()
                }
            }
            _ => Err(LoadError::UnknownFormat),
        }
    }

    fn find_events_array(&mut self) -> Result<(), LoadError> {
        let mut array_start = None;
        for (key_pos, _) in self.buffer.match_indices(TRACE_EVENTS_KEY) {
            let after_key = self.buffer[key_pos + TRACE_EVENTS_KEY.len()..].trim_start();
            let Some(value) = after_key.strip_prefix(':') else {
                if after_key.is_empty() {
                    return Ok(());
                }
                // The name appeared as a value, not a key.
                continue;
            };
            let value = value.trim_start();
            match value.chars().next() {
                None => return Ok(()),
                Some('[') => {
                    array_start = Some(self.buffer.len() - value.len());
                    break;
                }
                Some(_) => {
                    return Err(LoadError::Malformed {
                        message: "traceEvents is not an array".to_string(),
                    })
                }
            }
        }
        let Some(array_start) = array_start else {
            return Ok(());
        };
        let rest = self.buffer[array_start + 1..].to_string();
        self.buffer.clear();
        self.state = State::ReadingEvents;
        self.read_events(&rest)
    }

    fn read_events(&mut self, text: &str) -> Result<(), LoadError> {
        let events = &mut self.events;
        self.tokenizer.write(text, |value| {
            let event = if events.is_empty() {
                parse_first_event(value)?
            } else {
                serde_json::from_str(value)?
            };
            events.push(event);
            Ok(())
        })
    }

    fn build_trace(&mut self) -> Result<RawTrace, LoadError> {
        match self.state {
            State::Initial => Err(LoadError::UnknownFormat),
            State::LookingForEvents => {
                // The object never contained a traceEvents array.
                let value: Value = serde_json::from_str(&self.buffer)?;
                if value.get("traceEvents").is_none() {
                    return Err(LoadError::UnknownFormat);
                }
                Err(LoadError::Malformed {
                    message: "traceEvents could not be located".to_string(),
                })
            }
            State::ReadingEvents => {
                if !self.tokenizer.is_balanced() {
                    return Err(LoadError::UnbalancedBrackets(self.tokenizer.offset()));
                }
                let metadata = trailing_metadata(self.tokenizer.remainder());
                Ok(RawTrace {
                    format: self.format.unwrap_or(TraceFormat::Array),
                    events: std::mem::take(&mut self.events),
                    metadata,
                    cpu_profile: None,
                })
            }
            State::ReadingCpuProfile => {
                let profile: CpuProfile = serde_json::from_str(&self.buffer)?;
                Ok(RawTrace::from_cpu_profile(profile))
            }
            State::Done => Err(LoadError::Cancelled),
        }
    }
}

fn parse_first_event(text: &str) -> Result<RawTraceEvent, LoadError> {
    let value: Value = serde_json::from_str(text)?;
    // Pre-trace-event timeline recordings carry `type`/`startTime` records.
    if value.get("ph").is_none() && value.get("type").is_some() && value.get("startTime").is_some() {
        return Err(LoadError::LegacyFormat);
    }
    Ok(serde_json::from_value(value)?)
}

/// Best-effort recovery of `"metadata": {...}` written after the events array.
fn trailing_metadata(remainder: &str) -> Option<Value> {
    let body = remainder.trim_start().strip_prefix(',')?;
    let wrapped = format!("{{{}", body.trim_start());
    let value: Value = serde_json::from_str(&wrapped).ok()?;
    value.get("metadata").cloned()
}

/// Reads a whole trace from `reader` in `options.chunk_size` chunks.
///
/// `cancel` is polled between chunks; once set, the load is torn down and
/// `LoadError::Cancelled` returned.
pub fn load_from_reader<R: Read, C: LoaderClient>(
    mut reader: R,
    client: C,
    options: LoadOptions,
    cancel: Option<&AtomicBool>,
) -> (C, Result<(), LoadError>) {
    let mut loader = TraceLoader::new(client, options);
    let mut chunk = vec![0u8; options.chunk_size.max(1)];
    let result = loop {
        if cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            loader.cancel();
            break Err(LoadError::Cancelled);
        }
        let read = match reader.read(&mut chunk) {
            Ok(0) => break loader.finish(),
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => break Err(loader.fail(LoadError::Io(err))),
        };
        if let Err(err) = loader.write(&chunk[..read]) {
            break Err(err);
        }
    };
    (loader.into_client(), result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Phase;
    use rstest::{fixture, rstest};

    #[derive(Default)]
    struct RecordingClient {
        started: bool,
        progress: Vec<LoadProgress>,
        completions: Vec<Option<RawTrace>>,
        errors: Vec<String>,
    }

    impl LoaderClient for RecordingClient {
        fn loading_started(&mut self) {
            self.started = true;
        }

        fn loading_progress(&mut self, progress: LoadProgress) {
            self.progress.push(progress);
        }

        fn loading_complete(&mut self, trace: Option<RawTrace>) {
            self.completions.push(trace);
        }

        fn loading_error(&mut self, error: &LoadError) {
            self.errors.push(error.to_string());
        }
    }

    #[fixture]
    fn small_chunks() -> LoadOptions {
        LoadOptions {
            chunk_size: 7,
            batch_size: 2,
            total_bytes: None,
        }
    }

    fn load(input: &str, options: LoadOptions) -> (RecordingClient, Result<(), LoadError>) {
        load_from_reader(input.as_bytes(), RecordingClient::default(), options, None)
    }

    const EVENTS: &str = r#"[
        {"name":"RunTask","ph":"X","ts":10,"dur":5,"pid":1,"tid":1},
        {"name":"Layout","ph":"X","ts":11,"dur":2,"pid":1,"tid":1},
        {"name":"Paint","ph":"X","ts":20,"dur":1,"pid":1,"tid":1}
    ]"#;

    #[rstest]
    fn test_array_format(small_chunks: LoadOptions) {
        let (client, result) = load(EVENTS, small_chunks);
        result.unwrap();

        assert!(client.started);
        assert_eq!(client.completions.len(), 1);
        let trace = client.completions[0].as_ref().unwrap();
        assert_eq!(trace.format, TraceFormat::Array);
        assert_eq!(trace.events.len(), 3);
        assert_eq!(trace.events[1].name, "Layout");
        assert!(!client.progress.is_empty());
    }

    #[rstest]
    fn test_object_format_with_metadata(small_chunks: LoadOptions) {
        let input = format!(r#"  {{ "traceEvents": {EVENTS}, "metadata": {{"source":"test"}} }}"#);
        let (client, result) = load(&input, small_chunks);
        result.unwrap();

        let trace = client.completions[0].as_ref().unwrap();
        assert_eq!(trace.format, TraceFormat::Object);
        assert_eq!(trace.events.len(), 3);
        assert_eq!(trace.metadata.as_ref().unwrap()["source"], "test");
    }

    #[rstest]
    #[case::space_before_colon(r#"{"traceEvents" : [{"name":"a","ph":"i","ts":1}]}"#)]
    #[case::newlines(r#"{"traceEvents"
        :
        [{"name":"a","ph":"i","ts":1}]}"#)]
    #[case::name_as_value_first(r#"{"source":"traceEvents","traceEvents":[{"name":"a","ph":"i","ts":1}]}"#)]
    fn test_object_format_key_spacing(small_chunks: LoadOptions, #[case] input: &str) {
        let (client, result) = load(input, small_chunks);
        result.unwrap();

        let trace = client.completions[0].as_ref().unwrap();
        assert_eq!(trace.format, TraceFormat::Object);
        assert_eq!(trace.events.len(), 1);
        assert_eq!(trace.events[0].name, "a");
    }

    #[rstest]
    fn test_cpu_profile_format(small_chunks: LoadOptions) {
        let input = r#"{"nodes":[{"id":1,"callFrame":{"functionName":"(root)"}}],"samples":[1],"timeDeltas":[1],"startTime":0,"endTime":2}"#;
        let (client, result) = load(input, small_chunks);
        result.unwrap();

        let trace = client.completions[0].as_ref().unwrap();
        assert_eq!(trace.format, TraceFormat::CpuProfile);
        assert_eq!(trace.cpu_profile.as_ref().unwrap().nodes.len(), 1);
    }

    #[rstest]
    fn test_truncated_array_without_closing_bracket_is_accepted(small_chunks: LoadOptions) {
        let input = r#"[{"name":"a","ph":"i","ts":1},{"name":"b","ph":"i","ts":2},"#;
        let (client, result) = load(input, small_chunks);
        result.unwrap();
        assert_eq!(client.completions[0].as_ref().unwrap().events.len(), 2);
    }

    #[rstest]
    #[case("hello", "unknown JSON format")]
    #[case(r#"[{"name":"a","ph":"X","ts":1"#, "unbalanced brackets")]
    #[case(r#"[{"type":"Program","startTime":1,"endTime":2}]"#, "legacy timeline format is not supported")]
    #[case(r#"[{"name":"a","ph":"?"}]"#, "malformed trace data")]
    fn test_errors_report_once_and_complete_with_none(
        small_chunks: LoadOptions,
        #[case] input: &str,
        #[case] message: &str,
    ) {
        let (client, result) = load(input, small_chunks);

        assert!(result.is_err());
        assert_eq!(client.errors.len(), 1);
        assert!(client.errors[0].starts_with(message), "{}", client.errors[0]);
        assert_eq!(client.completions.len(), 1);
        assert!(client.completions[0].is_none());
    }

    #[rstest]
    fn test_cancel_between_chunks(small_chunks: LoadOptions) {
        let flag = AtomicBool::new(true);
        let (client, result) =
            load_from_reader(EVENTS.as_bytes(), RecordingClient::default(), small_chunks, Some(&flag));

        assert!(matches!(result, Err(LoadError::Cancelled)));
        assert_eq!(client.completions.len(), 1);
        assert!(client.completions[0].is_none());
    }

    #[rstest]
    fn test_multibyte_character_split_across_chunks() {
        let input = r#"[{"name":"héllo","ph":"i","ts":1}]"#;
        let options = LoadOptions {
            chunk_size: 1,
            batch_size: 100,
            total_bytes: Some(input.len()),
        };
        let (client, result) = load(input, options);
        result.unwrap();

        let trace = client.completions[0].as_ref().unwrap();
        assert_eq!(trace.events[0].name, "héllo");
        assert_eq!(trace.events[0].ph, Phase::Instant);
    }
}
