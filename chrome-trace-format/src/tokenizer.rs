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

use crate::LoadError;

/// Splits the body of a JSON array into its top-level values without
/// waiting for the whole document.
///
/// The tokenizer is fed the text that follows the opening `[`. Every time a
/// top-level object or array closes, its text is handed to the callback and
/// dropped from the internal buffer, so memory stays proportional to the
/// largest single event rather than to the trace.
#[derive(Debug, Default)]
pub struct BalancedJsonTokenizer {
    buffer: String,
    scan_pos: usize,
    closers: Vec<u8>,
    in_string: bool,
    escaped: bool,
    value_start: Option<usize>,
    closed: bool,
    drained: usize,
}

impl BalancedJsonTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write<F>(&mut self, chunk: &str, mut on_value: F) -> Result<(), LoadError>
    where
        F: FnMut(&str) -> Result<(), LoadError>,
    {
        if self.closed {
            self.buffer.push_str(chunk);
            return Ok(());
        }
        self.buffer.push_str(chunk);

        let bytes = self.buffer.as_bytes();
        let mut pos = self.scan_pos;
        while pos < bytes.len() {
            let byte = bytes[pos];
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                pos += 1;
                continue;
            }

            if self.closers.is_empty() {
                match byte {
                    b' ' | b'\t' | b'\r' | b'\n' | b',' => {}
                    b'{' => {
                        self.value_start = Some(pos);
                        self.closers.push(b'}');
                    }
                    b'[' => {
                        self.value_start = Some(pos);
                        self.closers.push(b']');
                    }
                    b']' => {
                        self.closed = true;
                        pos += 1;
                        break;
                    }
                    other => {
                        return Err(LoadError::Malformed {
                            message: format!(
                                "unexpected character {:?} at byte {} between events",
                                other as char,
                                self.drained + pos
                            ),
                        });
                    }
                }
                pos += 1;
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' => self.closers.push(b'}'),
                b'[' => self.closers.push(b']'),
                b'}' | b']' => {
                    if self.closers.pop() != Some(byte) {
                        return Err(LoadError::UnbalancedBrackets(self.drained + pos));
                    }
                    if self.closers.is_empty() {
                        if let Some(start) = self.value_start.take() {
                            on_value(&self.buffer[start..=pos])?;
                        }
                    }
                }
                _ => {}
            }
            pos += 1;
        }

        let keep_from = self.value_start.unwrap_or(pos);
        self.buffer.drain(..keep_from);
        self.drained += keep_from;
        self.scan_pos = pos - keep_from;
        if let Some(start) = self.value_start.as_mut() {
            *start -= keep_from;
        }
        Ok(())
    }

    /// True once the closing `]` of the array has been seen.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// True when no value is partially buffered.
    pub fn is_balanced(&self) -> bool {
        self.closers.is_empty() && !self.in_string
    }

    /// Text following the closing `]`.
    pub fn remainder(&self) -> &str {
        if self.closed {
            &self.buffer[self.scan_pos..]
        } else {
            ""
        }
    }

    /// Byte offset of the next unscanned character in the overall stream.
    pub fn offset(&self) -> usize {
        self.drained + self.scan_pos
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn collect(chunks: &[&str]) -> Result<(Vec<String>, BalancedJsonTokenizer), LoadError> {
        let mut tokenizer = BalancedJsonTokenizer::new();
        let mut values = Vec::new();
        for chunk in chunks {
            tokenizer.write(chunk, |value| {
                values.push(value.to_string());
                Ok(())
            })?;
        }
        Ok((values, tokenizer))
    }

    #[rstest]
    fn test_splits_values_across_chunks() {
        let (values, tokenizer) =
            collect(&[r#"{"a":1},{"b":"#, r#"[1,2]}, {"c":"}"}"#, "]"]).unwrap();

        assert_eq!(values, vec![r#"{"a":1}"#, r#"{"b":[1,2]}"#, r#"{"c":"}"}"#]);
        assert!(tokenizer.is_closed());
        assert!(tokenizer.is_balanced());
    }

    #[rstest]
    fn test_escaped_quotes_inside_strings() {
        let (values, _) = collect(&[r#"{"a":"x\"}\\"}"#, "]"]).unwrap();
        assert_eq!(values, vec![r#"{"a":"x\"}\\"}"#]);
    }

    #[rstest]
    fn test_unterminated_value_is_not_balanced() {
        let (values, tokenizer) = collect(&[r#"{"a":{"b":1}"#]).unwrap();
        assert!(values.is_empty());
        assert!(!tokenizer.is_balanced());
        assert!(!tokenizer.is_closed());
    }

    #[rstest]
    fn test_mismatched_closer_is_rejected() {
        let err = collect(&[r#"{"a":[1}"#]).unwrap_err();
        assert!(matches!(err, LoadError::UnbalancedBrackets(7)));
    }

    #[rstest]
    fn test_remainder_after_array() {
        let (_, tokenizer) = collect(&[r#"{"a":1}], "metadata": {}}"#]).unwrap();
        assert_eq!(tokenizer.remainder(), r#", "metadata": {}}"#);
    }

    #[rstest]
    #[case("42")]
    #[case("\"name\"")]
    fn test_non_container_values_are_malformed(#[case] input: &str) {
        let err = collect(&[input]).unwrap_err();
        assert!(matches!(err, LoadError::Malformed { .. }));
    }
}
