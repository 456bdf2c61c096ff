//! 📦 `JsonArrayScanner`, a chunk-tolerant scanner for top-level JSON arrays.
//!
//! Zero framework stream adapters. One state machine, five flags, a buffer.
//! Feed it bytes in whatever pieces the transport coughs up; it hands back
//! complete decoded objects and keeps everything in between to itself.

use anyhow::{Result, bail};
use serde_json::Value;
use tracing::warn;

/// 🔍 Incremental scanner over a byte stream carrying `[ {...}, {...}, ... ]`.
///
/// The contract, in two calls:
/// - [`feed`](Self::feed) consumes one chunk and returns every object whose
///   closing brace arrived inside it. State carries over between calls, so
///   a chunk may end mid-object, mid-string, or mid-escape and nothing is
///   lost or double-counted.
/// - [`finish`](Self::finish) is called once at clean end of stream and
///   errors if an object was left hanging open.
///
/// Brace counting only happens *outside* string literals: `string_mode` and
/// `escape_next` exist so that `{"label":"a{b}c"}` scans as one object and
/// `"\""` does not end a string. Bytes ≥ 0x80 are UTF-8 continuation noise
/// that never collides with a structural byte, so the scan is byte-wise and
/// still multibyte-safe.
///
/// A `]` seen at depth 0 ends the array; anything after it is ignored.
#[derive(Debug, Default)]
pub struct JsonArrayScanner {
    /// True once the opening `[` of the top-level array has been seen.
    inside_array: bool,
    /// Current `{`/`}` nesting depth. 0 means "between objects".
    brace_depth: usize,
    /// True while the cursor sits inside a quoted string literal.
    string_mode: bool,
    /// True when the previous byte was a backslash inside a string; the
    /// next byte is consumed verbatim, whatever it is.
    escape_next: bool,
    /// Bytes of the object currently being assembled. Empty whenever
    /// `brace_depth` is 0; that invariant is what makes restarts clean.
    buffer: Vec<u8>,
    /// Set by the closing `]`. A done scanner eats bytes and says nothing.
    done: bool,
    /// Bracket-balanced buffers that failed to decode. Dropped, counted,
    /// the scan moved on.
    dropped: u64,
}

impl JsonArrayScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🔍 Consume one chunk, return every object completed inside it.
    ///
    /// Objects are decoded before they are emitted; a balanced-but-bogus
    /// buffer (the feed does occasionally serve `{nonsense}`) gets a WARN
    /// line and the scan continues. One bad record is not a reason to
    /// abandon eleven million good ones.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        let mut emitted = Vec::new();
        if self.done {
            return emitted;
        }

        let mut idx = 0;
        if !self.inside_array {
            // 🔍 Skip the preamble in one memchr sweep instead of a byte
            // loop. Everything before the first `[` is noise by contract.
            match memchr::memchr(b'[', chunk) {
                Some(pos) => {
                    self.inside_array = true;
                    idx = pos + 1;
                }
                None => return emitted,
            }
        }

        while idx < chunk.len() {
            let byte = chunk[idx];
            idx += 1;

            if self.string_mode {
                if self.brace_depth > 0 {
                    self.buffer.push(byte);
                }
                if self.escape_next {
                    // The escaped byte is literal, whatever it was.
                    self.escape_next = false;
                } else if byte == b'\\' {
                    self.escape_next = true;
                } else if byte == b'"' {
                    self.string_mode = false;
                }
                continue;
            }

            match byte {
                b'"' => {
                    if self.brace_depth > 0 {
                        self.buffer.push(byte);
                    }
                    self.string_mode = true;
                }
                b'{' => {
                    if self.brace_depth == 0 {
                        // Fresh object. Whatever stale bytes a previous
                        // truncated parse left behind, they end here.
                        self.buffer.clear();
                    }
                    self.brace_depth += 1;
                    self.buffer.push(byte);
                }
                b'}' => {
                    if self.brace_depth > 0 {
                        self.brace_depth -= 1;
                        self.buffer.push(byte);
                        if self.brace_depth == 0 {
                            // ✅ Depth returned to zero: the buffer holds
                            // exactly one candidate object.
                            match serde_json::from_slice::<Value>(&self.buffer) {
                                Ok(value) => emitted.push(value),
                                Err(err) => {
                                    self.dropped += 1;
                                    warn!(
                                        "🗑️ dropped an undecodable record ({} bytes): {err}",
                                        self.buffer.len()
                                    );
                                }
                            }
                            self.buffer.clear();
                        }
                    }
                    // A stray `}` between objects is the feed's problem,
                    // not ours. Ignored.
                }
                b']' if self.brace_depth == 0 => {
                    // 🏁 End of the top-level array. Scanning stops here;
                    // trailing bytes in this and later chunks are ignored.
                    self.done = true;
                    break;
                }
                _ => {
                    if self.brace_depth > 0 {
                        self.buffer.push(byte);
                    }
                    // Commas and whitespace between objects fall through
                    // to nothing, which is exactly what they deserve.
                }
            }
        }

        emitted
    }

    /// 🏁 Declare the stream cleanly ended.
    ///
    /// Errors if the final object never closed. A transport that died
    /// mid-body fails earlier, at the chunk level; landing here with an
    /// open object means the feed itself served a truncated array.
    pub fn finish(&self) -> Result<()> {
        if self.brace_depth > 0 || self.string_mode || !self.buffer.is_empty() {
            bail!(
                "💀 feed ended mid-record: {} unclosed brace(s), {} byte(s) stranded in the buffer. \
                 The array just... stopped. We waited for a closing brace that never came.",
                self.brace_depth,
                self.buffer.len()
            );
        }
        Ok(())
    }

    /// 🗑️ How many balanced-but-undecodable buffers were dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 🧪 Scanner tests: where chunk boundaries come to die

    fn scan_whole(payload: &str) -> Vec<Value> {
        let mut scanner = JsonArrayScanner::new();
        let emitted = scanner.feed(payload.as_bytes());
        scanner.finish().expect("whole-payload scan should finish clean");
        emitted
    }

    #[test]
    fn the_one_where_a_simple_array_yields_its_objects() {
        let emitted = scan_whole(r#"[{"a":1},{"b":2},{"c":3}]"#);
        assert_eq!(emitted.len(), 3);
        assert_eq!(emitted[0]["a"], 1);
        assert_eq!(emitted[2]["c"], 3);
    }

    #[test]
    fn the_one_where_the_empty_array_yields_nothing() {
        assert!(scan_whole("[]").is_empty());
        assert!(scan_whole("  \n\t []  ").is_empty());
    }

    #[test]
    fn the_one_where_braces_inside_strings_are_not_structure() {
        // 🧪 The classic trap: {"label":"a{b}c"}. One object. ONE.
        let emitted = scan_whole(r#"[{"label":"a{b}c"},{"x":"}{"}]"#);
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0]["label"], "a{b}c");
        assert_eq!(emitted[1]["x"], "}{");
    }

    #[test]
    fn the_one_where_escaped_quotes_do_not_end_the_string() {
        let emitted = scan_whole(r#"[{"say":"he said \"hi\" {loudly}"},{"path":"C:\\data\\"}]"#);
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0]["say"], r#"he said "hi" {loudly}"#);
        assert_eq!(emitted[1]["path"], r"C:\data\");
    }

    #[test]
    fn the_one_where_every_split_point_agrees_with_one_big_chunk() {
        // 🧪 The core correctness property: however the transport slices
        // the payload, the emitted sequence is identical. We try EVERY
        // two-chunk split, including ones landing mid-string, mid-escape
        // and mid-multibyte-codepoint.
        let payload = r#"  [ {"label":"a{b}c","n":1}, {"s":"\\\"}","t":"héllo ☃"},{"deep":{"er":{"est":[1,2]}}} ]"#;
        let expected = scan_whole(payload);
        assert_eq!(expected.len(), 3);

        let bytes = payload.as_bytes();
        for split in 1..bytes.len() {
            let mut scanner = JsonArrayScanner::new();
            let mut emitted = scanner.feed(&bytes[..split]);
            emitted.extend(scanner.feed(&bytes[split..]));
            scanner.finish().unwrap_or_else(|err| {
                panic!("split at {split} should finish clean, got: {err}")
            });
            assert_eq!(emitted, expected, "split at byte {split} diverged");
        }
    }

    #[test]
    fn the_one_where_byte_by_byte_feeding_still_works() {
        let payload = r#"[{"temperature":20.5,"source":"s1"},{"humidity":50}]"#;
        let expected = scan_whole(payload);

        let mut scanner = JsonArrayScanner::new();
        let mut emitted = Vec::new();
        for byte in payload.as_bytes() {
            emitted.extend(scanner.feed(std::slice::from_ref(byte)));
        }
        scanner.finish().unwrap();
        assert_eq!(emitted, expected);
    }

    #[test]
    fn the_one_where_a_bad_record_is_dropped_and_the_scan_survives() {
        // 🧪 Balanced braces, garbage inside. The scanner logs it, drops
        // it, and keeps walking like nothing happened.
        let mut scanner = JsonArrayScanner::new();
        let emitted = scanner.feed(br#"[{"a":1},{bogus},{"b":2}]"#);
        scanner.finish().unwrap();
        assert_eq!(emitted.len(), 2);
        assert_eq!(emitted[0]["a"], 1);
        assert_eq!(emitted[1]["b"], 2);
        assert_eq!(scanner.dropped(), 1);
    }

    #[test]
    fn the_one_where_the_closing_bracket_ends_everything() {
        let mut scanner = JsonArrayScanner::new();
        let emitted = scanner.feed(br#"[{"a":1}] {"ghost":true},{"also":"ghost"}"#);
        assert_eq!(emitted.len(), 1);
        // Later chunks are dead to a done scanner.
        assert!(scanner.feed(br#"[{"b":2}]"#).is_empty());
        scanner.finish().unwrap();
    }

    #[test]
    fn the_one_where_the_preamble_is_ignored() {
        let mut scanner = JsonArrayScanner::new();
        let mut emitted = scanner.feed(b"HTTP junk, whitespace, vibes ");
        assert!(emitted.is_empty());
        emitted.extend(scanner.feed(br#"[{"a":1}]"#));
        assert_eq!(emitted.len(), 1);
    }

    #[test]
    fn the_one_where_finish_flags_a_truncated_record() {
        let mut scanner = JsonArrayScanner::new();
        scanner.feed(br#"[{"a":1},{"half":"#);
        let err = scanner.finish().expect_err("a dangling object must not pass");
        assert!(err.to_string().contains("mid-record"), "got: {err}");
    }

    #[test]
    fn the_one_where_finish_is_fine_with_a_missing_close_bracket() {
        // No `]`, but no open object either. What finish() polices is
        // truncated *records*, not truncated framing.
        let mut scanner = JsonArrayScanner::new();
        let emitted = scanner.feed(br#"[{"a":1},{"b":2}"#);
        assert_eq!(emitted.len(), 2);
        scanner.finish().unwrap();
    }

    #[test]
    fn the_one_where_nested_objects_count_as_one() {
        let emitted = scan_whole(r#"[{"outer":{"inner":{"most":1}},"sibling":[{"not":"top-level"}]}]"#);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0]["outer"]["inner"]["most"], 1);
    }
}
