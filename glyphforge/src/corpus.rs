//! Streamed text-segment extraction from corpus files.
//!
//! Readers hold one open file and a bounded character buffer; corpora of any
//! size stream through without being loaded whole. Each worker owns its own
//! reader, so no cursor coordination is needed.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use rand::Rng;
use rand::rngs::StdRng;

use crate::foundation::error::{ForgeError, ForgeResult};

/// Upper bound on buffered characters per reader.
const BUFFER_CAP: usize = 64 * 1024;
/// Bytes pulled from the current file per refill.
const READ_CHUNK: usize = 16 * 1024;

pub struct CorpusReader {
    files: Vec<PathBuf>,
    weights: Vec<f64>,
    current: Option<File>,
    buffer: String,
}

impl CorpusReader {
    pub fn new(files: Vec<PathBuf>, weights: Vec<f64>) -> ForgeResult<Self> {
        if files.is_empty() {
            return Err(ForgeError::resource_missing("corpus file list is empty"));
        }
        if files.len() != weights.len() {
            return Err(ForgeError::invariant("corpus weights/files length mismatch"));
        }
        Ok(Self {
            files,
            weights,
            current: None,
            buffer: String::new(),
        })
    }

    /// Resolve a glob pattern into a reader; `weights` maps file-name glob
    /// patterns to selection weights (default 1.0).
    pub fn from_pattern(
        pattern: &str,
        weights: &std::collections::BTreeMap<String, f64>,
    ) -> ForgeResult<Self> {
        let files = crate::config::resolve_glob(pattern)?;
        let ws = files
            .iter()
            .map(|f| crate::config::selector_weight(f, weights))
            .collect::<Vec<_>>();
        Self::new(files, ws)
    }

    /// Extract one text segment of length within `[min_len, max_len]` chars.
    ///
    /// Internal newlines are collapsed to single spaces. Fails with
    /// `CorpusEmpty` when no file can supply enough text.
    pub fn extract_segment(
        &mut self,
        min_len: usize,
        max_len: usize,
        rng: &mut StdRng,
    ) -> ForgeResult<String> {
        if min_len == 0 || max_len < min_len {
            return Err(ForgeError::invariant(format!(
                "segment bounds inverted: [{min_len}, {max_len}]"
            )));
        }

        let max_attempts = self.files.len() * 2 + 8;
        for _ in 0..max_attempts {
            if !self.ensure_buffer(max_len * 2, rng) {
                continue;
            }
            if let Some(segment) = self.take_segment(min_len, max_len, rng) {
                return Ok(segment);
            }
        }
        Err(ForgeError::corpus_empty(format!(
            "no segment of [{min_len}, {max_len}] chars after {max_attempts} attempts"
        )))
    }

    fn ensure_buffer(&mut self, want_chars: usize, rng: &mut StdRng) -> bool {
        let want = want_chars.min(BUFFER_CAP);
        while self.buffer.chars().count() < want {
            if self.current.is_none() && !self.open_weighted(rng) {
                return false;
            }

            let mut chunk = vec![0u8; READ_CHUNK];
            let n = match self.current.as_mut().map(|f| f.read(&mut chunk)) {
                Some(Ok(n)) => n,
                Some(Err(_)) | None => 0,
            };
            if n == 0 {
                // File exhausted, rotate on the next pass.
                self.current = None;
                if self.buffer.is_empty() {
                    return false;
                }
                break;
            }
            self.buffer.push_str(&String::from_utf8_lossy(&chunk[..n]));
            self.enforce_cap();
        }
        !self.buffer.is_empty()
    }

    fn open_weighted(&mut self, rng: &mut StdRng) -> bool {
        let total: f64 = self.weights.iter().map(|w| w.max(0.0)).sum();
        let idx = if total <= 0.0 {
            rng.gen_range(0..self.files.len())
        } else {
            let mut pick = rng.gen_range(0.0..total);
            let mut chosen = self.files.len() - 1;
            for (i, w) in self.weights.iter().enumerate() {
                pick -= w.max(0.0);
                if pick <= 0.0 {
                    chosen = i;
                    break;
                }
            }
            chosen
        };

        match File::open(&self.files[idx]) {
            Ok(f) => {
                tracing::debug!(file = %self.files[idx].display(), "opened corpus file");
                self.current = Some(f);
                true
            }
            Err(e) => {
                tracing::warn!(file = %self.files[idx].display(), error = %e, "corpus open failed");
                self.current = None;
                false
            }
        }
    }

    fn take_segment(&mut self, min_len: usize, max_len: usize, rng: &mut StdRng) -> Option<String> {
        let chars: Vec<char> = self.buffer.chars().collect();
        if chars.len() < min_len {
            return None;
        }

        let len = rng.gen_range(min_len..=max_len).min(chars.len());
        let start = rng.gen_range(0..=chars.len() - len);
        let raw: String = chars[start..start + len].iter().collect();

        // Keep the trailing half of the buffer so consecutive segments overlap
        // source text instead of marching strictly forward.
        let keep_from = chars.len() / 2;
        self.buffer = chars[keep_from..].iter().collect();

        let cleaned = collapse_whitespace(&raw);
        if cleaned.chars().count() >= min_len {
            Some(cleaned)
        } else {
            None
        }
    }

    fn enforce_cap(&mut self) {
        if self.buffer.len() > BUFFER_CAP {
            let cut = self.buffer.len() - BUFFER_CAP;
            let boundary = (cut..self.buffer.len())
                .find(|&i| self.buffer.is_char_boundary(i))
                .unwrap_or(0);
            self.buffer.drain(..boundary);
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_space = false;
    for ch in s.trim().chars() {
        if ch == '\n' || ch == '\r' || ch == '\t' || ch == ' ' {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.push(ch);
            last_space = false;
        }
    }
    out
}
