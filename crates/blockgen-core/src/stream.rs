//! Incremental decoding of block spec document streams.
//!
//! `blockgen block plan` writes one YAML document per block, separated by
//! `---` lines. The stream may be arbitrarily long, so documents are decoded
//! one at a time as soon as their terminating separator (or end of input)
//! is read, instead of buffering the whole input first.

use crate::error::SpecError;
use crate::spec::BlockSpec;
use std::io::BufRead;

/// Iterator over the block specs of a `---` separated YAML stream.
///
/// Yields `Err` for the first unreadable or invalid document and stops
/// afterwards. End of input ends the iteration cleanly.
pub struct BlockSpecStream<R> {
    reader: R,
    line: String,
    document: String,
    /// Content after a `--- ` marker, starting the next document
    carry: String,
    done: bool,
}

impl<R: BufRead> BlockSpecStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
            document: String::new(),
            carry: String::new(),
            done: false,
        }
    }

    /// Read lines until a complete non-empty document is buffered.
    ///
    /// Returns `Ok(false)` at end of input with nothing buffered.
    fn fill_document(&mut self) -> Result<bool, SpecError> {
        loop {
            self.line.clear();
            let read = self.reader.read_line(&mut self.line)?;
            if read == 0 {
                return Ok(has_content(&self.document));
            }
            if let Some(rest) = separator_rest(&self.line) {
                let rest = if rest.is_empty() {
                    String::new()
                } else {
                    format!("{rest}\n")
                };
                if has_content(&self.document) {
                    self.carry = rest;
                    return Ok(true);
                }
                self.document = rest;
                continue;
            }
            self.document.push_str(&self.line);
        }
    }
}

impl<R: BufRead> Iterator for BlockSpecStream<R> {
    type Item = Result<BlockSpec, SpecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.fill_document() {
            Ok(true) => {
                let result = BlockSpec::from_yaml(&self.document);
                self.document = std::mem::take(&mut self.carry);
                if result.is_err() {
                    self.done = true;
                }
                Some(result)
            }
            Ok(false) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// For a document marker line, the content following it on the same line.
fn separator_rest(line: &str) -> Option<&str> {
    let line = line.trim_end();
    if line == "---" || line == "..." {
        return Some("");
    }
    line.strip_prefix("--- ").map(str::trim_start)
}

fn has_content(document: &str) -> bool {
    document.lines().any(|l| {
        let l = l.trim();
        !l.is_empty() && !l.starts_with('#')
    })
}
