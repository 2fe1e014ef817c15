//! Line-level source maps for concatenated chunks.

use sourcemap::SourceMapBuilder;

use crate::{Error, Result};

/// Builds the map of one chunk while its code is being concatenated.
///
/// Modules are copied into chunks line by line, so every generated line maps
/// to column 0 of a line in the module it came from.
pub struct ChunkMap {
    builder: SourceMapBuilder,
    line: u32,
}

impl ChunkMap {
    pub fn new(file: &str) -> Self {
        Self {
            builder: SourceMapBuilder::new(Some(file)),
            line: 0,
        }
    }

    /// Advance past generated lines that have no source (markers, trailers).
    pub fn skip_lines(&mut self, count: u32) {
        self.line += count;
    }

    /// Map the lines of `code` to `source_name`.
    ///
    /// When a transform changed the line count, lines past the end of the
    /// original are mapped to its last line.
    pub fn add_module(&mut self, source_name: &str, original: &str, code: &str) {
        let source_id = self.builder.add_source(source_name);
        self.builder.set_source_contents(source_id, Some(original));

        let last_original = original.lines().count().saturating_sub(1) as u32;
        for (idx, _) in code.lines().enumerate() {
            let src_line = (idx as u32).min(last_original);
            self.builder
                .add_raw(self.line, 0, src_line, 0, Some(source_id), None, false);
            self.line += 1;
        }
    }

    pub fn generated_lines(&self) -> u32 {
        self.line
    }

    /// Serialize to JSON.
    pub fn finish(self, file: &str) -> Result<String> {
        let map = self.builder.into_sourcemap();
        let mut bytes = Vec::new();
        map.to_writer(&mut bytes).map_err(|e| Error::SourceMap {
            file: file.to_string(),
            message: e.to_string(),
        })?;
        String::from_utf8(bytes).map_err(|e| Error::SourceMap {
            file: file.to_string(),
            message: e.to_string(),
        })
    }
}
