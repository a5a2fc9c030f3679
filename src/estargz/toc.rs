//! The eStargz table of contents: an index of every archive entry and the
//! byte range of its independently-gzip-compressed chunk, letting a single
//! file be fetched without downloading the rest of the archive (spec §4.6).
//!
//! Layout, narrowest-first: the archive is a normal gzip stream, except each
//! entry is flushed as its own gzip member so its compressed bytes form a
//! self-contained range. A final gzip member holds the JSON-encoded
//! [`Toc`] itself; a fixed-size footer member at the very end carries that
//! member's offset so a reader only has to fetch the last
//! [`FOOTER_SIZE`] bytes to locate it.
//!
//! This footer/TOC layout is self-consistent but not claimed to be
//! byte-compatible with containerd/stargz-snapshotter's own eStargz format;
//! see `DESIGN.md` for why.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use serde::{Deserialize, Serialize};

use super::range_reader::RangeReader;
use crate::extract::error::{ExtractError, ExtractResult};

/// Size in bytes of the trailing footer member.
pub const FOOTER_SIZE: u64 = 64;

const FOOTER_EXTRA_FIELD_ID: &[u8; 2] = b"SG";

/// One entry in the table of contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TocEntry {
    /// The entry's path, relative to the archive root.
    pub name: String,
    /// `"reg"`, `"dir"`, or `"symlink"`.
    #[serde(rename = "type")]
    pub entry_type: String,
    /// Uncompressed size in bytes.
    #[serde(default)]
    pub size: u64,
    /// POSIX permission bits.
    #[serde(default)]
    pub mode: u32,
    /// Symlink target, when `entry_type == "symlink"`.
    #[serde(default)]
    pub link_name: Option<String>,
    /// Byte offset of this entry's gzip member within the archive.
    pub offset: u64,
    /// Compressed length of this entry's gzip member.
    pub compressed_size: u64,
}

/// The full table of contents for one eStargz archive.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Toc {
    /// Every entry in the archive, in archive order.
    pub entries: Vec<TocEntry>,
}

impl Toc {
    /// Finds an entry by exact path.
    pub fn get(&self, path: &str) -> Option<&TocEntry> {
        self.entries.iter().find(|e| e.name == path)
    }
}

/// Reads the footer from the last [`FOOTER_SIZE`] bytes of the archive and
/// returns the byte offset of the TOC's gzip member.
pub fn parse_footer(footer_bytes: &[u8]) -> ExtractResult<u64> {
    let mut decoder = GzDecoder::new(footer_bytes);
    let mut discard = Vec::new();
    decoder
        .read_to_end(&mut discard)
        .map_err(|e| ExtractError::Malformed(format!("estargz footer: {e}")))?;
    let header = decoder
        .header()
        .ok_or_else(|| ExtractError::Malformed("estargz footer: missing gzip header".to_string()))?;
    let extra = header
        .extra()
        .ok_or_else(|| ExtractError::Malformed("estargz footer: missing extra field".to_string()))?;
    if extra.len() < 2 + 2 + 16 || &extra[0..2] != FOOTER_EXTRA_FIELD_ID {
        return Err(ExtractError::Malformed("estargz footer: unrecognized extra field".to_string()));
    }
    let hex = std::str::from_utf8(&extra[4..20])
        .map_err(|_| ExtractError::Malformed("estargz footer: non-UTF8 offset".to_string()))?;
    u64::from_str_radix(hex, 16).map_err(|e| ExtractError::Malformed(format!("estargz footer offset: {e}")))
}

/// Builds the fixed-size footer member pointing at `toc_offset`.
pub fn build_footer(toc_offset: u64) -> Vec<u8> {
    let mut extra = Vec::with_capacity(20);
    extra.extend_from_slice(FOOTER_EXTRA_FIELD_ID);
    extra.extend_from_slice(&16u16.to_le_bytes());
    extra.extend_from_slice(format!("{toc_offset:016x}").as_bytes());

    let mut out = Vec::new();
    {
        let mut builder = GzBuilder::new().extra(extra).write(&mut out, Compression::none());
        builder.write_all(&[]).unwrap();
        builder.finish().unwrap();
    }
    while (out.len() as u64) < FOOTER_SIZE {
        out.push(0);
    }
    out
}

/// Fetches and parses the TOC from a remote archive via `reader`.
pub async fn fetch_toc(reader: &RangeReader) -> ExtractResult<Toc> {
    let total = reader.size();
    if total < FOOTER_SIZE {
        return Err(ExtractError::Malformed("estargz archive smaller than footer".to_string()));
    }
    let footer = reader
        .fetch_range(total - FOOTER_SIZE, FOOTER_SIZE)
        .await
        .map_err(ExtractError::from)?;
    let toc_offset = parse_footer(&footer)?;
    if toc_offset >= total - FOOTER_SIZE {
        return Err(ExtractError::Malformed("estargz TOC offset out of range".to_string()));
    }
    let toc_bytes = reader
        .fetch_range(toc_offset, total - FOOTER_SIZE - toc_offset)
        .await
        .map_err(ExtractError::from)?;
    let mut decoder = GzDecoder::new(std::io::Cursor::new(toc_bytes));
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(|e| ExtractError::Malformed(format!("estargz TOC gzip: {e}")))?;
    serde_json::from_slice(&json).map_err(|e| ExtractError::Malformed(format!("estargz TOC json: {e}")))
}

/// Fetches and decompresses one entry's chunk, given its TOC record.
pub async fn fetch_entry(reader: &RangeReader, entry: &TocEntry) -> ExtractResult<Vec<u8>> {
    let compressed = reader
        .fetch_range(entry.offset, entry.compressed_size)
        .await
        .map_err(ExtractError::from)?;
    let mut decoder = GzDecoder::new(std::io::Cursor::new(compressed));
    let mut data = Vec::with_capacity(entry.size as usize);
    decoder
        .read_to_end(&mut data)
        .map_err(|e| ExtractError::Malformed(format!("estargz entry {}: {e}", entry.name)))?;
    Ok(data)
}

/// Test-only builder producing a self-consistent eStargz archive: one gzip
/// member per entry, a gzip-compressed JSON TOC, and a footer. Not exposed
/// as a public API since this crate only ever needs to *read* eStargz
/// archives produced elsewhere; it exists purely to make the reading path
/// testable without a real external eStargz file on hand.
#[cfg(test)]
pub(crate) fn build_test_archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut entries = Vec::new();

    for (name, data) in files {
        let offset = out.len() as u64;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        let compressed = encoder.finish().unwrap();
        out.extend_from_slice(&compressed);
        entries.push(TocEntry {
            name: name.to_string(),
            entry_type: "reg".to_string(),
            size: data.len() as u64,
            mode: 0o644,
            link_name: None,
            offset,
            compressed_size: compressed.len() as u64,
        });
    }

    let toc = Toc { entries };
    let toc_offset = out.len() as u64;
    let json = serde_json::to_vec(&toc).unwrap();
    let mut toc_encoder = GzEncoder::new(Vec::new(), Compression::default());
    toc_encoder.write_all(&json).unwrap();
    out.extend_from_slice(&toc_encoder.finish().unwrap());

    out.extend_from_slice(&build_footer(toc_offset));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn footer_round_trips_offset() {
        let footer = build_footer(12345);
        assert_eq!(footer.len() as u64, FOOTER_SIZE);
        assert_eq!(parse_footer(&footer).unwrap(), 12345);
    }

    #[tokio::test]
    async fn fetch_toc_and_entry_round_trip() {
        let archive = build_test_archive(&[("a.txt", b"hello"), ("b.txt", b"world")]);
        let size = archive.len() as u64;
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(move |req: &wiremock::Request| {
                let range = req
                    .headers
                    .get("range")
                    .and_then(|h| h.to_str().ok())
                    .and_then(parse_bytes_range)
                    .unwrap_or((0, archive.len() as u64 - 1));
                let (start, end) = range;
                let slice = archive[start as usize..=(end as usize).min(archive.len() - 1)].to_vec();
                wiremock::ResponseTemplate::new(206).set_body_bytes(slice)
            })
            .mount(&server)
            .await;

        let reader = RangeReader::new(reqwest::Client::new(), server.uri(), size);
        let toc = fetch_toc(&reader).await.unwrap();
        assert_eq!(toc.entries.len(), 2);
        let entry = toc.get("a.txt").unwrap();
        let data = fetch_entry(&reader, entry).await.unwrap();
        assert_eq!(data, b"hello");
    }

    fn parse_bytes_range(header: &str) -> Option<(u64, u64)> {
        let spec = header.strip_prefix("bytes=")?;
        let (start, end) = spec.split_once('-')?;
        Some((start.parse().ok()?, end.parse().ok()?))
    }
}
