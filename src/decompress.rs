//! Async body decompression (spec §4.R).
//!
//! Runs off the reactor thread via `rayon`, the same offload pattern
//! `dns::resolver` uses for blocking `getaddrinfo` calls. Output is capped
//! to guard against decompression bombs; on any failure the original
//! compressed bytes are handed back so callers can still deliver a body.

use std::io::Read;

use crate::reactor::ReactorPoster;

/// Hard ceiling on decompressed output size, regardless of what the
/// `Content-Length` or encoding claims (spec §4.R).
const MAX_DECOMPRESSED_SIZE: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl ContentEncoding {
    pub fn from_header_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => ContentEncoding::Gzip,
            "deflate" => ContentEncoding::Deflate,
            "br" => ContentEncoding::Brotli,
            "zstd" => ContentEncoding::Zstd,
            _ => ContentEncoding::Identity,
        }
    }
}

/// The result of a decompression attempt. `Ok` bodies are always
/// decompressed; a `Fallback` carries the original compressed bytes back
/// because decompression failed or overran `MAX_DECOMPRESSED_SIZE`.
pub enum DecompressResult {
    Ok(Vec<u8>),
    Fallback(Vec<u8>),
}

/// Schedules decompression of `compressed` on rayon's pool; `on_done` is
/// invoked back on `poster`'s reactor thread once it completes.
pub fn decompress_async(
    poster: ReactorPoster,
    encoding: ContentEncoding,
    compressed: Vec<u8>,
    on_done: impl FnOnce(DecompressResult) + Send + 'static,
) {
    rayon::spawn(move || {
        let result = decompress_blocking(encoding, &compressed)
            .map(DecompressResult::Ok)
            .unwrap_or(DecompressResult::Fallback(compressed));
        let _ = poster.post(move |_handle| on_done(result));
    });
}

fn decompress_blocking(encoding: ContentEncoding, compressed: &[u8]) -> Option<Vec<u8>> {
    match encoding {
        ContentEncoding::Identity => Some(compressed.to_vec()),
        ContentEncoding::Gzip => decompress_gzip(compressed),
        ContentEncoding::Deflate => decompress_deflate(compressed),
        ContentEncoding::Brotli => decompress_brotli(compressed),
        ContentEncoding::Zstd => decompress_zstd(compressed),
    }
}

fn read_capped(mut reader: impl Read) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        if out.len() + n > MAX_DECOMPRESSED_SIZE {
            return None;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    Some(out)
}

/// Gzip, with a fallback to raw deflate for servers that mislabel the
/// encoding (spec §4.R: "auto-detect fallback").
fn decompress_gzip(compressed: &[u8]) -> Option<Vec<u8>> {
    read_capped(flate2::read::GzDecoder::new(compressed)).or_else(|| decompress_deflate(compressed))
}

fn decompress_deflate(compressed: &[u8]) -> Option<Vec<u8>> {
    read_capped(flate2::read::DeflateDecoder::new(compressed))
        .or_else(|| read_capped(flate2::read::ZlibDecoder::new(compressed)))
}

fn decompress_brotli(compressed: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut reader = brotli::Decompressor::new(compressed, 64 * 1024);
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut chunk).ok()?;
        if n == 0 {
            break;
        }
        if out.len() + n > MAX_DECOMPRESSED_SIZE {
            return None;
        }
        out.extend_from_slice(&chunk[..n]);
    }
    Some(out)
}

fn decompress_zstd(compressed: &[u8]) -> Option<Vec<u8>> {
    read_capped(zstd::stream::Decoder::new(compressed).ok()?)
}
