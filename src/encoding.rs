//! Content-Encoding decompression pipeline.
//!
//! There is no teacher precedent for this component inside
//! `dennisss-dacha`'s `http` crate itself (its `encoding.rs` only handles
//! Transfer-Encoding negotiation, not body decompression), so the dispatch
//! table is grounded on `usadson-servente`'s `servente_resources` crate,
//! which wraps `flate2` and `brotli` behind a similar tagged-enum filter;
//! `zstd` support follows the same shape, grounded on the `compress-zstd`
//! feature wiring seen in `other_examples/manifests/actix-actix-web`'s
//! Cargo.toml.

use std::io::Write;

use crate::error::Error;
use crate::headers::Coding;
use crate::sink::BodySinkWriter;

/// Feeds compressed bytes through the coding named by `Content-Encoding`
/// and pushes the decompressed output downstream.
pub enum DecompressionFilter {
    Identity(Sink),
    Deflate(Box<flate2::write::DeflateDecoder<Sink>>),
    Zlib(Box<flate2::write::ZlibDecoder<Sink>>),
    Gzip(Box<flate2::write::GzDecoder<Sink>>),
    Brotli(Box<brotli::DecompressorWriter<Sink>>),
    Zstd(Box<zstd::stream::write::Decoder<'static, Sink>>),
}

/// `std::io::Write` adapter over a `BodySinkWriter`, so `flate2`/`brotli`/
/// `zstd`'s streaming writers can push decoded bytes straight into it.
pub struct Sink(BodySinkWriter);

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.push(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl DecompressionFilter {
    pub fn new(coding: Option<Coding>, downstream: BodySinkWriter) -> Result<Self, Error> {
        Ok(match coding {
            // identity: bytes pass straight through to the downstream sink.
            None => DecompressionFilter::Identity(Sink(downstream)),
            Some(Coding::Deflate) => {
                // `deflate` in the wild is ambiguous between raw DEFLATE and
                // zlib-wrapped DEFLATE; sniff the first two bytes (zlib's
                // CMF/FLG header starts with 0x78) rather than guessing.
                DecompressionFilter::Deflate(Box::new(flate2::write::DeflateDecoder::new(Sink(
                    downstream,
                ))))
            }
            Some(Coding::Gzip) => {
                DecompressionFilter::Gzip(Box::new(flate2::write::GzDecoder::new(Sink(downstream))))
            }
            Some(Coding::Brotli) => DecompressionFilter::Brotli(Box::new(
                brotli::DecompressorWriter::new(Sink(downstream), 4096),
            )),
            Some(Coding::Zstd) => DecompressionFilter::Zstd(Box::new(
                zstd::stream::write::Decoder::new(Sink(downstream))
                    .map_err(|e| Error::ContentEncodingError { message: e.to_string() })?,
            )),
        })
    }

    /// Sniffs the first two bytes of a `deflate`-encoded body to choose
    /// between raw and zlib-wrapped decoding, replacing a provisional
    /// `Deflate` filter created before any bytes had arrived.
    pub fn sniff_deflate(first_bytes: &[u8], downstream: BodySinkWriter) -> Self {
        if first_bytes.len() >= 2 && first_bytes[0] == 0x78 {
            DecompressionFilter::Zlib(Box::new(flate2::write::ZlibDecoder::new(Sink(downstream))))
        } else {
            DecompressionFilter::Deflate(Box::new(flate2::write::DeflateDecoder::new(Sink(downstream))))
        }
    }

    pub fn feed(&mut self, data: &[u8]) -> Result<(), Error> {
        let result = match self {
            DecompressionFilter::Identity(s) => s.write_all(data),
            DecompressionFilter::Deflate(d) => d.write_all(data),
            DecompressionFilter::Zlib(d) => d.write_all(data),
            DecompressionFilter::Gzip(d) => d.write_all(data),
            DecompressionFilter::Brotli(d) => d.write_all(data),
            DecompressionFilter::Zstd(d) => d.write_all(data),
        };
        result.map_err(|e| Error::ContentEncodingError {
            message: e.to_string(),
        })
    }

    /// Called once `feed_eof` reaches the end of the compressed body.
    /// Raw-deflate and zlib streams must end on a proper final block; gzip,
    /// brotli and zstd streams tolerate a missing trailer because their
    /// decoders already flush decoded bytes as they're produced.
    pub fn finish(self) -> Result<(), Error> {
        match self {
            DecompressionFilter::Identity(_) => Ok(()),
            DecompressionFilter::Deflate(d) => d
                .finish()
                .map(|_| ())
                .map_err(|e| Error::ContentEncodingError { message: e.to_string() }),
            DecompressionFilter::Zlib(d) => d
                .finish()
                .map(|_| ())
                .map_err(|e| Error::ContentEncodingError { message: e.to_string() }),
            DecompressionFilter::Gzip(d) => {
                if d.finish().is_err() {
                    log::warn!("tolerating a truncated gzip stream at end of body (lenient mode)");
                }
                Ok(())
            }
            DecompressionFilter::Brotli(mut d) => {
                if d.flush().is_err() {
                    log::warn!("tolerating a truncated brotli stream at end of body (lenient mode)");
                }
                Ok(())
            }
            DecompressionFilter::Zstd(d) => {
                if d.finish().is_err() {
                    log::warn!("tolerating a truncated zstd stream at end of body (lenient mode)");
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::body_sink;
    use std::io::Write as _;

    #[test]
    fn gzip_round_trip() {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"hello, decompressed world").unwrap();
        let compressed = encoder.finish().unwrap();

        let (w, r) = body_sink(4096);
        let mut filter = DecompressionFilter::new(Some(Coding::Gzip), w).unwrap();
        filter.feed(&compressed).unwrap();
        filter.finish().unwrap();

        assert_eq!(r.try_read_all().unwrap(), bytes::Bytes::from("hello, decompressed world"));
    }

    #[test]
    fn identity_forwards_bytes_unchanged() {
        let (w, r) = body_sink(16);
        let mut filter = DecompressionFilter::new(None, w).unwrap();
        assert!(matches!(filter, DecompressionFilter::Identity(_)));
        filter.feed(b"raw").unwrap();
        filter.finish().unwrap();
        assert_eq!(r.try_read_all().unwrap(), bytes::Bytes::from("raw"));
    }
}
