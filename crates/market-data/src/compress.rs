use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

/// zlib-compress a serialized snapshot for publication. The downstream bus
/// expects raw zlib (not gzip) framing.
pub fn compress(json: &serde_json::Value) -> std::io::Result<Vec<u8>> {
    let bytes = serde_json::to_vec(json)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&bytes)?;
    encoder.finish()
}
