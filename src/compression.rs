/// Compression codecs a caller may request (§6 "compression: ordered list
/// of codecs"). Encoding/decoding itself belongs to the wire codec
/// collaborator (§1); the routing core only needs to name the codec and
/// carry the caller's preference order through to construction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Default for Compression {
    fn default() -> Self {
        Compression::None
    }
}
