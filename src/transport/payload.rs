//! Request body encoding

use std::io::{self, Write};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("JSON encode failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("gzip failed: {0}")]
    Gzip(#[from] io::Error),
}

/// Bytes ready to sign and send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub bytes: Vec<u8>,
    pub gzipped: bool,
}

pub fn gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Serialize `value` as JSON, gzipped when asked
pub fn encode_body<T: Serialize + ?Sized>(
    value: &T,
    use_gzip: bool,
) -> Result<EncodedBody, PayloadError> {
    let json = serde_json::to_vec(value)?;
    if use_gzip {
        Ok(EncodedBody {
            bytes: gzip(&json)?,
            gzipped: true,
        })
    } else {
        Ok(EncodedBody {
            bytes: json,
            gzipped: false,
        })
    }
}
