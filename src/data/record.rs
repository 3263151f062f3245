//! TFRecord framing.
//!
//! ```text
//! u64  length                     little endian
//! u32  masked crc32c of length    little endian
//! u8   data[length]
//! u32  masked crc32c of data      little endian
//! ```

use std::io::{ErrorKind, Read, Write};

use crate::error::{Error, Result};

const MASK_DELTA: u32 = 0xa282_ead8;

/// Upper bound on the buffer reserved before a payload is read.
const INITIAL_CAPACITY: usize = 1 << 20;

/// The checksum stored in record files: crc32c rotated right by 15 bits plus
/// a constant.
pub fn masked_crc(data: &[u8]) -> u32 {
    let crc = crc32c::crc32c(data);
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Iterates the payloads of a record stream.
pub struct RecordReader<R> {
    inner: R,
    offset: u64,
    verify_checksums: bool,
    done: bool,
}

impl<R: Read> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        RecordReader {
            inner,
            offset: 0,
            verify_checksums: true,
            done: false,
        }
    }

    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Fills `buf`, returning `false` on EOF before the first byte and an
    /// error on EOF part way through.
    fn read_exact_or_eof(&mut self, buf: &mut [u8], at_boundary: bool) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    if filled == 0 && at_boundary {
                        return Ok(false);
                    }
                    return Err(Error::CorruptRecord { offset: self.offset, reason: "truncated record" });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        let mut header = [0u8; 12];
        if !self.read_exact_or_eof(&mut header, true)? {
            return Ok(None);
        }

        let length_bytes = &header[..8];
        let length = u64::from_le_bytes(header[..8].try_into().unwrap_or([0; 8]));
        let length_crc = u32::from_le_bytes(header[8..].try_into().unwrap_or([0; 4]));
        if self.verify_checksums && masked_crc(length_bytes) != length_crc {
            return Err(Error::CorruptRecord { offset: self.offset, reason: "length checksum mismatch" });
        }

        let length = usize::try_from(length)
            .map_err(|_| Error::CorruptRecord { offset: self.offset, reason: "record length overflows" })?;
        // Unverified lengths may be garbage; only buffer what the stream holds.
        let mut data = Vec::with_capacity(length.min(INITIAL_CAPACITY));
        (&mut self.inner).take(length as u64).read_to_end(&mut data)?;
        if data.len() < length {
            return Err(Error::CorruptRecord { offset: self.offset, reason: "truncated record" });
        }

        let mut footer = [0u8; 4];
        self.read_exact_or_eof(&mut footer, false)?;
        if self.verify_checksums && masked_crc(&data) != u32::from_le_bytes(footer) {
            return Err(Error::CorruptRecord { offset: self.offset, reason: "data checksum mismatch" });
        }

        self.offset += 16 + length as u64;
        Ok(Some(data))
    }
}

impl<R: Read> Iterator for RecordReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(data)) => Some(Ok(data)),
            Ok(None) => {
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

/// Writes payloads with the same framing `RecordReader` reads.
pub struct RecordWriter<W> {
    inner: W,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        RecordWriter { inner }
    }

    pub fn write_record(&mut self, data: &[u8]) -> Result<()> {
        let length = (data.len() as u64).to_le_bytes();
        self.inner.write_all(&length)?;
        self.inner.write_all(&masked_crc(&length).to_le_bytes())?;
        self.inner.write_all(data)?;
        self.inner.write_all(&masked_crc(data).to_le_bytes())?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encoded(payloads: &[&[u8]]) -> Vec<u8> {
        let mut writer = RecordWriter::new(Vec::new());
        for p in payloads {
            writer.write_record(p).unwrap();
        }
        writer.into_inner()
    }

    #[test]
    fn known_masked_crc_of_empty_input() {
        // crc32c("") == 0, so only the mask delta remains.
        assert_eq!(masked_crc(b""), MASK_DELTA);
    }

    #[test]
    fn reads_back_written_payloads_in_order() {
        let bytes = encoded(&[b"first", b"", b"third record"]);
        assert_eq!(bytes.len(), 3 * 16 + 5 + 12);

        let records: Vec<Vec<u8>> = RecordReader::new(Cursor::new(bytes))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(records, vec![b"first".to_vec(), vec![], b"third record".to_vec()]);
    }

    #[test]
    fn empty_stream_has_no_records() {
        assert_eq!(RecordReader::new(Cursor::new(Vec::new())).count(), 0);
    }

    #[test]
    fn truncated_payload_is_an_error_once() {
        let mut bytes = encoded(&[b"first", b"second"]);
        bytes.truncate(bytes.len() - 3);

        let results: Vec<Result<Vec<u8>>> = RecordReader::new(Cursor::new(bytes)).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(Error::CorruptRecord { offset: 21, reason: "truncated record" })
        ));
    }

    #[test]
    fn flipped_payload_bit_fails_data_checksum() {
        let mut bytes = encoded(&[b"payload"]);
        bytes[12] ^= 0x01;

        let err = RecordReader::new(Cursor::new(bytes.clone())).next().unwrap().unwrap_err();
        assert!(matches!(err, Error::CorruptRecord { reason: "data checksum mismatch", .. }));

        let unchecked = RecordReader::new(Cursor::new(bytes)).verify_checksums(false).next().unwrap();
        assert_eq!(unchecked.unwrap(), b"qayload".to_vec());
    }

    #[test]
    fn corrupted_length_fails_length_checksum() {
        let mut bytes = encoded(&[b"payload"]);
        bytes[0] = 0xff;
        let err = RecordReader::new(Cursor::new(bytes)).next().unwrap().unwrap_err();
        assert!(matches!(err, Error::CorruptRecord { offset: 0, reason: "length checksum mismatch" }));
    }

    #[test]
    fn huge_unverified_length_is_reported_as_truncation() {
        let mut bytes = encoded(&[b"payload"]);
        bytes[..8].copy_from_slice(&u64::MAX.to_le_bytes());

        let result = RecordReader::new(Cursor::new(bytes)).verify_checksums(false).next().unwrap();
        assert!(matches!(
            result,
            Err(Error::CorruptRecord { offset: 0, reason: "truncated record" | "record length overflows" })
        ));
    }
}
