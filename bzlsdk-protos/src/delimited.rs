use std::io::{ErrorKind, Read};
use std::marker::PhantomData;

// protobuf refuses to encode messages of 2GiB or more
const MAX_MESSAGE_LEN: usize = i32::MAX as usize;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DelimitedReadError {
    #[error("IO error reading delimited stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stream ended inside a message, expected {expected} bytes")]
    Truncated { expected: usize },
    #[error("Invalid length prefix in delimited stream")]
    InvalidLength,
    #[error("Unable to decode message: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Reads `varint length | message` frames one at a time, the format written by
/// `--build_event_binary_file` and `--output=streamed_proto`.
///
/// A clean EOF between frames ends iteration. Any error is yielded once and
/// iteration stops after it.
pub struct DelimitedMessageReader<R, M> {
    inner: R,
    done: bool,
    buffer: Vec<u8>,
    _message: PhantomData<M>,
}

impl<R: Read, M: prost::Message + Default> DelimitedMessageReader<R, M> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            done: false,
            buffer: Vec::new(),
            _message: PhantomData,
        }
    }

    fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    // Returns None on a clean EOF before the first byte of the varint.
    fn read_length(&mut self) -> Result<Option<usize>, DelimitedReadError> {
        let mut value: u64 = 0;
        for idx in 0..10 {
            let byte = match self.read_byte()? {
                Some(b) => b,
                None if idx == 0 => return Ok(None),
                None => return Err(DelimitedReadError::Truncated { expected: 1 }),
            };
            value |= u64::from(byte & 0x7f) << (7 * idx);
            if byte & 0x80 == 0 {
                return usize::try_from(value)
                    .map(Some)
                    .map_err(|_| DelimitedReadError::InvalidLength);
            }
        }
        Err(DelimitedReadError::InvalidLength)
    }

    fn read_next(&mut self) -> Result<Option<M>, DelimitedReadError> {
        let len = match self.read_length()? {
            Some(len) => len,
            None => return Ok(None),
        };
        if len > MAX_MESSAGE_LEN {
            return Err(DelimitedReadError::InvalidLength);
        }
        // The buffer only grows with bytes actually read, never with the prefix.
        self.buffer.clear();
        let read = self
            .inner
            .by_ref()
            .take(len as u64)
            .read_to_end(&mut self.buffer)?;
        if read < len {
            return Err(DelimitedReadError::Truncated { expected: len });
        }
        Ok(Some(M::decode(self.buffer.as_slice())?))
    }
}

impl<R: Read, M: prost::Message + Default> Iterator for DelimitedMessageReader<R, M> {
    type Item = Result<M, DelimitedReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(msg)) => Some(Ok(msg)),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blaze_query::{target::Discriminator, Rule, Target};
    use prost::Message;

    fn rule_target(name: &str) -> Target {
        Target {
            r#type: Discriminator::Rule as i32,
            rule: Some(Rule {
                name: String::from(name),
                rule_class: String::from("java_library"),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn reads_every_frame_until_eof() {
        let mut buf = Vec::new();
        for name in ["//a:a", "//a:b", "//c:d"] {
            rule_target(name).encode_length_delimited(&mut buf).unwrap();
        }

        let names: Vec<String> = DelimitedMessageReader::<_, Target>::new(buf.as_slice())
            .map(|t| t.unwrap().name().unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["//a:a", "//a:b", "//c:d"]);
    }

    #[test]
    fn empty_stream_yields_nothing() {
        let mut reader = DelimitedMessageReader::<_, Target>::new(&[][..]);
        assert!(reader.next().is_none());
    }

    #[test]
    fn truncated_tail_is_reported_once() {
        let mut buf = Vec::new();
        rule_target("//a:a").encode_length_delimited(&mut buf).unwrap();
        let mut second = Vec::new();
        rule_target("//a:b")
            .encode_length_delimited(&mut second)
            .unwrap();
        buf.extend_from_slice(&second[..second.len() - 3]);

        let mut reader = DelimitedMessageReader::<_, Target>::new(buf.as_slice());
        assert_eq!(reader.next().unwrap().unwrap().name(), Some("//a:a"));
        assert!(matches!(
            reader.next(),
            Some(Err(DelimitedReadError::Truncated { .. }))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut buf = vec![0xff; 7];
        buf.extend_from_slice(&[0x3f, 1, 2]);

        let mut reader = DelimitedMessageReader::<_, Target>::new(buf.as_slice());
        assert!(matches!(
            reader.next(),
            Some(Err(DelimitedReadError::InvalidLength))
        ));
        assert!(reader.next().is_none());
    }

    #[test]
    fn large_length_with_short_body_is_truncated() {
        // 1GiB prefix followed by two bytes of body
        let mut buf = vec![0x80, 0x80, 0x80, 0x80, 0x04];
        buf.extend_from_slice(&[1, 2]);

        let mut reader = DelimitedMessageReader::<_, Target>::new(buf.as_slice());
        match reader.next() {
            Some(Err(DelimitedReadError::Truncated { expected })) => {
                assert_eq!(expected, 1 << 30)
            }
            other => panic!("unexpected {:?}", other.map(|r| r.is_ok())),
        }
        assert!(reader.buffer.capacity() < 1 << 20);
    }

    #[test]
    fn reads_from_file() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut buf = Vec::new();
        rule_target("//x:y").encode_length_delimited(&mut buf).unwrap();
        file.write_all(&buf).unwrap();

        let reader = std::io::BufReader::new(std::fs::File::open(file.path()).unwrap());
        let targets: Vec<Target> = DelimitedMessageReader::new(reader)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(targets.len(), 1);
    }
}
