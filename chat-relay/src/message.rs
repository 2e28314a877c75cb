use std::io;

use bytes::{Bytes, BytesMut};
use prost::Message as ProstMessage;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Largest frame payload accepted when no explicit limit is configured.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024;

/// One chat record, as defined by `Message` in `proto/chat.proto`.
///
/// `user` is whatever the author claims to be; the relay never checks it.
#[derive(Clone, PartialEq, Eq, Hash, ProstMessage)]
pub struct ChatMessage {
    #[prost(string, tag = "1")]
    pub user: String,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl ChatMessage {
    pub fn new(user: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            message: message.into(),
        }
    }
}

/// Frames [`ChatMessage`]s on a byte stream.
///
/// Layout of each frame:
/// - 4 bytes: payload length (big-endian u32)
/// - N bytes: protobuf-encoded `Message`
#[derive(Debug)]
pub struct ChatCodec {
    frames: LengthDelimitedCodec,
}

impl ChatCodec {
    pub fn new(max_frame_length: usize) -> Self {
        let frames = LengthDelimitedCodec::builder()
            .length_field_length(4)
            .big_endian()
            .max_frame_length(max_frame_length)
            .new_codec();
        Self { frames }
    }
}

impl Default for ChatCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LENGTH)
    }
}

impl Decoder for ChatCodec {
    type Item = ChatMessage;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<ChatMessage>> {
        match self.frames.decode(src)? {
            Some(frame) => ChatMessage::decode(frame).map(Some).map_err(to_io_error),
            None => Ok(None),
        }
    }
}

impl Encoder<ChatMessage> for ChatCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ChatMessage, dst: &mut BytesMut) -> io::Result<()> {
        self.frames.encode(Bytes::from(item.encode_to_vec()), dst)
    }
}

fn to_io_error(err: prost::DecodeError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
