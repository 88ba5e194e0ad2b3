//! Wire formats for the four tunnel message types.
//!
//! All multi-byte integers are little-endian, matching a noise-based VPN
//! handshake/transport framing.

use std::io::{self, Read, Write};
use std::mem;

use crate::proto::{Decode, Encode};

/// Minimum size of any datagram the receiver will consider; anything shorter
/// is dropped before classification.
pub const MIN_MESSAGE_SIZE: usize = 4;

/// Maximum datagram size the receiver will read into a buffer.
pub const MAX_MESSAGE_SIZE: usize = 2048;

pub const MESSAGE_INITIATION_TYPE: u32 = 1;
pub const MESSAGE_RESPONSE_TYPE: u32 = 2;
pub const MESSAGE_COOKIE_REPLY_TYPE: u32 = 3;
pub const MESSAGE_TRANSPORT_TYPE: u32 = 4;

pub const MESSAGE_INITIATION_SIZE: usize = 148;
pub const MESSAGE_RESPONSE_SIZE: usize = 92;
pub const MESSAGE_COOKIE_REPLY_SIZE: usize = 64;
/// Size of the transport header alone (type + receiver + counter); the AEAD
/// ciphertext and 16-byte tag follow.
pub const MESSAGE_TRANSPORT_SIZE: usize = 16;

pub const OFFSET_TYPE: usize = 0;
pub const OFFSET_RECEIVER: usize = 4;
pub const OFFSET_COUNTER: usize = 8;
pub const OFFSET_CONTENT: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] io::Error),
    #[error("message too short: {0} bytes")]
    TooShort(usize),
    #[error("unexpected length for message type: got {got}, want {want}")]
    BadLength { got: usize, want: usize },
}

/// Reads the little-endian message type out of the first four bytes without
/// consuming or validating the rest of the datagram.
pub fn peek_type(buf: &[u8]) -> Option<u32> {
    if buf.len() < MIN_MESSAGE_SIZE {
        return None;
    }
    Some(u32::from_le_bytes(buf[..4].try_into().unwrap()))
}

macro_rules! impl_uint_le {
    ($($t:ty),*$(,)?) => {
        $(
            impl Encode for $t {
                type Error = Error;

                fn encode<W>(&self, mut writer: W) -> Result<(), Self::Error>
                where
                    W: Write,
                {
                    writer.write_all(&self.to_le_bytes())?;
                    Ok(())
                }

                #[inline]
                fn size_hint(&self) -> usize {
                    mem::size_of::<Self>()
                }
            }

            impl Decode for $t {
                type Error = Error;

                fn decode<R>(mut reader: R) -> Result<Self, Self::Error>
                where
                    R: Read,
                {
                    let mut buf = [0; mem::size_of::<Self>()];
                    reader.read_exact(&mut buf)?;
                    Ok(Self::from_le_bytes(buf))
                }
            }
        )*
    };
}

impl_uint_le!(u32, u64, u128);

/// Handshake initiation message, beginning with 4-byte type, 4-byte
/// sender, then ephemeral, static, timestamp, MAC1, MAC2.
#[derive(Clone, Debug)]
pub struct InitiationPacket {
    pub sender_index: u32,
    pub unencrypted_ephemeral: [u8; 32],
    pub encrypted_static: [u8; 32 + 16],
    pub encrypted_timestamp: [u8; 12 + 16],
    pub mac1: [u8; 16],
    pub mac2: [u8; 16],
}

impl InitiationPacket {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != MESSAGE_INITIATION_SIZE {
            return Err(Error::BadLength {
                got: buf.len(),
                want: MESSAGE_INITIATION_SIZE,
            });
        }

        let mut r = buf;
        let typ = u32::decode(&mut r)?;
        debug_assert_eq!(typ, MESSAGE_INITIATION_TYPE);
        let sender_index = u32::decode(&mut r)?;

        let mut unencrypted_ephemeral = [0u8; 32];
        r.read_exact(&mut unencrypted_ephemeral)?;

        let mut encrypted_static = [0u8; 32 + 16];
        r.read_exact(&mut encrypted_static)?;

        let mut encrypted_timestamp = [0u8; 12 + 16];
        r.read_exact(&mut encrypted_timestamp)?;

        let mut mac1 = [0u8; 16];
        r.read_exact(&mut mac1)?;
        let mut mac2 = [0u8; 16];
        r.read_exact(&mut mac2)?;

        Ok(Self {
            sender_index,
            unencrypted_ephemeral,
            encrypted_static,
            encrypted_timestamp,
            mac1,
            mac2,
        })
    }

    /// The MAC1-covered prefix of the packet (everything except MAC1/MAC2).
    pub fn mac1_input<'a>(buf: &'a [u8]) -> &'a [u8] {
        &buf[..buf.len() - 32]
    }
}

/// `Response` message: type, sender, receiver, ephemeral, empty, MAC1, MAC2.
#[derive(Clone, Debug)]
pub struct ResponsePacket {
    pub sender_index: u32,
    pub receiver_index: u32,
    pub unencrypted_ephemeral: [u8; 32],
    pub encrypted_nothing: [u8; 16],
    pub mac1: [u8; 16],
    pub mac2: [u8; 16],
}

impl ResponsePacket {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != MESSAGE_RESPONSE_SIZE {
            return Err(Error::BadLength {
                got: buf.len(),
                want: MESSAGE_RESPONSE_SIZE,
            });
        }

        let mut r = buf;
        let typ = u32::decode(&mut r)?;
        debug_assert_eq!(typ, MESSAGE_RESPONSE_TYPE);
        let sender_index = u32::decode(&mut r)?;
        let receiver_index = u32::decode(&mut r)?;

        let mut unencrypted_ephemeral = [0u8; 32];
        r.read_exact(&mut unencrypted_ephemeral)?;
        let mut encrypted_nothing = [0u8; 16];
        r.read_exact(&mut encrypted_nothing)?;
        let mut mac1 = [0u8; 16];
        r.read_exact(&mut mac1)?;
        let mut mac2 = [0u8; 16];
        r.read_exact(&mut mac2)?;

        Ok(Self {
            sender_index,
            receiver_index,
            unencrypted_ephemeral,
            encrypted_nothing,
            mac1,
            mac2,
        })
    }
}

/// `Cookie reply` message: type, receiver, nonce, encrypted cookie.
#[derive(Clone, Debug)]
pub struct CookieReplyPacket {
    pub receiver_index: u32,
    pub nonce: [u8; 24],
    pub encrypted_cookie: [u8; 16 + 16],
}

impl CookieReplyPacket {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() != MESSAGE_COOKIE_REPLY_SIZE {
            return Err(Error::BadLength {
                got: buf.len(),
                want: MESSAGE_COOKIE_REPLY_SIZE,
            });
        }

        let mut r = buf;
        let typ = u32::decode(&mut r)?;
        debug_assert_eq!(typ, MESSAGE_COOKIE_REPLY_TYPE);
        let receiver_index = u32::decode(&mut r)?;

        let mut nonce = [0u8; 24];
        r.read_exact(&mut nonce)?;
        let mut encrypted_cookie = [0u8; 16 + 16];
        r.read_exact(&mut encrypted_cookie)?;

        Ok(Self {
            receiver_index,
            nonce,
            encrypted_cookie,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MESSAGE_COOKIE_REPLY_SIZE);
        buf.extend_from_slice(&MESSAGE_COOKIE_REPLY_TYPE.to_le_bytes());
        buf.extend_from_slice(&self.receiver_index.to_le_bytes());
        buf.extend_from_slice(&self.nonce);
        buf.extend_from_slice(&self.encrypted_cookie);
        buf
    }
}

/// The fixed-size transport header: type (4) + receiver (4) + counter (8).
/// The AEAD ciphertext and its 16-byte tag follow at `OFFSET_CONTENT`.
#[derive(Copy, Clone, Debug)]
pub struct TransportHeader {
    pub receiver_index: u32,
    pub counter: u64,
}

impl TransportHeader {
    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < MESSAGE_TRANSPORT_SIZE {
            return Err(Error::TooShort(buf.len()));
        }

        let receiver_index =
            u32::from_le_bytes(buf[OFFSET_RECEIVER..OFFSET_RECEIVER + 4].try_into().unwrap());
        let counter =
            u64::from_le_bytes(buf[OFFSET_COUNTER..OFFSET_COUNTER + 8].try_into().unwrap());

        Ok(Self {
            receiver_index,
            counter,
        })
    }

    /// Builds the 12-byte AEAD nonce: 4 zero bytes || 8-byte little-endian
    /// counter.
    pub fn nonce(counter: u64) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[4..].copy_from_slice(&counter.to_le_bytes());
        nonce
    }
}
