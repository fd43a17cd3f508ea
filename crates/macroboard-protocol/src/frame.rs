//! Control protocol frames.
//!
//! Each frame on the wire is a single tag byte followed by a fixed payload.
//! Multi-byte integers are little-endian.
//!
//! | Tag  | Frame          | Payload                                          |
//! |------|----------------|--------------------------------------------------|
//! | 0x03 | KeyStateChange | u16 key, u8 is_down                              |
//! | 0x04 | SetKeyImage    | u16 key, u16 width, u16 height, i32 len, data    |
//! | 0x05 | SetBrightness  | u8 percent                                       |
//! | 0x06 | ShowLogo       | none                                             |

use std::io::ErrorKind;

use macroboard_types::KeyBitmap;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::ProtocolError;

/// Largest image payload accepted from the wire (16 MiB).
pub const MAX_IMAGE_BYTES: usize = 16 * 1024 * 1024;

const TAG_KEY_STATE_CHANGE: u8 = 0x03;
const TAG_SET_KEY_IMAGE: u8 = 0x04;
const TAG_SET_BRIGHTNESS: u8 = 0x05;
const TAG_SHOW_LOGO: u8 = 0x06;

/// A single control protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Host → client: a key was pressed or released.
    KeyStateChange { key: u16, is_down: bool },
    /// Client → host: show `image` on `key`, or clear it when `None`.
    SetKeyImage { key: u16, image: Option<KeyBitmap> },
    /// Client → host: set the display brightness in percent.
    SetBrightness(u8),
    /// Client → host: show the board's idle logo.
    ShowLogo,
}

impl Frame {
    /// Encode the frame into its wire representation.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::new();
        match self {
            Self::KeyStateChange { key, is_down } => {
                buf.push(TAG_KEY_STATE_CHANGE);
                buf.extend_from_slice(&key.to_le_bytes());
                buf.push(u8::from(*is_down));
            }
            Self::SetKeyImage { key, image } => {
                let (width, height, data) = match image {
                    Some(bmp) => (bmp.width(), bmp.height(), bmp.as_bytes()),
                    None => (0, 0, &[][..]),
                };
                if data.len() > MAX_IMAGE_BYTES {
                    return Err(ProtocolError::FrameTooLarge(data.len()));
                }
                let len = i32::try_from(data.len())
                    .map_err(|_| ProtocolError::FrameTooLarge(data.len()))?;

                buf.reserve(11 + data.len());
                buf.push(TAG_SET_KEY_IMAGE);
                buf.extend_from_slice(&key.to_le_bytes());
                buf.extend_from_slice(&width.to_le_bytes());
                buf.extend_from_slice(&height.to_le_bytes());
                buf.extend_from_slice(&len.to_le_bytes());
                buf.extend_from_slice(data);
            }
            Self::SetBrightness(percent) => {
                buf.push(TAG_SET_BRIGHTNESS);
                buf.push(*percent);
            }
            Self::ShowLogo => buf.push(TAG_SHOW_LOGO),
        }
        Ok(buf)
    }
}

/// Read the next frame from `reader`.
///
/// Returns `None` when the stream ends cleanly between frames. Unknown tag
/// bytes and images whose data does not match their dimensions are skipped.
/// An image length that is negative or above [`MAX_IMAGE_BYTES`] is an error
/// since the stream cannot be resynchronized after it.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    loop {
        let tag = match reader.read_u8().await {
            Ok(tag) => tag,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let frame = match tag {
            TAG_KEY_STATE_CHANGE => {
                let key = reader.read_u16_le().await.map_err(truncated)?;
                let is_down = reader.read_u8().await.map_err(truncated)? != 0;
                Frame::KeyStateChange { key, is_down }
            }
            TAG_SET_KEY_IMAGE => match read_key_image(reader).await? {
                Some(frame) => frame,
                None => continue,
            },
            TAG_SET_BRIGHTNESS => Frame::SetBrightness(reader.read_u8().await.map_err(truncated)?),
            TAG_SHOW_LOGO => Frame::ShowLogo,
            other => {
                debug!(tag = other, "skipping unknown frame tag");
                continue;
            }
        };
        return Ok(Some(frame));
    }
}

async fn read_key_image<R>(reader: &mut R) -> Result<Option<Frame>, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let key = reader.read_u16_le().await.map_err(truncated)?;
    let width = reader.read_u16_le().await.map_err(truncated)?;
    let height = reader.read_u16_le().await.map_err(truncated)?;
    let len = reader.read_i32_le().await.map_err(truncated)?;

    let len = usize::try_from(len)
        .map_err(|_| ProtocolError::MalformedFrame(format!("negative image length {len}")))?;
    if len > MAX_IMAGE_BYTES {
        return Err(ProtocolError::MalformedFrame(format!(
            "image length {len} exceeds {MAX_IMAGE_BYTES}"
        )));
    }

    if len == 0 {
        return Ok(Some(Frame::SetKeyImage { key, image: None }));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).await.map_err(truncated)?;

    match KeyBitmap::new(width, height, data) {
        Ok(image) => Ok(Some(Frame::SetKeyImage {
            key,
            image: Some(image),
        })),
        Err(e) => {
            debug!(key, error = %e, "dropping inconsistent key image");
            Ok(None)
        }
    }
}

/// EOF inside a frame means the peer went away mid-write.
fn truncated(e: std::io::Error) -> ProtocolError {
    if e.kind() == ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionLost
    } else {
        ProtocolError::Io(e)
    }
}
