//! Image argument descriptors.
//!
//! Codes follow the OpenCL numbering so descriptors can be handed to a
//! runtime without translation tables.

use crate::error::{CoreError, CoreResult, parse_u64};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Memory object type of an image argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageType {
    /// `CL_MEM_OBJECT_IMAGE1D`
    Image1D,
    /// `CL_MEM_OBJECT_IMAGE1D_BUFFER`
    Image1DBuffer,
    /// `CL_MEM_OBJECT_IMAGE1D_ARRAY`
    Image1DArray,
    /// `CL_MEM_OBJECT_IMAGE2D`
    Image2D,
    /// `CL_MEM_OBJECT_IMAGE2D_ARRAY`
    Image2DArray,
    /// `CL_MEM_OBJECT_IMAGE3D`
    Image3D,
    /// Code not recognized; treated as three-dimensional
    Unknown(u32),
}

impl ImageType {
    /// Decode a runtime image type code
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        match code {
            0x10F1 => Self::Image2D,
            0x10F2 => Self::Image3D,
            0x10F3 => Self::Image2DArray,
            0x10F4 => Self::Image1D,
            0x10F5 => Self::Image1DArray,
            0x10F6 => Self::Image1DBuffer,
            other => Self::Unknown(other),
        }
    }

    /// Runtime code used when creating the image.
    ///
    /// Unknown codes create a 3-D image, matching their 3-extent shape.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Image2D => 0x10F1,
            Self::Image3D | Self::Unknown(_) => 0x10F2,
            Self::Image2DArray => 0x10F3,
            Self::Image1D => 0x10F4,
            Self::Image1DArray => 0x10F5,
            Self::Image1DBuffer => 0x10F6,
        }
    }

    /// Number of extents the shape carries
    #[must_use]
    pub const fn extent_count(&self) -> usize {
        match self {
            Self::Image1D | Self::Image1DBuffer => 1,
            Self::Image1DArray | Self::Image2D => 2,
            Self::Image2DArray | Self::Image3D | Self::Unknown(_) => 3,
        }
    }
}

/// Pixel format: channel order and channel data type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageFormat {
    /// `cl_channel_order` value
    pub channel_order: u32,
    /// `cl_channel_type` value
    pub channel_data_type: u32,
}

impl ImageFormat {
    /// Bytes per pixel, when both codes are known
    #[must_use]
    pub fn pixel_size(&self) -> Option<u64> {
        // Packed formats have a fixed pixel size regardless of channel order.
        match self.channel_data_type {
            0x10D4 | 0x10D5 => return Some(2),
            0x10D6 => return Some(4),
            _ => {}
        }
        let channels: u64 = match self.channel_order {
            0x10B0 | 0x10B1 | 0x10B8 | 0x10B9 | 0x10BA | 0x10BD => 1,
            0x10B2 | 0x10B3 | 0x10BB => 2,
            0x10B4 | 0x10BC | 0x10BF => 3,
            0x10B5..=0x10B7 | 0x10C0..=0x10C3 => 4,
            _ => return None,
        };
        let channel_size: u64 = match self.channel_data_type {
            0x10D0 | 0x10D2 | 0x10D7 | 0x10DA => 1,
            0x10D1 | 0x10D3 | 0x10D8 | 0x10DB | 0x10DD => 2,
            0x10D9 | 0x10DC | 0x10DE => 4,
            _ => return None,
        };
        Some(channels * channel_size)
    }
}

/// Dimensionality-tagged image extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageShape {
    /// Width only
    D1 {
        /// Width in pixels
        width: u64,
    },
    /// Width and height (or array size for 1-D arrays)
    D2 {
        /// Width in pixels
        width: u64,
        /// Height in pixels
        height: u64,
    },
    /// Width, height and depth (or array size for 2-D arrays)
    D3 {
        /// Width in pixels
        width: u64,
        /// Height in pixels
        height: u64,
        /// Depth in pixels
        depth: u64,
    },
}

impl ImageShape {
    /// Extents in order, 1 to 3 elements
    #[must_use]
    pub fn extent(&self) -> Vec<u64> {
        match *self {
            Self::D1 { width } => vec![width],
            Self::D2 { width, height } => vec![width, height],
            Self::D3 {
                width,
                height,
                depth,
            } => vec![width, height, depth],
        }
    }

    /// Full read-back region, padded with 1 to three components
    #[must_use]
    pub fn region(&self) -> [u64; 3] {
        match *self {
            Self::D1 { width } => [width, 1, 1],
            Self::D2 { width, height } => [width, height, 1],
            Self::D3 {
                width,
                height,
                depth,
            } => [width, height, depth],
        }
    }

    /// Number of pixels covered
    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        self.region().iter().product()
    }
}

/// Everything needed to allocate an image argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Memory object type
    pub image_type: ImageType,
    /// Pixel format
    pub format: ImageFormat,
    /// Extent
    pub shape: ImageShape,
}

impl ImageDescriptor {
    /// Number of lines an image metadata file carries
    pub const METADATA_LINES: usize = 9;

    /// Parse the nine-line metadata text.
    ///
    /// Lines 0..3 are width, height and depth; line 6 is the channel
    /// order, line 7 the channel data type and line 8 the image type code.
    ///
    /// # Errors
    ///
    /// Returns error if the text has fewer than nine lines or a consumed
    /// line is not an integer.
    pub fn parse_metadata(text: &str) -> CoreResult<Self> {
        let lines: Vec<&str> = text.lines().collect();
        if lines.len() < Self::METADATA_LINES {
            return Err(CoreError::InvalidImage {
                reason: format!(
                    "metadata has {} lines, expected {}",
                    lines.len(),
                    Self::METADATA_LINES
                ),
            });
        }

        let field = |index: usize, name: &str| parse_u64(name, lines[index]);
        let type_code = field(8, "image type")?;
        let image_type = ImageType::from_code(code_u32("image type", type_code)?);

        let width = field(0, "image width")?;
        let shape = match image_type.extent_count() {
            1 => ImageShape::D1 { width },
            2 => ImageShape::D2 {
                width,
                height: field(1, "image height")?,
            },
            _ => ImageShape::D3 {
                width,
                height: field(1, "image height")?,
                depth: field(2, "image depth")?,
            },
        };

        let format = ImageFormat {
            channel_order: code_u32("channel order", field(6, "channel order")?)?,
            channel_data_type: code_u32("channel data type", field(7, "channel data type")?)?,
        };

        Ok(Self {
            image_type,
            format,
            shape,
        })
    }

    /// Expected byte size of the full image, when the format is known
    #[must_use]
    pub fn byte_len(&self) -> Option<u64> {
        self.format
            .pixel_size()
            .map(|pixel| pixel * self.shape.pixel_count())
    }

    /// Check that `len` content bytes cover exactly the described image.
    ///
    /// Formats with an unknown pixel size accept any length.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidImage`] when the lengths disagree.
    pub fn check_len(&self, len: usize) -> CoreResult<()> {
        match self.byte_len() {
            Some(expected) if expected != len as u64 => Err(CoreError::InvalidImage {
                reason: format!("content is {len} bytes, descriptor needs {expected}"),
            }),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ImageDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "image type=0x{:X} extent={:?} order=0x{:X} data=0x{:X}",
            self.image_type.code(),
            self.shape.extent(),
            self.format.channel_order,
            self.format.channel_data_type
        )
    }
}

fn code_u32(field: &str, value: u64) -> CoreResult<u32> {
    u32::try_from(value).map_err(|_| CoreError::invalid_integer(field, value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(width: u64, height: u64, depth: u64, image_type: u32) -> String {
        // RGBA / UNORM_INT8
        format!(
            "{width}\n{height}\n{depth}\n0\n0\n0\n{}\n{}\n{}\n",
            0x10B5, 0x10D2, image_type
        )
    }

    #[test]
    fn test_parse_2d() {
        let desc = ImageDescriptor::parse_metadata(&metadata(64, 32, 1, 0x10F1)).unwrap();
        assert_eq!(desc.image_type, ImageType::Image2D);
        assert_eq!(desc.shape, ImageShape::D2 { width: 64, height: 32 });
        assert_eq!(desc.format.channel_order, 0x10B5);
        assert_eq!(desc.format.channel_data_type, 0x10D2);
        assert_eq!(desc.byte_len(), Some(64 * 32 * 4));
    }

    #[test]
    fn test_parse_1d_ignores_height() {
        let desc = ImageDescriptor::parse_metadata(&metadata(128, 9, 9, 0x10F4)).unwrap();
        assert_eq!(desc.shape.extent(), vec![128]);
        assert_eq!(desc.shape.region(), [128, 1, 1]);
    }

    #[test]
    fn test_parse_3d() {
        let desc = ImageDescriptor::parse_metadata(&metadata(8, 8, 4, 0x10F2)).unwrap();
        assert_eq!(desc.shape.extent(), vec![8, 8, 4]);
    }

    #[test]
    fn test_unknown_type_falls_back_to_three_extents() {
        let desc = ImageDescriptor::parse_metadata(&metadata(8, 4, 2, 0x1234)).unwrap();
        assert_eq!(desc.image_type, ImageType::Unknown(0x1234));
        assert_eq!(desc.shape.extent(), vec![8, 4, 2]);
        assert_eq!(desc.image_type.code(), 0x10F2);
    }

    #[test]
    fn test_content_length_checked_against_format() {
        let desc = ImageDescriptor::parse_metadata(&metadata(64, 64, 1, 0x10F1)).unwrap();
        assert!(desc.check_len(64 * 64 * 4).is_ok());
        assert!(matches!(
            desc.check_len(16),
            Err(CoreError::InvalidImage { .. })
        ));
    }

    #[test]
    fn test_short_metadata_rejected() {
        assert!(ImageDescriptor::parse_metadata("1\n2\n3\n").is_err());
    }

    #[test]
    fn test_packed_pixel_size() {
        let format = ImageFormat {
            channel_order: 0x10B4,
            channel_data_type: 0x10D4,
        };
        assert_eq!(format.pixel_size(), Some(2));
        let unknown = ImageFormat {
            channel_order: 0x1,
            channel_data_type: 0x10D2,
        };
        assert_eq!(unknown.pixel_size(), None);
    }
}
