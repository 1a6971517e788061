//! Frame buffer pool and test-pattern fills.

use std::{fmt, sync::Arc};

use crate::{
    device::{DeviceOutput, FrameFlags, OutputFrame, PixelFormat},
    Error, Result,
};

/// Size in bytes of the fill-pattern word.
///
/// Fills write whole 32-bit words; a buffer whose byte length is not a
/// multiple of this would have its final word spill past the allocation.
pub const PATTERN_WORD_SIZE: usize = 4;

/// The classic eight-bar colour palette as packed 8-bit YCbCr 4:2:2 words.
///
/// Entry `i` is the solid colour for ring slot `i` when filling a ring
/// with [`FramePool::fill_colour_bars`].
pub const COLOUR_BARS: [u32; 8] = [
    0xeb80_eb80, // white
    0xa28e_a22c, // yellow
    0x832c_839c, // cyan
    0x703a_7048, // green
    0x54c6_54b8, // magenta
    0x41d4_4164, // red
    0x2372_23d4, // blue
    0x1080_1080, // black
];

/// A fixed-size ring of pre-allocated hardware output frames.
///
/// The pool owns the only long-lived references to its buffers; the driver
/// holds an additional reference to each frame only while that frame sits
/// in the lookahead queue. Buffers are created once at session setup,
/// filled once, and released together at teardown.
///
/// # Examples
///
/// ```
/// use playout_bypass::{frames::FramePool, mock::MockDevice, PixelFormat};
/// use playout_bypass::device::Device;
///
/// # fn main() -> Result<(), playout_bypass::Error> {
/// let device = MockDevice::new();
/// let output = device.output()?;
///
/// let mut pool = FramePool::create(&output, 8, 720, 486, PixelFormat::Yuv8)?;
/// pool.fill_colour_bars()?;
/// assert_eq!(pool.len(), 8);
///
/// pool.release();
/// assert!(pool.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct FramePool {
    frames: Vec<Arc<dyn OutputFrame>>,
}

impl fmt::Debug for FramePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramePool")
            .field("frames", &self.frames.len())
            .finish()
    }
}

impl FramePool {
    /// Allocates a ring of `count` hardware buffers of `width` x `height`
    /// pixels in `pixel_format`.
    ///
    /// Allocation is all-or-nothing: if any buffer cannot be created, the
    /// buffers created so far are released before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Allocation`] if the driver refuses any of the
    /// `count` buffers.
    pub fn create(
        output: &Arc<dyn DeviceOutput>,
        count: usize,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
    ) -> Result<Self> {
        let row_bytes = pixel_format.row_bytes(width);
        let mut frames = Vec::with_capacity(count);

        for i in 0..count {
            match output.create_frame(width, height, row_bytes, pixel_format, FrameFlags::Default)
            {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    // Partially created buffers drop here, before returning.
                    drop(frames);
                    return Err(Error::Allocation(format!(
                        "could not obtain frame {} of {count}: {e}",
                        i + 1
                    )));
                }
            }
        }

        Ok(Self { frames })
    }

    /// Fills buffer `index` with a solid colour, `word` repeated across the
    /// whole buffer.
    ///
    /// Filling is idempotent: repeating the same fill leaves the buffer
    /// contents unchanged.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidFrameIndex`] if `index` is outside the ring.
    /// - [`Error::InvalidFormat`] if the buffer's byte length is not a
    ///   multiple of the 32-bit pattern word (odd pixel count).
    pub fn fill(&self, index: usize, word: u32) -> Result<()> {
        let frame = self.frame(index)?;
        let len = frame.byte_len();

        if len % PATTERN_WORD_SIZE != 0 {
            return Err(Error::InvalidFormat(format!(
                "buffer of {len} bytes is not a whole number of {PATTERN_WORD_SIZE}-byte words"
            )));
        }

        frame.with_bytes(&mut |bytes| {
            for chunk in bytes.chunks_exact_mut(PATTERN_WORD_SIZE) {
                chunk.copy_from_slice(&word.to_ne_bytes());
            }
        })
    }

    /// Fills every ring slot with its colour-bar palette entry
    /// (slot `i` gets `COLOUR_BARS[i % 8]`).
    ///
    /// # Errors
    ///
    /// Same failure modes as [`FramePool::fill`].
    pub fn fill_colour_bars(&self) -> Result<()> {
        for i in 0..self.frames.len() {
            self.fill(i, COLOUR_BARS[i % COLOUR_BARS.len()])?;
        }
        Ok(())
    }

    /// Borrows the frame at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFrameIndex`] if `index` is outside the ring.
    pub fn frame(&self, index: usize) -> Result<&Arc<dyn OutputFrame>> {
        self.frames.get(index).ok_or(Error::InvalidFrameIndex {
            index,
            len: self.frames.len(),
        })
    }

    /// Number of frames in the ring.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the pool holds no frames (never created, or released).
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drops the pool's references to all buffers.
    ///
    /// Idempotent, and safe to call on a partially filled pool. Frames the
    /// driver still has queued stay alive until the driver releases its own
    /// reference.
    pub fn release(&mut self) {
        self.frames.clear();
    }
}
