//! Typed pixel views
//!
//! A view borrows the mapped framebuffer bytes directly. Every write lands in
//! device memory immediately; there is no intermediate buffer.

use std::marker::PhantomData;

use super::{Color, PixelFormatKind};

/// Conversion between a pixel value and its bytes in memory
pub trait PixelEncoding {
    /// Value stored per pixel
    type Pixel: Copy;
    const BYTES: usize;
    const KIND: PixelFormatKind;

    fn decode(bytes: &[u8]) -> Self::Pixel;
    fn encode(pixel: Self::Pixel, bytes: &mut [u8]);
}

pub struct Rgba32;
pub struct Bgra32;
pub struct Rgb565;
pub struct Bgr565;
pub struct Rgb555;
pub struct Bgr555;
pub struct Indexed8;

impl PixelEncoding for Rgba32 {
    type Pixel = Color;
    const BYTES: usize = 4;
    const KIND: PixelFormatKind = PixelFormatKind::Rgba32;

    fn decode(b: &[u8]) -> Color {
        Color::rgba(b[0], b[1], b[2], b[3])
    }

    fn encode(c: Color, b: &mut [u8]) {
        b[..4].copy_from_slice(&[c.r, c.g, c.b, c.a]);
    }
}

impl PixelEncoding for Bgra32 {
    type Pixel = Color;
    const BYTES: usize = 4;
    const KIND: PixelFormatKind = PixelFormatKind::Bgra32;

    fn decode(b: &[u8]) -> Color {
        Color::rgba(b[2], b[1], b[0], b[3])
    }

    fn encode(c: Color, b: &mut [u8]) {
        b[..4].copy_from_slice(&[c.b, c.g, c.r, c.a]);
    }
}

/// Widen a `bits` wide channel value to 8 bits, replicating high bits
fn expand(v: u16, bits: u32) -> u8 {
    let v = v << (8 - bits);
    (v | (v >> bits)) as u8
}

/// Pack three channels into a little endian 16 bit word. The outer
/// channels are 5 bits wide, the middle one `mid_bits`.
fn pack16(high: u8, mid: u8, low: u8, mid_bits: u32, bytes: &mut [u8]) {
    let low_bits = 5;
    let v = (u16::from(high) >> 3) << (mid_bits + low_bits)
        | (u16::from(mid) >> (8 - mid_bits)) << low_bits
        | u16::from(low) >> 3;
    bytes[..2].copy_from_slice(&v.to_le_bytes());
}

fn unpack16(bytes: &[u8], mid_bits: u32) -> (u8, u8, u8) {
    let v = u16::from_le_bytes([bytes[0], bytes[1]]);
    let mid_mask = (1u16 << mid_bits) - 1;
    (
        expand((v >> (mid_bits + 5)) & 0x1f, 5),
        expand((v >> 5) & mid_mask, mid_bits),
        expand(v & 0x1f, 5),
    )
}

impl PixelEncoding for Rgb565 {
    type Pixel = Color;
    const BYTES: usize = 2;
    const KIND: PixelFormatKind = PixelFormatKind::Rgb565;

    fn decode(b: &[u8]) -> Color {
        let (r, g, bl) = unpack16(b, 6);
        Color::rgb(r, g, bl)
    }

    fn encode(c: Color, b: &mut [u8]) {
        pack16(c.r, c.g, c.b, 6, b);
    }
}

impl PixelEncoding for Bgr565 {
    type Pixel = Color;
    const BYTES: usize = 2;
    const KIND: PixelFormatKind = PixelFormatKind::Bgr565;

    fn decode(b: &[u8]) -> Color {
        let (bl, g, r) = unpack16(b, 6);
        Color::rgb(r, g, bl)
    }

    fn encode(c: Color, b: &mut [u8]) {
        pack16(c.b, c.g, c.r, 6, b);
    }
}

impl PixelEncoding for Rgb555 {
    type Pixel = Color;
    const BYTES: usize = 2;
    const KIND: PixelFormatKind = PixelFormatKind::Rgb555;

    fn decode(b: &[u8]) -> Color {
        let (r, g, bl) = unpack16(b, 5);
        Color::rgb(r, g, bl)
    }

    fn encode(c: Color, b: &mut [u8]) {
        pack16(c.r, c.g, c.b, 5, b);
    }
}

impl PixelEncoding for Bgr555 {
    type Pixel = Color;
    const BYTES: usize = 2;
    const KIND: PixelFormatKind = PixelFormatKind::Bgr555;

    fn decode(b: &[u8]) -> Color {
        let (bl, g, r) = unpack16(b, 5);
        Color::rgb(r, g, bl)
    }

    fn encode(c: Color, b: &mut [u8]) {
        pack16(c.b, c.g, c.r, 5, b);
    }
}

impl PixelEncoding for Indexed8 {
    type Pixel = u8;
    const BYTES: usize = 1;
    const KIND: PixelFormatKind = PixelFormatKind::Indexed8;

    fn decode(b: &[u8]) -> u8 {
        b[0]
    }

    fn encode(index: u8, b: &mut [u8]) {
        b[0] = index;
    }
}

/// Pixel accessor over a borrowed byte region
pub struct PixelBuffer<'a, E> {
    pix: &'a mut [u8],
    stride: usize,
    width: u32,
    height: u32,
    _encoding: PhantomData<E>,
}

impl<'a, E: PixelEncoding> PixelBuffer<'a, E> {
    /// `stride` is the byte distance between the starts of two lines
    pub fn new(pix: &'a mut [u8], stride: usize, width: u32, height: u32) -> Self {
        Self {
            pix,
            stride,
            width,
            height,
            _encoding: PhantomData,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn kind(&self) -> PixelFormatKind {
        E::KIND
    }

    /// Byte offset of (x, y), if it lies inside both the bounds and the memory
    fn offset(&self, x: u32, y: u32) -> Option<usize> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = y as usize * self.stride + x as usize * E::BYTES;
        (start + E::BYTES <= self.pix.len()).then_some(start)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<E::Pixel> {
        self.offset(x, y)
            .map(|o| E::decode(&self.pix[o..o + E::BYTES]))
    }

    /// Write one pixel. Returns false when (x, y) is out of bounds.
    pub fn set(&mut self, x: u32, y: u32, pixel: E::Pixel) -> bool {
        match self.offset(x, y) {
            Some(o) => {
                E::encode(pixel, &mut self.pix[o..o + E::BYTES]);
                true
            }
            None => false,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &*self.pix
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut *self.pix
    }
}

/// A typed view over framebuffer memory, one variant per supported format
pub enum PixelView<'a> {
    Rgba32(PixelBuffer<'a, Rgba32>),
    Bgra32(PixelBuffer<'a, Bgra32>),
    Rgb565(PixelBuffer<'a, Rgb565>),
    Bgr565(PixelBuffer<'a, Bgr565>),
    Rgb555(PixelBuffer<'a, Rgb555>),
    Bgr555(PixelBuffer<'a, Bgr555>),
    Indexed8(PixelBuffer<'a, Indexed8>),
}

macro_rules! each_view {
    ($view:expr, $buf:ident => $body:expr) => {
        match $view {
            PixelView::Rgba32($buf) => $body,
            PixelView::Bgra32($buf) => $body,
            PixelView::Rgb565($buf) => $body,
            PixelView::Bgr565($buf) => $body,
            PixelView::Rgb555($buf) => $body,
            PixelView::Bgr555($buf) => $body,
            PixelView::Indexed8($buf) => $body,
        }
    };
}

macro_rules! direct_view {
    ($view:expr, $buf:ident => $body:expr, $indexed:expr) => {
        match $view {
            PixelView::Rgba32($buf) => $body,
            PixelView::Bgra32($buf) => $body,
            PixelView::Rgb565($buf) => $body,
            PixelView::Bgr565($buf) => $body,
            PixelView::Rgb555($buf) => $body,
            PixelView::Bgr555($buf) => $body,
            PixelView::Indexed8(_) => $indexed,
        }
    };
}

impl<'a> PixelView<'a> {
    pub fn new(kind: PixelFormatKind, pix: &'a mut [u8], stride: usize, width: u32, height: u32) -> Self {
        match kind {
            PixelFormatKind::Rgba32 => Self::Rgba32(PixelBuffer::new(pix, stride, width, height)),
            PixelFormatKind::Bgra32 => Self::Bgra32(PixelBuffer::new(pix, stride, width, height)),
            PixelFormatKind::Rgb565 => Self::Rgb565(PixelBuffer::new(pix, stride, width, height)),
            PixelFormatKind::Bgr565 => Self::Bgr565(PixelBuffer::new(pix, stride, width, height)),
            PixelFormatKind::Rgb555 => Self::Rgb555(PixelBuffer::new(pix, stride, width, height)),
            PixelFormatKind::Bgr555 => Self::Bgr555(PixelBuffer::new(pix, stride, width, height)),
            PixelFormatKind::Indexed8 => Self::Indexed8(PixelBuffer::new(pix, stride, width, height)),
        }
    }

    pub fn kind(&self) -> PixelFormatKind {
        each_view!(self, b => b.kind())
    }

    pub fn width(&self) -> u32 {
        each_view!(self, b => b.width())
    }

    pub fn height(&self) -> u32 {
        each_view!(self, b => b.height())
    }

    pub fn stride(&self) -> usize {
        each_view!(self, b => b.stride())
    }

    /// Colour at (x, y). Indexed views have no colour without the palette.
    pub fn color(&self, x: u32, y: u32) -> Option<Color> {
        direct_view!(self, b => b.get(x, y), None)
    }

    /// Write a colour. Returns false for indexed views and out of bounds.
    pub fn set_color(&mut self, x: u32, y: u32, color: Color) -> bool {
        direct_view!(self, b => b.set(x, y, color), false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba_byte_order() {
        let mut mem = vec![0u8; 16];
        let mut view = PixelBuffer::<Rgba32>::new(&mut mem, 8, 2, 2);
        assert!(view.set(1, 1, Color::rgba(1, 2, 3, 4)));
        assert_eq!(&mem[12..16], &[1, 2, 3, 4]);

        let mut view = PixelBuffer::<Bgra32>::new(&mut mem, 8, 2, 2);
        assert!(view.set(0, 0, Color::rgba(1, 2, 3, 4)));
        assert_eq!(view.get(0, 0), Some(Color::rgba(1, 2, 3, 4)));
        assert_eq!(&mem[0..4], &[3, 2, 1, 4]);
    }

    #[test]
    fn test_16bit_packing() {
        let mut mem = vec![0u8; 2];

        PixelBuffer::<Rgb565>::new(&mut mem, 2, 1, 1).set(0, 0, Color::rgb(255, 0, 0));
        assert_eq!(u16::from_le_bytes([mem[0], mem[1]]), 0xf800);

        PixelBuffer::<Bgr565>::new(&mut mem, 2, 1, 1).set(0, 0, Color::rgb(255, 0, 0));
        assert_eq!(u16::from_le_bytes([mem[0], mem[1]]), 0x001f);

        PixelBuffer::<Rgb555>::new(&mut mem, 2, 1, 1).set(0, 0, Color::rgb(0, 255, 0));
        assert_eq!(u16::from_le_bytes([mem[0], mem[1]]), 0x03e0);

        let mut view = PixelBuffer::<Bgr555>::new(&mut mem, 2, 1, 1);
        view.set(0, 0, Color::rgb(0, 0, 255));
        assert_eq!(u16::from_le_bytes([mem[0], mem[1]]), 0x7c00);
    }

    #[test]
    fn test_16bit_extremes_survive() {
        let mut mem = vec![0u8; 2];
        let mut view = PixelBuffer::<Rgb565>::new(&mut mem, 2, 1, 1);
        for c in [Color::WHITE, Color::BLACK, Color::rgb(255, 0, 255)] {
            view.set(0, 0, c);
            assert_eq!(view.get(0, 0), Some(c));
        }
    }

    #[test]
    fn test_stride_padding() {
        // 3 pixels wide, 16 bytes per line
        let mut mem = vec![0u8; 32];
        let mut view = PixelView::new(PixelFormatKind::Rgba32, &mut mem, 16, 3, 2);
        assert!(view.set_color(0, 1, Color::WHITE));
        assert!(!view.set_color(3, 0, Color::WHITE));
        assert!(!view.set_color(0, 2, Color::WHITE));
        assert_eq!(mem[16], 255);
        assert!(mem[..16].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_bounds_limited_by_memory() {
        let mut mem = vec![0u8; 6];
        let mut view = PixelBuffer::<Indexed8>::new(&mut mem, 4, 4, 2);
        assert!(view.set(1, 1, 9));
        assert!(!view.set(3, 1, 9));
        assert_eq!(view.get(1, 1), Some(9));
    }

    #[test]
    fn test_indexed_has_no_color() {
        let mut mem = vec![7u8; 4];
        let mut view = PixelView::new(PixelFormatKind::Indexed8, &mut mem, 2, 2, 2);
        assert_eq!(view.kind(), PixelFormatKind::Indexed8);
        assert_eq!(view.color(0, 0), None);
        assert!(!view.set_color(0, 0, Color::WHITE));
    }
}
