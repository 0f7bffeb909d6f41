// CPU rendering into Wayland shared memory buffers
// Used when no GPU adapter is available for the window surface

use crate::image_loader::ImageAsset;
use crate::view::{DestRect, BACKGROUND_RGB};
use anyhow::{Context, Result};
use log::{debug, info};
use smithay_client_toolkit::shm::{
    slot::{Buffer, SlotPool},
    Shm,
};
use wayland_client::protocol::{wl_shm, wl_surface::WlSurface};

/// Maximum buffer edge to prevent allocation failures
const MAX_SIZE: u32 = 4096;

/// Image pixels in the compositor's byte order (BGRA, little-endian ARGB)
#[derive(Debug)]
pub struct Texture {
    pub width: u32,
    pub height: u32,
    pub bgra_data: Vec<u8>,
}

impl Texture {
    /// Take ownership of the decoded pixels and reorder them for wl_shm
    pub fn from_asset(image: ImageAsset) -> Self {
        let mut bgra_data = image.rgba_data;
        for pixel in bgra_data.chunks_exact_mut(4) {
            pixel.swap(0, 2); // Swap R and B
        }
        Self {
            width: image.width,
            height: image.height,
            bgra_data,
        }
    }
}

/// Size of the buffer presented for a window of the given size
pub fn buffer_size(width: u32, height: u32) -> (u32, u32) {
    (width.clamp(1, MAX_SIZE), height.clamp(1, MAX_SIZE))
}

pub struct ShmRenderer {
    pool: SlotPool,
    buffer: Option<Buffer>,
    buffer_size: (u32, u32),
    texture: Texture,
}

impl ShmRenderer {
    pub fn new(image: ImageAsset, shm: &Shm) -> Result<Self> {
        let (width, height) = image.size();
        let initial_len = (width.clamp(1, MAX_SIZE) * height.clamp(1, MAX_SIZE) * 4) as usize;
        let pool = SlotPool::new(initial_len, shm).context("Failed to create slot pool")?;
        info!("CPU renderer ready ({} byte pool)", initial_len);

        Ok(Self {
            pool,
            buffer: None,
            buffer_size: (0, 0),
            texture: Texture::from_asset(image),
        })
    }

    /// Compose one frame and commit it to the surface.
    ///
    /// `rect` must be laid out for `buffer_size(width, height)`.
    pub fn render(&mut self, surface: &WlSurface, width: u32, height: u32, rect: DestRect) -> Result<()> {
        let (width, height) = buffer_size(width, height);
        let stride = width as i32 * 4;

        if self.buffer_size != (width, height) {
            debug!("Allocating {}x{} shm buffer", width, height);
            self.buffer = None;
            self.buffer_size = (width, height);
        }

        let pool = &mut self.pool;
        let mut buffer = match self.buffer.take() {
            Some(buffer) => buffer,
            None => {
                pool.create_buffer(width as i32, height as i32, stride, wl_shm::Format::Argb8888)
                    .with_context(|| format!("Failed to create buffer {}x{}", width, height))?
                    .0
            }
        };

        let canvas = match pool.canvas(&buffer) {
            Some(canvas) => canvas,
            None => {
                // The compositor still holds the previous buffer
                let (second, canvas) = pool
                    .create_buffer(width as i32, height as i32, stride, wl_shm::Format::Argb8888)
                    .with_context(|| format!("Failed to create buffer {}x{}", width, height))?;
                buffer = second;
                canvas
            }
        };

        compose_frame(&self.texture, canvas, width, height, rect);

        buffer
            .attach_to(surface)
            .context("Failed to attach shm buffer")?;
        surface.damage_buffer(0, 0, width as i32, height as i32);
        surface.commit();

        self.buffer = Some(buffer);
        Ok(())
    }
}

/// Clear the canvas and draw the texture into `rect`, clipped to the canvas.
///
/// Nearest-neighbour sampling; alpha is blended over the background.
pub fn compose_frame(texture: &Texture, canvas: &mut [u8], width: u32, height: u32, rect: DestRect) {
    let [bg_r, bg_g, bg_b] = BACKGROUND_RGB;
    let needed = width as usize * height as usize * 4;
    if canvas.len() < needed {
        return;
    }

    for pixel in canvas[..needed].chunks_exact_mut(4) {
        pixel.copy_from_slice(&[bg_b, bg_g, bg_r, 255]);
    }

    if rect.is_empty() || texture.width == 0 || texture.height == 0 {
        return;
    }

    let x_start = (rect.x as i64).max(0);
    let x_end = rect.right().min(width as i64);
    let y_start = (rect.y as i64).max(0);
    let y_end = rect.bottom().min(height as i64);
    if x_start >= x_end || y_start >= y_end {
        return;
    }

    let tex_w = texture.width as i64;
    let tex_h = texture.height as i64;
    let tex_stride = texture.width as usize * 4;

    // Pre-compute source byte offsets for every visible column
    let x_lut: Vec<usize> = (x_start..x_end)
        .map(|x| {
            let src_x = ((x - rect.x as i64) * tex_w / rect.w as i64).clamp(0, tex_w - 1);
            src_x as usize * 4
        })
        .collect();

    for y in y_start..y_end {
        let src_y = ((y - rect.y as i64) * tex_h / rect.h as i64).clamp(0, tex_h - 1) as usize;
        let src_row = &texture.bgra_data[src_y * tex_stride..(src_y + 1) * tex_stride];

        let dst_row_offset = y as usize * width as usize * 4;
        let dst_row =
            &mut canvas[dst_row_offset + x_start as usize * 4..dst_row_offset + x_end as usize * 4];

        for (dst, &src_idx) in dst_row.chunks_exact_mut(4).zip(&x_lut) {
            let src = &src_row[src_idx..src_idx + 4];
            let alpha = src[3] as u32;
            if alpha == 255 {
                dst[..3].copy_from_slice(&src[..3]);
            } else {
                for c in 0..3 {
                    dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * (255 - alpha) + 127) / 255) as u8;
                }
            }
            dst[3] = 255;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BG: [u8; 4] = [BACKGROUND_RGB[2], BACKGROUND_RGB[1], BACKGROUND_RGB[0], 255];

    /// 2x2 texture: red, green / blue, white (RGBA)
    fn checker() -> Texture {
        Texture::from_asset(ImageAsset {
            width: 2,
            height: 2,
            rgba_data: vec![
                255, 0, 0, 255, 0, 255, 0, 255, //
                0, 0, 255, 255, 255, 255, 255, 255,
            ],
        })
    }

    fn pixel(canvas: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * width + x) * 4) as usize;
        [canvas[idx], canvas[idx + 1], canvas[idx + 2], canvas[idx + 3]]
    }

    #[test]
    fn texture_is_bgra() {
        let tex = checker();
        assert_eq!(&tex.bgra_data[..4], &[0, 0, 255, 255]);
        assert_eq!(&tex.bgra_data[8..12], &[255, 0, 0, 255]);
    }

    #[test]
    fn identity_blit_centred() {
        let tex = checker();
        let mut canvas = vec![0u8; 4 * 4 * 4];
        let rect = DestRect { x: 1, y: 1, w: 2, h: 2 };
        compose_frame(&tex, &mut canvas, 4, 4, rect);

        assert_eq!(pixel(&canvas, 4, 0, 0), BG);
        assert_eq!(pixel(&canvas, 4, 3, 3), BG);
        assert_eq!(pixel(&canvas, 4, 1, 1), [0, 0, 255, 255]);
        assert_eq!(pixel(&canvas, 4, 2, 1), [0, 255, 0, 255]);
        assert_eq!(pixel(&canvas, 4, 1, 2), [255, 0, 0, 255]);
        assert_eq!(pixel(&canvas, 4, 2, 2), [255, 255, 255, 255]);
    }

    #[test]
    fn upscale_repeats_texels() {
        let tex = checker();
        let mut canvas = vec![0u8; 4 * 4 * 4];
        compose_frame(&tex, &mut canvas, 4, 4, DestRect { x: 0, y: 0, w: 4, h: 4 });

        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            assert_eq!(pixel(&canvas, 4, x, y), [0, 0, 255, 255]);
        }
        assert_eq!(pixel(&canvas, 4, 3, 3), [255, 255, 255, 255]);
        assert_eq!(pixel(&canvas, 4, 3, 0), [0, 255, 0, 255]);
    }

    #[test]
    fn partially_offscreen_rect_is_clipped() {
        let tex = checker();
        let mut canvas = vec![0u8; 3 * 3 * 4];
        compose_frame(&tex, &mut canvas, 3, 3, DestRect { x: -1, y: -1, w: 2, h: 2 });

        // only the white texel lands on the canvas
        assert_eq!(pixel(&canvas, 3, 0, 0), [255, 255, 255, 255]);
        assert_eq!(pixel(&canvas, 3, 1, 0), BG);
        assert_eq!(pixel(&canvas, 3, 0, 1), BG);
    }

    #[test]
    fn fully_offscreen_and_empty_rects_leave_background() {
        let tex = checker();
        let rects = [
            DestRect { x: 50, y: 0, w: 2, h: 2 },
            DestRect { x: -10, y: -10, w: 5, h: 5 },
            DestRect { x: 0, y: 0, w: 0, h: 3 },
            DestRect { x: i32::MIN, y: i32::MIN, w: i32::MAX, h: i32::MAX },
        ];
        for rect in rects {
            let mut canvas = vec![0u8; 4 * 4 * 4];
            compose_frame(&tex, &mut canvas, 4, 4, rect);
            assert!(canvas.chunks_exact(4).all(|p| p == BG), "{rect:?}");
        }
    }

    #[test]
    fn transparent_pixels_show_background() {
        let tex = Texture::from_asset(ImageAsset {
            width: 1,
            height: 1,
            rgba_data: vec![200, 100, 50, 0],
        });
        let mut canvas = vec![0u8; 4];
        compose_frame(&tex, &mut canvas, 1, 1, DestRect { x: 0, y: 0, w: 1, h: 1 });
        assert_eq!(pixel(&canvas, 1, 0, 0), BG);
    }

    #[test]
    fn oversized_window_is_clamped() {
        assert_eq!(buffer_size(5120, 2880), (MAX_SIZE, 2880));
        assert_eq!(buffer_size(0, 9000), (1, MAX_SIZE));
        assert_eq!(buffer_size(800, 600), (800, 600));
    }

    #[test]
    fn oversized_window_keeps_image_centred() {
        use crate::view::ViewState;

        // 2x1 image in a window wider than any buffer we allocate
        let tex = Texture::from_asset(ImageAsset {
            width: 2,
            height: 1,
            rgba_data: vec![255, 0, 0, 255, 0, 0, 255, 255],
        });
        let (width, height) = buffer_size(MAX_SIZE + 904, 1);
        let rect = ViewState::identity().dest_rect((2, 1), (width, height));
        assert_eq!(rect.x + rect.w / 2, width as i32 / 2);

        let mut canvas = vec![0u8; width as usize * height as usize * 4];
        compose_frame(&tex, &mut canvas, width, height, rect);

        let mid = width / 2;
        assert_eq!(pixel(&canvas, width, mid - 1, 0), [0, 0, 255, 255]);
        assert_eq!(pixel(&canvas, width, mid, 0), [255, 0, 0, 255]);
        assert_eq!(pixel(&canvas, width, mid - 2, 0), BG);
        assert_eq!(pixel(&canvas, width, mid + 1, 0), BG);
    }

    #[test]
    fn short_canvas_is_left_untouched() {
        let tex = checker();
        let mut canvas = vec![7u8; 8];
        compose_frame(&tex, &mut canvas, 4, 4, DestRect { x: 0, y: 0, w: 4, h: 4 });
        assert!(canvas.iter().all(|&b| b == 7));
    }
}
