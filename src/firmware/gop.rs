//! Graphics Output Protocol lookup. Grounded on the `uefi` crate's protocol
//! surface as used in `amoljassal-sis-kernel-showcase/crates/uefi-boot/src/main.rs`
//! — the only file in the retrieval pack that speaks UEFI at all, since the
//! teacher boots through a loader handoff rather than firmware directly.

use uefi::boot;
use uefi::proto::console::gop::GraphicsOutput;

use crate::firmware::error::FirmwareError;

/// `{pixels, width, height, stride}`, created once and read-only afterward.
/// `stride` may exceed `width` when the firmware pads each scanline.
#[derive(Debug, Clone, Copy)]
pub struct FrameBuffer {
    pub pixels: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
}

impl FrameBuffer {
    /// Fills every pixel with a 32-bit BGRX color. Used only by the panic
    /// handler, which assumes the framebuffer mapping is still valid (it is:
    /// paging never unmaps anything once it's built).
    pub fn fill(&self, color: u32) {
        let ptr = self.pixels as *mut u32;
        let count = (self.stride as usize) * (self.height as usize);
        // Safety: `ptr` was mapped present+writable over its full extent by
        // `arch::paging::Mapper::map_framebuffer` before this is ever called.
        unsafe {
            for i in 0..count {
                core::ptr::write_volatile(ptr.add(i), color);
            }
        }
    }
}

/// Locates the firmware's Graphics Output Protocol instance and captures its
/// current mode. Fails fatally (via `FirmwareError::NoFramebuffer`) if no GOP
/// handle exists — this spec assumes a graphical framebuffer is always
/// present.
pub fn locate_framebuffer() -> Result<FrameBuffer, FirmwareError> {
    let handle =
        boot::get_handle_for_protocol::<GraphicsOutput>().map_err(|_| FirmwareError::NoFramebuffer)?;
    let mut gop = boot::open_protocol_exclusive::<GraphicsOutput>(handle)
        .map_err(|_| FirmwareError::NoFramebuffer)?;

    let mode_info = gop.current_mode_info();
    let (width, height) = mode_info.resolution();
    let stride = mode_info.stride();
    let mut frame_buffer = gop.frame_buffer();

    Ok(FrameBuffer {
        pixels: frame_buffer.as_mut_ptr() as u64,
        width: width as u32,
        height: height as u32,
        stride: stride as u32,
    })
}
