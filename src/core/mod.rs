pub mod clock;
pub mod gfx;
