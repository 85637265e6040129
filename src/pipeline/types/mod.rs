mod maps;
mod pixel;
mod transition;

pub use maps::{AffordanceMaps, ValueGrid};
pub use pixel::{ActionFamily, PixelIndex, SUCTION_HEADS};
pub use transition::Transition;
