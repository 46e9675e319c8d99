//! Waveform visualisation
//!
//! Paints the frequency buffer as vertical bars, an animation while a clip
//! is analyzed, or a flat baseline when there is nothing to show.

mod waveform;

pub use waveform::{
    verdict_color, Bar, Scene, WaveformRenderer, BASELINE_THICKNESS, BUSY_BAR_COUNT,
    MAX_HEIGHT_RATIO,
};
