pub mod player;
pub mod synth;
