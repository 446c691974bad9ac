pub mod clock;
pub mod settings;
