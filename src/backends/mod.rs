//! HTTP clients for the generation servers.

pub mod image;
pub mod text;

pub use image::{ImageGenerator, ImagePrompts, StableDiffusionClient, image_prompts};
pub use text::{TextGenerationClient, TextGenerator};
