pub mod color_space;
pub mod dominant_color;
pub mod pixel;
pub mod region;
pub mod saturation;
pub mod smoother;
