pub mod annotate;
pub mod compositor;
pub mod mask;
pub mod shapes;
pub mod text;
