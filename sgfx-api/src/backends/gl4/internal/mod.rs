pub mod conversions;
pub mod gl_context;
