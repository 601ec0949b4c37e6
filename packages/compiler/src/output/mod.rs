//! Generators: AST to HTML / CSS / JS text, over a shared writer.

pub mod css_emitter;
pub mod emitter;
pub mod html_emitter;
pub mod js_emitter;
