//! Small shared helpers.

pub mod escape;

pub use escape::escape_html;
