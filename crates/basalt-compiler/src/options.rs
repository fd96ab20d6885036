//! Compiler options.

use basalt_core::TargetWidth;

/// Options for one compilation.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Target pointer width; decides the `isize`/`usize` split project-wide.
    pub target: TargetWidth,
    /// Intern identical string literals into one static segment.
    pub intern_strings: bool,
    /// Keep the runtime support routines externally visible.
    pub export_runtime: bool,
    /// Name of the synthesized start routine.
    pub start_name: String,
    /// Export the linear memory under this name.
    pub memory_export: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            target: TargetWidth::W32,
            intern_strings: true,
            export_runtime: false,
            start_name: "~start".to_string(),
            memory_export: "memory".to_string(),
        }
    }
}
