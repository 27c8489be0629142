/// Language detection from file extensions.
///
/// The returned tag is stored in chunk payloads and drives the structural
/// chunker's choice of boundary patterns, so the identifiers here must stay
/// in sync with the families in chunker.rs.

/// Detect programming language from file extension.
/// Returns a static string identifier for the language.
pub fn detect_language(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "rs" => "rust",
        "py" | "pyi" | "pyw" => "python",
        "go" => "go",
        "java" => "java",
        "c" | "h" => "c",
        "cpp" | "hpp" | "cc" | "cxx" | "hxx" => "cpp",
        "cs" => "csharp",
        "rb" | "rake" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" | "kts" => "kotlin",
        "scala" | "sc" => "scala",
        "lua" => "lua",
        "zig" => "zig",
        "dart" => "dart",
        "ex" | "exs" => "elixir",
        "sql" => "sql",
        "sh" | "bash" | "zsh" => "shell",
        "vue" => "vue",
        "svelte" => "svelte",
        _ => "plaintext",
    }
}
