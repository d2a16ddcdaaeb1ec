//! Language inference as an ordered rule table
//!
//! Rules apply in order: extension mapping first, then a shebang inspection
//! for extensionless files, then the generic "text" label. Each rule is
//! independently testable.

use std::ffi::OsStr;
use std::path::Path;

/// Extension to language label. Lookup is case-insensitive.
const EXTENSION_RULES: &[(&str, &str)] = &[
    ("rs", "rust"),
    ("py", "python"),
    ("pyi", "python"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("jsx", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("go", "go"),
    ("java", "java"),
    ("c", "c"),
    ("h", "c"),
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("cxx", "cpp"),
    ("hpp", "cpp"),
    ("cs", "csharp"),
    ("rb", "ruby"),
    ("php", "php"),
    ("swift", "swift"),
    ("kt", "kotlin"),
    ("scala", "scala"),
    ("sh", "bash"),
    ("bash", "bash"),
    ("zsh", "zsh"),
    ("fish", "fish"),
    ("pl", "perl"),
    ("pm", "perl"),
    ("lua", "lua"),
    ("r", "r"),
    ("sql", "sql"),
    ("html", "html"),
    ("htm", "html"),
    ("css", "css"),
    ("json", "json"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
    ("toml", "toml"),
    ("xml", "xml"),
    ("md", "markdown"),
    ("txt", "text"),
];

/// Interpreter token (version suffix stripped) to language label.
const SHEBANG_RULES: &[(&str, &str)] = &[
    ("python", "python"),
    ("node", "javascript"),
    ("deno", "javascript"),
    ("bash", "bash"),
    ("sh", "sh"),
    ("zsh", "zsh"),
    ("fish", "fish"),
    ("perl", "perl"),
    ("ruby", "ruby"),
    ("php", "php"),
    ("awk", "awk"),
    ("pwsh", "powershell"),
];

const DEFAULT_LABEL: &str = "text";

/// Infer a language label for a file from its path and decoded content.
pub fn infer(relative_path: &str, text: &str) -> String {
    if let Some(ext) = Path::new(relative_path)
        .extension()
        .and_then(OsStr::to_str)
    {
        let ext = ext.to_ascii_lowercase();
        return EXTENSION_RULES
            .iter()
            .find(|(rule, _)| *rule == ext)
            .map(|(_, label)| (*label).to_string())
            .unwrap_or_else(|| DEFAULT_LABEL.to_string());
    }

    if let Some(interpreter) = shebang_interpreter(text) {
        let base = interpreter.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
        if let Some((_, label)) = SHEBANG_RULES.iter().find(|(rule, _)| *rule == base) {
            return (*label).to_string();
        }
    }

    DEFAULT_LABEL.to_string()
}

/// Extract the interpreter token from a first-line shebang, resolving the
/// `#!/usr/bin/env interpreter` indirection.
fn shebang_interpreter(text: &str) -> Option<String> {
    let first_line = text.lines().next()?;
    let directive = first_line.strip_prefix("#!")?;
    let mut parts = directive.trim().split_whitespace();
    let mut interpreter = Path::new(parts.next()?)
        .file_name()?
        .to_str()?
        .to_string();
    if interpreter == "env" {
        interpreter = parts.next()?.to_string();
    }
    Some(interpreter)
}
